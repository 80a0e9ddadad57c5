//! Per-(user, command) cooldown windows.
//!
//! An entry is created lazily on the first use in a window; a background
//! task clears it when the window elapses, removing the user's bucket once
//! it holds no entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

struct CooldownEntry {
    window_end: Instant,
    uses: u32,
}

type Buckets = HashMap<String, HashMap<String, CooldownEntry>>;

#[derive(Default)]
pub struct CooldownTracker {
    entries: Arc<Mutex<Buckets>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one use of `command_id` by `user_id`. `Err` carries the time
    /// remaining in the window when the rate limit is already spent.
    pub fn check(
        &self,
        user_id: &str,
        command_id: &str,
        window: Duration,
        ratelimit: u32,
    ) -> Result<(), Duration> {
        let mut buckets = self.entries.lock().unwrap();
        let bucket = buckets.entry(user_id.to_string()).or_default();

        if !bucket.contains_key(command_id) {
            bucket.insert(
                command_id.to_string(),
                CooldownEntry {
                    window_end: Instant::now() + window,
                    uses: 0,
                },
            );
            self.spawn_expiry(user_id, command_id, window);
        }

        let entry = bucket.get_mut(command_id).unwrap();
        if entry.uses >= ratelimit {
            let remaining = entry.window_end.saturating_duration_since(Instant::now());
            debug!(user = %user_id, command = %command_id, ?remaining, "cooldown hit");
            return Err(remaining);
        }

        entry.uses += 1;
        Ok(())
    }

    /// Whether a window is currently open for this pair.
    pub fn active(&self, user_id: &str, command_id: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(user_id)
            .is_some_and(|bucket| bucket.contains_key(command_id))
    }

    fn spawn_expiry(&self, user_id: &str, command_id: &str, window: Duration) {
        let entries = Arc::clone(&self.entries);
        let user = user_id.to_string();
        let command = command_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let mut buckets = entries.lock().unwrap();
            if let Some(bucket) = buckets.get_mut(&user) {
                bucket.remove(&command);
                if bucket.is_empty() {
                    buckets.remove(&user);
                }
            }
        });
    }
}

//! Inhibitors: named predicates that block message or command processing
//! at one of three pipeline tiers.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use herald_core::Ctx;

use crate::command::Command;

/// Which pipeline tier an inhibitor runs at.
///
/// `All` runs for every inbound message, `Pre` before command resolution,
/// `Post` after a command is resolved (and receives it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InhibitorKind {
    All,
    Pre,
    Post,
}

#[async_trait]
pub trait Inhibitor: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> InhibitorKind {
        InhibitorKind::Post
    }

    /// Reason attached to the blocked event when this inhibitor fires.
    fn reason(&self) -> &str;

    /// Among concurrently-firing inhibitors of one tier, the highest
    /// priority's reason wins.
    fn priority(&self) -> i32 {
        0
    }

    /// `true` blocks the message/command.
    async fn check(&self, ctx: &Ctx, command: Option<&Arc<Command>>) -> bool;
}

/// The registered inhibitors, tested one tier at a time.
#[derive(Clone, Default)]
pub struct InhibitorSet {
    inhibitors: Vec<Arc<dyn Inhibitor>>,
}

impl InhibitorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, inhibitor: Arc<dyn Inhibitor>) {
        self.inhibitors.push(inhibitor);
    }

    pub fn is_empty(&self) -> bool {
        self.inhibitors.is_empty()
    }

    /// Run one tier concurrently; returns the blocking reason, if any.
    pub async fn test(
        &self,
        kind: InhibitorKind,
        ctx: &Ctx,
        command: Option<&Arc<Command>>,
    ) -> Option<String> {
        let tier: Vec<_> = self
            .inhibitors
            .iter()
            .filter(|i| i.kind() == kind)
            .cloned()
            .collect();
        if tier.is_empty() {
            return None;
        }

        let checks = tier.iter().map(|inhibitor| async move {
            if inhibitor.check(ctx, command).await {
                Some(inhibitor.clone())
            } else {
                None
            }
        });
        let mut blocking: Vec<_> = join_all(checks).await.into_iter().flatten().collect();
        // Stable sort: equal priorities keep registration order.
        blocking.sort_by_key(|i| std::cmp::Reverse(i.priority()));
        blocking.first().map(|i| i.reason().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use herald_core::{Channel, MemoryChat, User};

    struct Fixed {
        id: &'static str,
        kind: InhibitorKind,
        reason: &'static str,
        priority: i32,
        fires: bool,
    }

    #[async_trait]
    impl Inhibitor for Fixed {
        fn id(&self) -> &str {
            self.id
        }
        fn kind(&self) -> InhibitorKind {
            self.kind
        }
        fn reason(&self) -> &str {
            self.reason
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        async fn check(&self, _ctx: &Ctx, _command: Option<&Arc<Command>>) -> bool {
            self.fires
        }
    }

    fn ctx() -> Ctx {
        let client = Arc::new(MemoryChat::new());
        let channel = Channel::text("c1", "general", "g1");
        let author = User::new("u1", "sender");
        let message = client.inbound(&author, &channel, "hello");
        Ctx::new(message, client)
    }

    #[tokio::test]
    async fn highest_priority_blocking_reason_wins() {
        let mut set = InhibitorSet::new();
        set.add(Arc::new(Fixed {
            id: "quiet",
            kind: InhibitorKind::Pre,
            reason: "quiet hours",
            priority: 1,
            fires: true,
        }));
        set.add(Arc::new(Fixed {
            id: "banned",
            kind: InhibitorKind::Pre,
            reason: "banned",
            priority: 5,
            fires: true,
        }));
        set.add(Arc::new(Fixed {
            id: "never",
            kind: InhibitorKind::Pre,
            reason: "never fires",
            priority: 100,
            fires: false,
        }));

        let reason = set.test(InhibitorKind::Pre, &ctx(), None).await;
        assert_eq!(reason.as_deref(), Some("banned"));
    }

    #[tokio::test]
    async fn other_tiers_are_not_consulted() {
        let mut set = InhibitorSet::new();
        set.add(Arc::new(Fixed {
            id: "post-only",
            kind: InhibitorKind::Post,
            reason: "post",
            priority: 0,
            fires: true,
        }));

        assert_eq!(set.test(InhibitorKind::All, &ctx(), None).await, None);
        assert_eq!(
            set.test(InhibitorKind::Post, &ctx(), None).await.as_deref(),
            Some("post")
        );
    }
}

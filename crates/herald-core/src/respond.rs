//! Per-message response state: edit-or-send reply helpers.
//!
//! One `Responder` tracks the bot's previous response to a triggering
//! message, so a re-run (e.g. the user edited their message) updates the
//! old response in place instead of posting a second one.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::client::ChatClient;
use crate::error::HeraldError;
use crate::message::{Message, Outgoing};

#[derive(Debug, Default)]
struct RespondState {
    should_edit: bool,
    command_editable: bool,
    last_response: Option<Message>,
}

pub struct Responder {
    client: Arc<dyn ChatClient>,
    message: Message,
    state: Mutex<RespondState>,
}

impl Responder {
    pub fn new(client: Arc<dyn ChatClient>, message: Message) -> Self {
        Self {
            client,
            message,
            state: Mutex::new(RespondState {
                should_edit: false,
                command_editable: true,
                last_response: None,
            }),
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Whether the next `send` is allowed to edit the previous response.
    pub async fn set_editable(&self, editable: bool) {
        self.state.lock().await.should_edit = editable;
    }

    /// Applied by the dispatcher from the running command's configuration.
    pub async fn constrain_editable(&self, editable: bool) {
        self.state.lock().await.command_editable = editable;
    }

    pub async fn last_response(&self) -> Option<Message> {
        self.state.lock().await.last_response.clone()
    }

    /// Send a response, editing the previous one when possible: editing is
    /// enabled, and neither the payload nor the previous response carries
    /// attachments.
    pub async fn send(&self, out: Outgoing) -> Result<Message, HeraldError> {
        let mut state = self.state.lock().await;
        if state.should_edit && state.command_editable && out.attachments.is_empty() {
            if let Some(last) = state.last_response.clone() {
                if last.attachments.is_empty() {
                    let edited = self
                        .client
                        .edit(&self.message.channel.id, &last.id, out)
                        .await?;
                    state.last_response = Some(edited.clone());
                    return Ok(edited);
                }
            }
        }

        let sent = self.client.send(&self.message.channel.id, out).await?;
        state.should_edit = sent.attachments.is_empty();
        state.last_response = Some(sent.clone());
        Ok(sent)
    }

    /// Send without considering an edit.
    pub async fn send_new(&self, out: Outgoing) -> Result<Message, HeraldError> {
        let sent = self.client.send(&self.message.channel.id, out).await?;
        let mut state = self.state.lock().await;
        state.should_edit = sent.attachments.is_empty();
        state.last_response = Some(sent.clone());
        Ok(sent)
    }

    /// Send addressed at the triggering message's author.
    pub async fn reply(&self, mut out: Outgoing) -> Result<Message, HeraldError> {
        out.reply_to = Some(self.message.id.clone());
        self.send(out).await
    }

    /// Edit the previous response directly.
    pub async fn edit(&self, out: Outgoing) -> Result<Message, HeraldError> {
        let mut state = self.state.lock().await;
        let last = state
            .last_response
            .clone()
            .ok_or_else(|| HeraldError::NoPriorResponse(self.message.channel.id.clone()))?;
        let edited = self
            .client
            .edit(&self.message.channel.id, &last.id, out)
            .await?;
        state.last_response = Some(edited.clone());
        Ok(edited)
    }
}

//! Client-side room view with provisional reactions and pending sends.
//!
//! The authoritative list always comes from the store. Provisional toggles are
//! layered on top of it until the store confirms or rejects them, and sends
//! that fail stay visible as failed instead of vanishing.

use uuid::Uuid;

use crate::dao::{
    chat_store::sort_messages,
    models::{ChatMessageEntity, MessageKindEntity},
};

/// Handle on one provisional toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToggleTicket(u64);

#[derive(Debug, Clone)]
struct ProvisionalToggle {
    ticket: ToggleTicket,
    message_id: Uuid,
    emoji: String,
}

/// Delivery of a locally shown message not yet confirmed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Failed,
}

/// Message typed locally that the store has not acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub local_id: Uuid,
    pub text: String,
    pub reply_to: Option<Uuid>,
    pub state: DeliveryState,
}

#[derive(Debug, Clone)]
pub struct LocalRoomView {
    user_id: String,
    confirmed: Vec<ChatMessageEntity>,
    toggles: Vec<ProvisionalToggle>,
    sends: Vec<PendingSend>,
    next_ticket: u64,
}

impl LocalRoomView {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            confirmed: Vec::new(),
            toggles: Vec::new(),
            sends: Vec::new(),
            next_ticket: 0,
        }
    }

    /// Adopt a fresh authoritative list. Toggles still in flight stay layered on top.
    pub fn replace_confirmed(&mut self, mut messages: Vec<ChatMessageEntity>) {
        sort_messages(&mut messages);
        self.confirmed = messages;
    }

    /// Messages as the user should see them right now.
    pub fn messages(&self) -> Vec<ChatMessageEntity> {
        let mut messages = self.confirmed.clone();
        for toggle in &self.toggles {
            if let Some(message) = messages.iter_mut().find(|m| m.id == toggle.message_id) {
                message.toggle_reaction(&toggle.emoji, &self.user_id);
            }
        }
        messages
    }

    pub fn pending_sends(&self) -> &[PendingSend] {
        &self.sends
    }

    /// Apply a toggle locally. Returns `None` for unknown or system messages,
    /// which the store would reject anyway.
    pub fn begin_toggle(&mut self, message_id: Uuid, emoji: &str) -> Option<ToggleTicket> {
        let target = self.confirmed.iter().find(|m| m.id == message_id)?;
        if target.kind == MessageKindEntity::System {
            return None;
        }

        let ticket = ToggleTicket(self.next_ticket);
        self.next_ticket += 1;
        self.toggles.push(ProvisionalToggle {
            ticket,
            message_id,
            emoji: emoji.to_string(),
        });
        Some(ticket)
    }

    /// Replace the provisional toggle with the message returned by the store.
    pub fn confirm_toggle(&mut self, ticket: ToggleTicket, authoritative: ChatMessageEntity) {
        self.toggles.retain(|toggle| toggle.ticket != ticket);
        self.upsert_confirmed(authoritative);
    }

    /// Drop a provisional toggle the store refused.
    pub fn rollback_toggle(&mut self, ticket: ToggleTicket) {
        self.toggles.retain(|toggle| toggle.ticket != ticket);
    }

    pub fn begin_send(&mut self, text: impl Into<String>, reply_to: Option<Uuid>) -> Uuid {
        let local_id = Uuid::new_v4();
        self.sends.push(PendingSend {
            local_id,
            text: text.into(),
            reply_to,
            state: DeliveryState::Pending,
        });
        local_id
    }

    pub fn confirm_send(&mut self, local_id: Uuid, stored: ChatMessageEntity) {
        self.sends.retain(|send| send.local_id != local_id);
        self.upsert_confirmed(stored);
    }

    pub fn fail_send(&mut self, local_id: Uuid) {
        if let Some(send) = self.sends.iter_mut().find(|send| send.local_id == local_id) {
            send.state = DeliveryState::Failed;
        }
    }

    /// Put a failed send back in flight and hand it out for another attempt.
    pub fn retry_send(&mut self, local_id: Uuid) -> Option<PendingSend> {
        let send = self
            .sends
            .iter_mut()
            .find(|send| send.local_id == local_id && send.state == DeliveryState::Failed)?;
        send.state = DeliveryState::Pending;
        Some(send.clone())
    }

    pub fn discard_send(&mut self, local_id: Uuid) {
        self.sends.retain(|send| send.local_id != local_id);
    }

    fn upsert_confirmed(&mut self, message: ChatMessageEntity) {
        match self.confirmed.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message,
            None => {
                self.confirmed.push(message);
                sort_messages(&mut self.confirmed);
            }
        }
    }
}

//! Message timeline and reconciliation for Convo Sync.
//!
//! The timeline is the visible, ordered sequence of messages for the active
//! conversation, plus the [`PendingRegistry`] of locally sent messages the
//! store has not confirmed yet.
//!
//! Two events can confirm a pending message, in either order:
//! - the response to our own send request ([`Timeline::confirm_send`])
//! - the canonical message arriving by push or load ([`Timeline::add_message`])
//!
//! Whichever comes first replaces the pending entry in place; the second is
//! recognised as a duplicate. A logical message is never visible twice.

use convo_sync_types::{
    ConversationId, DeliveryStatus, Message, MessageId, MessageKind, MessageRef, TempId, UserId,
};

use crate::pending::{PendingRegistry, SendAttempt};

/// Outcome of merging a message into the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// Not for the active conversation, no canonical id, or its pending
    /// entry no longer exists.
    Ignored,
    /// Already present under its canonical id.
    Duplicate,
    /// Replaced the pending entry with this temp id.
    Confirmed {
        /// The retired temp id.
        temp_id: TempId,
    },
    /// Appended as a new message.
    Appended,
}

/// What to do after a send attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The message was already confirmed, removed or purged.
    NotTracked,
    /// Marked failed.
    Failed {
        /// Whether the caller should arm the automatic retry timer.
        schedule_retry: bool,
    },
}

/// A send request to (re)issue for a pending message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// The pending message's temp id.
    pub temp_id: TempId,
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Trimmed text.
    pub content: String,
    /// Content kind.
    pub kind: MessageKind,
}

/// Ordered messages for the active conversation.
#[derive(Debug, Default)]
pub struct Timeline {
    conversation: Option<ConversationId>,
    messages: Vec<Message>,
    pending: PendingRegistry,
}

impl Timeline {
    /// Create an empty timeline with no active conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty timeline for a conversation.
    pub fn for_conversation(id: ConversationId) -> Self {
        Self {
            conversation: Some(id),
            ..Self::default()
        }
    }

    /// The active conversation.
    pub fn conversation(&self) -> Option<&ConversationId> {
        self.conversation.as_ref()
    }

    /// Switch the active conversation, emptying the timeline.
    ///
    /// Returns the temp ids purged from the registry so their retry timers
    /// can be cancelled.
    pub fn switch_to(&mut self, id: Option<ConversationId>) -> Vec<TempId> {
        self.conversation = id;
        self.clear()
    }

    /// The visible messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of unconfirmed sends.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a temp id is still unconfirmed.
    pub fn is_unconfirmed(&self, temp_id: &TempId) -> bool {
        self.pending.contains(temp_id)
    }

    /// Find a message by either id kind.
    pub fn find(&self, reference: &MessageRef) -> Option<&Message> {
        self.messages.iter().find(|m| m.matches(reference))
    }

    fn position(&self, reference: &MessageRef) -> Option<usize> {
        self.messages.iter().position(|m| m.matches(reference))
    }

    fn is_active(&self, conversation_id: &ConversationId) -> bool {
        self.conversation.as_ref() == Some(conversation_id)
    }

    /// Append a locally created pending message and register it.
    ///
    /// Returns `false` (and does nothing) if the message has no temp id or
    /// belongs to another conversation.
    pub fn push_local(&mut self, message: Message) -> bool {
        let Some(temp_id) = message.temp_id else {
            return false;
        };
        if !self.is_active(&message.conversation_id) {
            return false;
        }
        self.pending.register(temp_id);
        self.messages.push(message);
        true
    }

    /// Merge a message delivered by push or load.
    ///
    /// 1. Already present under its canonical id: duplicate.
    /// 2. Matches a pending entry: replace it in place. The match is by the
    ///    echoed temp id when the message carries one, otherwise by the
    ///    earliest pending message with the same content and sender.
    /// 3. Otherwise append.
    pub fn add_message(&mut self, incoming: Message) -> Reconciled {
        if !self.is_active(&incoming.conversation_id) {
            return Reconciled::Ignored;
        }
        let Some(id) = incoming.id.clone() else {
            return Reconciled::Ignored;
        };
        if self.position(&MessageRef::Canonical(id)).is_some() {
            return Reconciled::Duplicate;
        }

        match pending_slot(&self.messages, &incoming) {
            Some(index) => self.replace_pending(index, incoming),
            None => {
                let mut message = incoming;
                message.temp_id = None;
                message.status = DeliveryStatus::Sent;
                self.messages.push(message);
                Reconciled::Appended
            }
        }
    }

    /// Merge the canonical message returned by our own send request.
    pub fn confirm_send(&mut self, temp_id: TempId, canonical: Message) -> Reconciled {
        if !self.is_active(&canonical.conversation_id) {
            return Reconciled::Ignored;
        }
        let Some(id) = canonical.id.clone() else {
            return Reconciled::Ignored;
        };

        let temp_pos = self.position(&MessageRef::Temp(temp_id));
        let canonical_pos = self.position(&MessageRef::Canonical(id));

        match (temp_pos, canonical_pos) {
            (Some(tp), None) => self.replace_pending(tp, canonical),
            (Some(tp), Some(cp)) => {
                // The push got here first and was appended separately
                let local = self.messages.remove(tp);
                let cp = if tp < cp { cp - 1 } else { cp };
                merge_read_by(&mut self.messages[cp], &local);
                self.pending.remove(&temp_id);
                Reconciled::Confirmed { temp_id }
            }
            (None, Some(_)) => {
                self.pending.remove(&temp_id);
                Reconciled::Duplicate
            }
            (None, None) => {
                self.pending.remove(&temp_id);
                Reconciled::Ignored
            }
        }
    }

    fn replace_pending(&mut self, index: usize, canonical: Message) -> Reconciled {
        let local = std::mem::replace(&mut self.messages[index], canonical);
        let slot = &mut self.messages[index];
        merge_read_by(slot, &local);
        slot.temp_id = None;
        slot.status = DeliveryStatus::Sent;

        match local.temp_id {
            Some(temp_id) => {
                self.pending.remove(&temp_id);
                Reconciled::Confirmed { temp_id }
            }
            None => Reconciled::Appended,
        }
    }

    /// Record that a send attempt failed.
    pub fn send_failed(&mut self, temp_id: &TempId) -> SendFailure {
        if !self.pending.contains(temp_id) {
            return SendFailure::NotTracked;
        }
        let Some(index) = self.position(&MessageRef::Temp(*temp_id)) else {
            self.pending.remove(temp_id);
            return SendFailure::NotTracked;
        };
        self.messages[index].status = DeliveryStatus::Failed;
        SendFailure::Failed {
            schedule_retry: self.pending.fail(temp_id),
        }
    }

    /// Flip a failed message back to pending for another attempt.
    ///
    /// Returns the request to issue, or `None` if the message is unknown,
    /// already confirmed, or not in the failed state.
    pub fn begin_retry(
        &mut self,
        reference: &MessageRef,
        attempt: SendAttempt,
    ) -> Option<SendRequest> {
        let index = self.position(reference)?;
        let message = &mut self.messages[index];
        let temp_id = message.temp_id?;
        if message.id.is_some() || !message.is_failed() || !self.pending.contains(&temp_id) {
            return None;
        }

        message.status = DeliveryStatus::Pending;
        self.pending.begin(&temp_id, attempt);
        Some(SendRequest {
            temp_id,
            conversation_id: message.conversation_id.clone(),
            content: message.content.clone(),
            kind: message.kind,
        })
    }

    /// Add `user` to the read-by set of every message in `ids`.
    ///
    /// Set union: applying the same receipt twice changes nothing.
    /// Returns the number of messages that changed.
    pub fn update_read_status(&mut self, ids: &[MessageId], user: &UserId, at: u64) -> usize {
        self.messages
            .iter_mut()
            .filter(|m| m.id.as_ref().is_some_and(|id| ids.contains(id)))
            .map(|m| m.mark_read_by(user, at))
            .filter(|changed| *changed)
            .count()
    }

    /// Merge a loaded history snapshot into the timeline.
    ///
    /// The snapshot may predate messages that arrived by push while it was
    /// loading, and it never contains sends still in flight. The result is
    /// the snapshot (deduplicated, in store order) followed by every entry
    /// the snapshot does not know about. A snapshot message confirms a
    /// local entry only by an echoed temp id, never by content.
    ///
    /// Returns the temp ids confirmed by the snapshot.
    pub fn merge_history(&mut self, history: Vec<Message>) -> Vec<TempId> {
        let mut local = std::mem::take(&mut self.messages);
        let mut merged: Vec<Message> = Vec::with_capacity(history.len() + local.len());
        let mut confirmed = Vec::new();

        for mut message in history {
            if !self.is_active(&message.conversation_id) {
                continue;
            }
            let Some(id) = message.id.clone() else {
                continue;
            };
            if merged.iter().any(|m| m.id.as_ref() == Some(&id)) {
                continue;
            }

            let known = local.iter().position(|m| m.id.as_ref() == Some(&id)).or_else(|| {
                let temp_id = message.temp_id?;
                local
                    .iter()
                    .position(|m| m.id.is_none() && m.temp_id == Some(temp_id))
            });
            if let Some(index) = known {
                let previous = local.remove(index);
                merge_read_by(&mut message, &previous);
                if let (None, Some(temp_id)) = (&previous.id, previous.temp_id) {
                    self.pending.remove(&temp_id);
                    confirmed.push(temp_id);
                }
            }
            message.temp_id = None;
            message.status = DeliveryStatus::Sent;
            merged.push(message);
        }

        merged.append(&mut local);
        self.messages = merged;
        confirmed
    }

    /// Replace the whole sequence, deduplicating by canonical id.
    ///
    /// Returns the purged temp ids.
    pub fn set_messages(&mut self, messages: Vec<Message>) -> Vec<TempId> {
        let purged = self.pending.drain();
        self.messages.clear();
        for message in messages {
            let duplicate = message.id.as_ref().is_some_and(|id| {
                self.messages.iter().any(|m| m.id.as_ref() == Some(id))
            });
            if !duplicate {
                self.messages.push(message);
            }
        }
        purged
    }

    /// Empty the sequence and the registry. Returns the purged temp ids.
    pub fn clear(&mut self) -> Vec<TempId> {
        self.messages.clear();
        self.pending.drain()
    }

    /// Remove a message by either id kind, purging its registry entry.
    pub fn remove(&mut self, reference: &MessageRef) -> Option<Message> {
        let index = self.position(reference)?;
        let removed = self.messages.remove(index);
        if let Some(temp_id) = removed.temp_id {
            self.pending.remove(&temp_id);
        }
        Some(removed)
    }
}

/// Index of the unconfirmed entry `incoming` confirms, if any.
///
/// By echoed temp id when the message carries one, otherwise the earliest
/// pending entry with the same content and sender.
fn pending_slot(messages: &[Message], incoming: &Message) -> Option<usize> {
    match incoming.temp_id {
        Some(temp_id) => messages
            .iter()
            .position(|m| m.id.is_none() && m.temp_id == Some(temp_id)),
        None => messages.iter().position(|m| {
            m.id.is_none()
                && m.is_pending()
                && m.sender_id == incoming.sender_id
                && m.content == incoming.content
        }),
    }
}

/// Carry locally applied read state into the canonical message.
fn merge_read_by(canonical: &mut Message, local: &Message) {
    for (user, at) in &local.read_by {
        canonical.read_by.entry(user.clone()).or_insert(*at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv() -> ConversationId {
        ConversationId::from("c1")
    }

    fn alice() -> UserId {
        UserId::from("alice")
    }

    fn bob() -> UserId {
        UserId::from("bob")
    }

    fn local(text: &str) -> Message {
        Message::pending(TempId::new(), conv(), alice(), text, MessageKind::Text, 100)
    }

    fn canonical(id: &str, sender: UserId, text: &str) -> Message {
        Message::canonical(MessageId::from(id), conv(), sender, text, 200)
    }

    fn timeline_with(message: &Message) -> Timeline {
        let mut timeline = Timeline::for_conversation(conv());
        assert!(timeline.push_local(message.clone()));
        timeline
    }

    fn temp_of(message: &Message) -> TempId {
        message.temp_id.unwrap()
    }

    #[test]
    fn push_local_registers_pending() {
        let msg = local("hi");
        let timeline = timeline_with(&msg);

        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.pending_count(), 1);
        assert!(timeline.is_unconfirmed(&temp_of(&msg)));
    }

    #[test]
    fn push_local_rejects_other_conversation() {
        let mut timeline = Timeline::for_conversation(ConversationId::from("other"));
        assert!(!timeline.push_local(local("hi")));
        assert!(timeline.is_empty());
    }

    #[test]
    fn response_then_push_yields_one_message() {
        let msg = local("hi");
        let mut timeline = timeline_with(&msg);

        let r1 = timeline.confirm_send(temp_of(&msg), canonical("m1", alice(), "hi"));
        let r2 = timeline.add_message(canonical("m1", alice(), "hi"));

        assert_eq!(r1, Reconciled::Confirmed { temp_id: temp_of(&msg) });
        assert_eq!(r2, Reconciled::Duplicate);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.messages()[0].id, Some(MessageId::from("m1")));
        assert_eq!(timeline.messages()[0].status, DeliveryStatus::Sent);
        assert_eq!(timeline.pending_count(), 0);
    }

    #[test]
    fn push_then_response_yields_one_message() {
        let msg = local("hi");
        let mut timeline = timeline_with(&msg);

        let r1 = timeline.add_message(canonical("m1", alice(), "hi"));
        let r2 = timeline.confirm_send(temp_of(&msg), canonical("m1", alice(), "hi"));

        assert_eq!(r1, Reconciled::Confirmed { temp_id: temp_of(&msg) });
        assert_eq!(r2, Reconciled::Duplicate);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.messages()[0].status, DeliveryStatus::Sent);
        assert!(timeline.messages()[0].temp_id.is_none());
        assert_eq!(timeline.pending_count(), 0);
    }

    #[test]
    fn replacement_preserves_position() {
        let mut timeline = Timeline::for_conversation(conv());
        let mine = local("second");
        timeline.add_message(canonical("m0", bob(), "first"));
        timeline.push_local(mine.clone());
        timeline.add_message(canonical("m2", bob(), "third"));

        timeline.add_message(canonical("m1", alice(), "second"));

        let ids: Vec<_> = timeline
            .messages()
            .iter()
            .map(|m| m.id.clone().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn replacement_carries_local_read_state() {
        let msg = local("hi");
        let mut timeline = timeline_with(&msg);

        timeline.confirm_send(temp_of(&msg), canonical("m1", alice(), "hi"));

        let confirmed = &timeline.messages()[0];
        assert!(confirmed.read_by.contains_key(&alice()));
    }

    #[test]
    fn different_sender_same_text_is_appended() {
        let msg = local("hi");
        let mut timeline = timeline_with(&msg);

        let result = timeline.add_message(canonical("m9", bob(), "hi"));

        assert_eq!(result, Reconciled::Appended);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.pending_count(), 1);
    }

    #[test]
    fn echoed_temp_id_wins_over_content_match() {
        let first = local("same");
        let second = local("same");
        let mut timeline = timeline_with(&first);
        timeline.push_local(second.clone());

        let mut incoming = canonical("m2", alice(), "same");
        incoming.temp_id = second.temp_id;
        timeline.add_message(incoming);

        assert_eq!(timeline.messages()[0].id, None);
        assert_eq!(timeline.messages()[1].id, Some(MessageId::from("m2")));
        assert!(timeline.is_unconfirmed(&temp_of(&first)));
        assert!(!timeline.is_unconfirmed(&temp_of(&second)));
    }

    #[test]
    fn content_match_takes_earliest_pending() {
        let first = local("same");
        let second = local("same");
        let mut timeline = timeline_with(&first);
        timeline.push_local(second.clone());

        timeline.add_message(canonical("m1", alice(), "same"));

        assert_eq!(timeline.messages()[0].id, Some(MessageId::from("m1")));
        assert!(timeline.is_unconfirmed(&temp_of(&second)));
    }

    #[test]
    fn failed_message_is_not_content_matched() {
        let msg = local("hi");
        let mut timeline = timeline_with(&msg);
        timeline.send_failed(&temp_of(&msg));

        let result = timeline.add_message(canonical("m1", alice(), "hi"));

        assert_eq!(result, Reconciled::Appended);
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn response_removes_leftover_after_separate_push() {
        // Store normalised the text, so the push did not content-match
        let msg = local("hi ");
        let mut timeline = timeline_with(&msg);
        timeline.add_message(canonical("m1", alice(), "hi"));
        assert_eq!(timeline.len(), 2);

        let result = timeline.confirm_send(temp_of(&msg), canonical("m1", alice(), "hi"));

        assert_eq!(result, Reconciled::Confirmed { temp_id: temp_of(&msg) });
        assert_eq!(timeline.len(), 1);
        assert!(timeline.messages()[0].read_by.contains_key(&alice()));
        assert_eq!(timeline.pending_count(), 0);
    }

    #[test]
    fn response_after_clear_is_ignored() {
        let msg = local("hi");
        let mut timeline = timeline_with(&msg);
        timeline.clear();

        let result = timeline.confirm_send(temp_of(&msg), canonical("m1", alice(), "hi"));

        assert_eq!(result, Reconciled::Ignored);
        assert!(timeline.is_empty());
    }

    #[test]
    fn other_conversation_is_ignored() {
        let mut timeline = Timeline::for_conversation(conv());
        let mut foreign = canonical("m1", bob(), "hi");
        foreign.conversation_id = ConversationId::from("c2");

        assert_eq!(timeline.add_message(foreign), Reconciled::Ignored);
        assert!(timeline.is_empty());
    }

    #[test]
    fn message_without_canonical_id_is_ignored() {
        let mut timeline = Timeline::for_conversation(conv());
        let mut msg = canonical("m1", bob(), "hi");
        msg.id = None;

        assert_eq!(timeline.add_message(msg), Reconciled::Ignored);
    }

    #[test]
    fn failure_schedules_exactly_one_auto_retry() {
        let msg = local("hi");
        let temp = temp_of(&msg);
        let mut timeline = timeline_with(&msg);

        assert_eq!(
            timeline.send_failed(&temp),
            SendFailure::Failed { schedule_retry: true }
        );
        assert!(timeline.messages()[0].is_failed());

        let request = timeline
            .begin_retry(&MessageRef::Temp(temp), SendAttempt::AutoRetry)
            .unwrap();
        assert_eq!(request.content, "hi");
        assert!(timeline.messages()[0].is_pending());

        assert_eq!(
            timeline.send_failed(&temp),
            SendFailure::Failed { schedule_retry: false }
        );
    }

    #[test]
    fn retry_requires_failed_state() {
        let msg = local("hi");
        let mut timeline = timeline_with(&msg);

        assert!(timeline
            .begin_retry(&MessageRef::Temp(temp_of(&msg)), SendAttempt::Manual)
            .is_none());
    }

    #[test]
    fn retry_of_unknown_is_none() {
        let mut timeline = Timeline::for_conversation(conv());
        assert!(timeline
            .begin_retry(&MessageRef::Canonical(MessageId::from("nope")), SendAttempt::Manual)
            .is_none());
    }

    #[test]
    fn failure_after_confirmation_is_not_tracked() {
        let msg = local("hi");
        let mut timeline = timeline_with(&msg);
        timeline.add_message(canonical("m1", alice(), "hi"));

        assert_eq!(timeline.send_failed(&temp_of(&msg)), SendFailure::NotTracked);
        assert_eq!(timeline.messages()[0].status, DeliveryStatus::Sent);
    }

    #[test]
    fn read_status_is_idempotent_union() {
        let mut timeline = Timeline::for_conversation(conv());
        timeline.add_message(canonical("m1", alice(), "hi"));
        let ids = [MessageId::from("m1")];

        assert_eq!(timeline.update_read_status(&ids, &bob(), 500), 1);
        assert_eq!(timeline.update_read_status(&ids, &bob(), 600), 0);

        let msg = &timeline.messages()[0];
        assert_eq!(msg.read_count(), 1);
        assert_eq!(msg.read_by.get(&bob()), Some(&500));
    }

    #[test]
    fn read_status_adds_to_existing_readers() {
        let mut timeline = Timeline::for_conversation(conv());
        let mut msg = canonical("m1", alice(), "hi");
        msg.read_by.insert(alice(), 1);
        timeline.add_message(msg);

        timeline.update_read_status(&[MessageId::from("m1")], &bob(), 2);

        assert_eq!(timeline.messages()[0].read_count(), 2);
    }

    #[test]
    fn set_messages_purges_registry_and_dedupes() {
        let msg = local("hi");
        let mut timeline = timeline_with(&msg);

        let purged = timeline.set_messages(vec![
            canonical("m1", bob(), "a"),
            canonical("m1", bob(), "a"),
            canonical("m2", bob(), "b"),
        ]);

        assert_eq!(purged, vec![temp_of(&msg)]);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.pending_count(), 0);
    }

    #[test]
    fn remove_by_either_id() {
        let msg = local("hi");
        let mut timeline = timeline_with(&msg);
        timeline.add_message(canonical("m5", bob(), "yo"));

        assert!(timeline.remove(&MessageRef::Temp(temp_of(&msg))).is_some());
        assert_eq!(timeline.pending_count(), 0);

        assert!(timeline
            .remove(&MessageRef::Canonical(MessageId::from("m5")))
            .is_some());
        assert!(timeline.is_empty());
        assert!(timeline
            .remove(&MessageRef::Canonical(MessageId::from("m5")))
            .is_none());
    }

    #[test]
    fn switch_to_purges_everything() {
        let msg = local("hi");
        let mut timeline = timeline_with(&msg);

        let purged = timeline.switch_to(Some(ConversationId::from("c2")));

        assert_eq!(purged.len(), 1);
        assert!(timeline.is_empty());
        assert_eq!(timeline.conversation(), Some(&ConversationId::from("c2")));
    }

    // ===========================================
    // History merge
    // ===========================================

    #[test]
    fn history_keeps_messages_pushed_during_load() {
        let mut timeline = Timeline::for_conversation(conv());
        timeline.add_message(canonical("m5", bob(), "late"));

        let confirmed = timeline.merge_history(vec![
            canonical("m1", bob(), "old"),
            canonical("m2", alice(), "older reply"),
        ]);

        assert!(confirmed.is_empty());
        let ids: Vec<_> = timeline.messages().iter().map(|m| m.id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                Some(MessageId::from("m1")),
                Some(MessageId::from("m2")),
                Some(MessageId::from("m5")),
            ]
        );
    }

    #[test]
    fn history_keeps_unconfirmed_sends_registered() {
        let pending = local("in flight");
        let failed = local("lost");
        let mut timeline = timeline_with(&pending);
        timeline.push_local(failed.clone());
        timeline.send_failed(&temp_of(&failed));

        timeline.merge_history(vec![canonical("m1", bob(), "old")]);

        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline.pending_count(), 2);
        assert!(timeline.is_unconfirmed(&temp_of(&pending)));
        assert!(timeline
            .find(&MessageRef::Temp(temp_of(&failed)))
            .unwrap()
            .is_failed());
        assert!(timeline
            .begin_retry(&MessageRef::Temp(temp_of(&failed)), SendAttempt::Manual)
            .is_some());
    }

    #[test]
    fn history_does_not_match_old_messages_by_content() {
        let msg = local("ok");
        let mut timeline = timeline_with(&msg);

        let confirmed = timeline.merge_history(vec![canonical("m1", alice(), "ok")]);

        assert!(confirmed.is_empty());
        assert_eq!(timeline.len(), 2);
        assert!(timeline.is_unconfirmed(&temp_of(&msg)));
    }

    #[test]
    fn history_confirms_by_echoed_temp_id() {
        let msg = local("hi");
        let mut timeline = timeline_with(&msg);
        let mut echoed = canonical("m1", alice(), "hi");
        echoed.temp_id = Some(temp_of(&msg));

        let confirmed = timeline.merge_history(vec![echoed]);

        assert_eq!(confirmed, vec![temp_of(&msg)]);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.pending_count(), 0);
        assert!(timeline.messages()[0].temp_id.is_none());
    }

    #[test]
    fn history_deduplicates_and_keeps_read_state() {
        let mut timeline = Timeline::for_conversation(conv());
        timeline.add_message(canonical("m1", bob(), "hello"));
        timeline.update_read_status(&[MessageId::from("m1")], &alice(), 300);

        timeline.merge_history(vec![
            canonical("m1", bob(), "hello"),
            canonical("m1", bob(), "hello"),
        ]);

        assert_eq!(timeline.len(), 1);
        assert!(timeline.messages()[0].read_by.contains_key(&alice()));
    }

    #[test]
    fn history_for_other_conversation_is_ignored() {
        let mut timeline = Timeline::for_conversation(conv());
        let foreign = Message::canonical(
            MessageId::from("x1"),
            ConversationId::from("other"),
            bob(),
            "elsewhere",
            1,
        );

        timeline.merge_history(vec![foreign]);

        assert!(timeline.is_empty());
    }
}

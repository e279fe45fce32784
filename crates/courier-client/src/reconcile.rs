use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use courier_types::api::HistoryResponse;
use courier_types::convo::ConversationKey;
use courier_types::models::Message;

/// Lifecycle of the open conversation pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    /// No conversation selected.
    Idle,
    /// History fetch in flight for this conversation.
    Loading(ConversationKey),
    /// History loaded; live pushes apply directly.
    Ready(ConversationKey),
}

/// Merges fetched history and live pushes into one display sequence.
///
/// Messages are keyed by id for deduplication and kept sorted by
/// `created_at`; the sort is stable, so same-timestamp messages keep their
/// arrival order. Pushes for conversations other than the open one are
/// buffered under their canonical key until that conversation is opened.
#[derive(Debug)]
pub struct ChatView {
    state: ViewState,
    messages: Vec<Message>,
    pending: HashMap<ConversationKey, Vec<Message>>,
}

impl ChatView {
    pub fn new() -> Self {
        Self {
            state: ViewState::Idle,
            messages: Vec::new(),
            pending: HashMap::new(),
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// The merged, deduplicated, chronological sequence for the open
    /// conversation.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Selects a conversation: clears the displayed sequence and waits for
    /// history. The caller issues the fetch and hands the result to
    /// [`apply_history`](Self::apply_history) (or
    /// [`apply_no_history`](Self::apply_no_history) on a no-conversation
    /// response).
    pub fn open(&mut self, me: Uuid, counterpart: Uuid) -> ConversationKey {
        let key = ConversationKey::new(me, counterpart);
        self.messages.clear();
        self.state = ViewState::Loading(key.clone());
        key
    }

    /// Deselects the conversation.
    pub fn close(&mut self) {
        self.messages.clear();
        self.state = ViewState::Idle;
    }

    /// Applies a fetched history. Pushes that arrived while the fetch was in
    /// flight are merged in from the buffer; duplicates collapse by id.
    /// A response for anything but the conversation currently loading is
    /// stale and ignored.
    pub fn apply_history(&mut self, key: &ConversationKey, history: &HistoryResponse) {
        if self.state != ViewState::Loading(key.clone()) {
            return;
        }

        let mut merged: Vec<Message> = history
            .sender_messages
            .iter()
            .chain(&history.receiver_messages)
            .cloned()
            .collect();
        if let Some(buffered) = self.pending.remove(key) {
            merged.extend(buffered);
        }

        self.messages = merged;
        self.dedup_and_sort();
        self.state = ViewState::Ready(key.clone());
    }

    /// Applies a "no conversation yet" history response: the view becomes
    /// ready with whatever pushes were buffered for the pair.
    pub fn apply_no_history(&mut self, key: &ConversationKey) {
        if self.state != ViewState::Loading(key.clone()) {
            return;
        }

        self.messages = self.pending.remove(key).unwrap_or_default();
        self.dedup_and_sort();
        self.state = ViewState::Ready(key.clone());
    }

    /// Applies a live-pushed message. Lands directly in the open, ready
    /// view; otherwise it is buffered under its canonical key so opening
    /// that conversation later merges it in rather than losing it.
    pub fn apply_push(&mut self, message: Message) {
        let key = ConversationKey::new(message.sender_id, message.receiver_id);

        match &self.state {
            ViewState::Ready(active) if *active == key => {
                self.messages.push(message);
                self.dedup_and_sort();
            }
            _ => {
                self.pending.entry(key).or_default().push(message);
            }
        }
    }

    /// Buffered pushes for a conversation that is not open.
    pub fn pending_count(&self, key: &ConversationKey) -> usize {
        self.pending.get(key).map_or(0, Vec::len)
    }

    fn dedup_and_sort(&mut self) {
        let mut seen = HashSet::new();
        self.messages.retain(|m| seen.insert(m.id));
        self.messages.sort_by_key(|m| m.created_at);
    }
}

impl Default for ChatView {
    fn default() -> Self {
        Self::new()
    }
}

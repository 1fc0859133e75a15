//! In-process conversation storage.
//!
//! Appends to one conversation are serialized through that conversation's
//! turn lock; different conversations never wait on each other beyond the
//! brief map lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use super::conversation::{Conversation, ConversationId, Message};

pub(crate) struct ConversationEntry {
    turn: Mutex<()>,
    state: RwLock<Conversation>,
}

impl ConversationEntry {
    fn new(id: ConversationId) -> Self {
        Self {
            turn: Mutex::new(()),
            state: RwLock::new(Conversation::new(id)),
        }
    }

    /// Held for the duration of a chat turn.
    pub(crate) async fn begin_turn(&self) -> MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    pub(crate) async fn snapshot(&self) -> Conversation {
        self.state.read().await.clone()
    }

    pub(crate) async fn append(&self, messages: impl IntoIterator<Item = Message>) {
        let mut conversation = self.state.write().await;
        for message in messages {
            conversation.append(message);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub total_conversations: usize,
    pub total_messages: usize,
    /// Rounded to two decimals.
    pub average_messages_per_conversation: f64,
}

#[derive(Default)]
pub struct ConversationStore {
    entries: RwLock<HashMap<ConversationId, Arc<ConversationEntry>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> ConversationId {
        let id = ConversationId::new();
        self.entries
            .write()
            .await
            .insert(id, Arc::new(ConversationEntry::new(id)));
        id
    }

    pub(crate) async fn entry(&self, id: ConversationId) -> Option<Arc<ConversationEntry>> {
        self.entries.read().await.get(&id).cloned()
    }

    pub async fn get(&self, id: ConversationId) -> Option<Conversation> {
        let entry = self.entry(id).await?;
        Some(entry.snapshot().await)
    }

    /// All conversations, most recently updated first.
    pub async fn list(&self) -> Vec<Conversation> {
        let entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        let mut conversations = Vec::with_capacity(entries.len());
        for entry in entries {
            conversations.push(entry.snapshot().await);
        }
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        conversations
    }

    pub async fn remove(&self, id: ConversationId) -> bool {
        self.entries.write().await.remove(&id).is_some()
    }

    /// Remove everything, returning the ids that were dropped.
    pub async fn clear(&self) -> Vec<ConversationId> {
        self.entries.write().await.drain().map(|(id, _)| id).collect()
    }

    pub async fn stats(&self) -> ConversationStats {
        let entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        let total_conversations = entries.len();
        let mut total_messages = 0;
        for entry in entries {
            total_messages += entry.state.read().await.len();
        }

        let average = if total_conversations == 0 {
            0.0
        } else {
            total_messages as f64 / total_conversations as f64
        };

        ConversationStats {
            total_conversations,
            total_messages,
            average_messages_per_conversation: (average * 100.0).round() / 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(store: &ConversationStore, messages: usize) -> ConversationId {
        let id = store.create().await;
        let entry = store.entry(id).await.unwrap();
        entry
            .append((0..messages).map(|i| Message::user(format!("m{i}"))))
            .await;
        id
    }

    #[tokio::test]
    async fn stats_report_totals_and_rounded_mean() {
        let store = ConversationStore::new();
        seed(&store, 3).await;
        seed(&store, 1).await;

        let stats = store.stats().await;
        assert_eq!(stats.total_conversations, 2);
        assert_eq!(stats.total_messages, 4);
        assert_eq!(stats.average_messages_per_conversation, 2.0);

        seed(&store, 0).await;
        assert_eq!(
            store.stats().await.average_messages_per_conversation,
            1.33
        );
    }

    #[tokio::test]
    async fn empty_store_has_zero_mean() {
        let stats = ConversationStore::new().stats().await;
        assert_eq!(stats.total_conversations, 0);
        assert_eq!(stats.average_messages_per_conversation, 0.0);
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let store = ConversationStore::new();
        let first = seed(&store, 1).await;
        let second = seed(&store, 1).await;

        assert!(store.remove(first).await);
        assert!(!store.remove(first).await);
        assert!(store.get(first).await.is_none());

        assert_eq!(store.clear().await, vec![second]);
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn list_returns_most_recent_first() {
        let store = ConversationStore::new();
        let older = seed(&store, 0).await;
        let newer = seed(&store, 0).await;
        let mut bump = Message::user("bump");
        bump.timestamp += chrono::Duration::seconds(1);
        store.entry(older).await.unwrap().append([bump]).await;

        let ids: Vec<_> = store.list().await.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![older, newer]);
    }
}

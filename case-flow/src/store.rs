use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use crate::{
    error::Result,
    message::ConversationMessage,
    session::{CaseInput, ExtractionResult, Session},
};

/// The conversation's initial-case record: the originating input together
/// with what was extracted from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialCase {
    pub case_input: CaseInput,
    pub extraction: ExtractionResult,
}

/// Durable, per-conversation strongly-ordered message store. The real
/// backend is an external collaborator; the in-memory implementation below
/// stands in behind the same contract.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn initialize_conversation(
        &self,
        conversation_id: &str,
        case_input: CaseInput,
        extraction: ExtractionResult,
    ) -> Result<()>;

    async fn append_message(
        &self,
        conversation_id: &str,
        message: ConversationMessage,
    ) -> Result<()>;

    async fn messages(&self, conversation_id: &str) -> Result<Vec<ConversationMessage>>;

    async fn initial_case(&self, conversation_id: &str) -> Result<Option<InitialCase>>;

    /// Idempotence guard input for retrieval and auto-continuation.
    async fn has_document_message(&self, conversation_id: &str) -> Result<bool> {
        Ok(self
            .messages(conversation_id)
            .await?
            .iter()
            .any(ConversationMessage::is_document))
    }

    /// Observe the conversation's message sequence as it grows.
    fn subscribe(&self, conversation_id: &str) -> watch::Receiver<Vec<ConversationMessage>>;
}

struct ConversationRecord {
    initial_case: Option<InitialCase>,
    messages: Vec<ConversationMessage>,
    publisher: watch::Sender<Vec<ConversationMessage>>,
}

impl ConversationRecord {
    fn new() -> Self {
        let (publisher, _) = watch::channel(Vec::new());
        Self {
            initial_case: None,
            messages: Vec::new(),
            publisher,
        }
    }
}

/// In-memory implementation of ConversationStore
pub struct InMemoryConversationStore {
    conversations: DashMap<String, ConversationRecord>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: DashMap::new(),
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn initialize_conversation(
        &self,
        conversation_id: &str,
        case_input: CaseInput,
        extraction: ExtractionResult,
    ) -> Result<()> {
        let mut record = self
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(ConversationRecord::new);
        record.initial_case = Some(InitialCase {
            case_input,
            extraction,
        });
        Ok(())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        message: ConversationMessage,
    ) -> Result<()> {
        let mut record = self
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(ConversationRecord::new);
        record.messages.push(message);
        let snapshot = record.messages.clone();
        let _ = record.publisher.send(snapshot);
        Ok(())
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<ConversationMessage>> {
        Ok(self
            .conversations
            .get(conversation_id)
            .map(|record| record.messages.clone())
            .unwrap_or_default())
    }

    async fn initial_case(&self, conversation_id: &str) -> Result<Option<InitialCase>> {
        Ok(self
            .conversations
            .get(conversation_id)
            .and_then(|record| record.initial_case.clone()))
    }

    fn subscribe(&self, conversation_id: &str) -> watch::Receiver<Vec<ConversationMessage>> {
        self.conversations
            .entry(conversation_id.to_string())
            .or_insert_with(ConversationRecord::new)
            .publisher
            .subscribe()
    }
}

/// Trait for storing and retrieving session handles
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Session) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory implementation of SessionStorage
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_are_appended_in_order() {
        let store = InMemoryConversationStore::new();
        store
            .append_message("c1", ConversationMessage::text("first"))
            .await
            .unwrap();
        store
            .append_message("c1", ConversationMessage::text("second"))
            .await
            .unwrap();

        let messages = store.messages("c1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(!store.has_document_message("c1").await.unwrap());

        store
            .append_message("c1", ConversationMessage::document(Vec::new()))
            .await
            .unwrap();
        assert!(store.has_document_message("c1").await.unwrap());
    }

    #[tokio::test]
    async fn initialize_conversation_stores_the_initial_case() {
        let store = InMemoryConversationStore::new();
        let input = CaseInput::new("fever", "WBC 14k");
        let extraction = ExtractionResult {
            disease: "pneumonia".to_string(),
            events: vec!["fever".to_string()],
        };
        store
            .initialize_conversation("c1", input, extraction)
            .await
            .unwrap();

        let initial = store.initial_case("c1").await.unwrap().unwrap();
        assert_eq!(initial.extraction.disease, "pneumonia");
        assert_eq!(initial.case_input.case_notes, "fever");
        assert!(store.initial_case("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subscribers_observe_appends() {
        let store = InMemoryConversationStore::new();
        let mut rx = store.subscribe("c1");
        store
            .append_message("c1", ConversationMessage::text("hello"))
            .await
            .unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }

    #[tokio::test]
    async fn session_storage_round_trip() {
        let storage = InMemorySessionStorage::new();
        let session = Session::new();
        let id = session.id.clone();

        storage.save(session).await.unwrap();
        assert!(storage.get(&id).await.unwrap().is_some());

        storage.delete(&id).await.unwrap();
        assert!(storage.get(&id).await.unwrap().is_none());
    }
}

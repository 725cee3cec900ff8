use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sage_llm::provider::{Message, Role};
use sage_store::Namespace;

use crate::error::EngineError;

type SessionKey = (Namespace, String);

/// Owns one ordered transcript per (namespace, session) key.
///
/// Transcripts live for the process lifetime only. Each session carries its
/// own lock, taken only for the duration of an append or snapshot, so a
/// long-running completion call for one session never blocks another.
#[derive(Debug, Default)]
pub struct ConversationStore {
    sessions: RwLock<HashMap<SessionKey, Arc<Mutex<Vec<Message>>>>>,
}

impl ConversationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) the transcript for a key with a single system
    /// turn. Overwriting an existing transcript is not an error: callers
    /// re-creating an agent get a fresh conversation, matching the explicit
    /// replace semantics of agent creation.
    pub fn create(&self, namespace: &Namespace, session: &str, system_prompt: &str) {
        let transcript = vec![Message::new(Role::System, system_prompt)];
        self.sessions.write().insert(
            (namespace.clone(), session.to_owned()),
            Arc::new(Mutex::new(transcript)),
        );
    }

    /// Append a turn to an existing transcript.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SessionNotFound`] if `create` was never called
    /// for this key.
    pub fn append(
        &self,
        namespace: &Namespace,
        session: &str,
        role: Role,
        content: &str,
    ) -> Result<(), EngineError> {
        let entry = self.entry(namespace, session)?;
        entry.lock().push(Message::new(role, content));
        Ok(())
    }

    /// Remove a transcript.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SessionNotFound`] if the key is absent.
    pub fn delete(&self, namespace: &Namespace, session: &str) -> Result<(), EngineError> {
        self.sessions
            .write()
            .remove(&(namespace.clone(), session.to_owned()))
            .map(|_| ())
            .ok_or(EngineError::SessionNotFound)
    }

    /// Return a defensive copy of the transcript in turn order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SessionNotFound`] if the key is absent.
    pub fn snapshot(&self, namespace: &Namespace, session: &str) -> Result<Vec<Message>, EngineError> {
        let entry = self.entry(namespace, session)?;
        let guard = entry.lock();
        Ok(guard.clone())
    }

    #[must_use]
    pub fn exists(&self, namespace: &Namespace, session: &str) -> bool {
        self.sessions
            .read()
            .contains_key(&(namespace.clone(), session.to_owned()))
    }

    fn entry(
        &self,
        namespace: &Namespace,
        session: &str,
    ) -> Result<Arc<Mutex<Vec<Message>>>, EngineError> {
        self.sessions
            .read()
            .get(&(namespace.clone(), session.to_owned()))
            .cloned()
            .ok_or(EngineError::SessionNotFound)
    }
}

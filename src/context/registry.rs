//! Conversation-keyed execution contexts for the server.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use super::ExecutionContext;
use crate::error::ShellTetherError;
use crate::session::ShellConfig;
use crate::Result;

/// Thread-safe map from conversation id to its execution context.
pub struct ConversationRegistry {
    contexts: RwLock<HashMap<String, Arc<ExecutionContext>>>,
    config: ShellConfig,
}

impl ConversationRegistry {
    /// Create an empty registry whose contexts spawn shells with `config`.
    pub fn new(config: ShellConfig) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the conversation's context, creating it on first use.
    pub fn get_or_create(&self, conversation_id: &str) -> Result<Arc<ExecutionContext>> {
        if let Some(ctx) = self.get(conversation_id)? {
            return Ok(ctx);
        }

        let mut contexts = self
            .contexts
            .write()
            .map_err(|_| ShellTetherError::LockPoisoned)?;
        let ctx = contexts
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                Arc::new(ExecutionContext::new(conversation_id, self.config.clone()))
            });
        Ok(Arc::clone(ctx))
    }

    /// Get the conversation's context if it exists.
    pub fn get(&self, conversation_id: &str) -> Result<Option<Arc<ExecutionContext>>> {
        let contexts = self
            .contexts
            .read()
            .map_err(|_| ShellTetherError::LockPoisoned)?;
        Ok(contexts.get(conversation_id).cloned())
    }

    /// Remove a conversation's context without tearing it down.
    pub fn remove(&self, conversation_id: &str) -> Result<Option<Arc<ExecutionContext>>> {
        let mut contexts = self
            .contexts
            .write()
            .map_err(|_| ShellTetherError::LockPoisoned)?;
        Ok(contexts.remove(conversation_id))
    }

    pub fn contains(&self, conversation_id: &str) -> Result<bool> {
        let contexts = self
            .contexts
            .read()
            .map_err(|_| ShellTetherError::LockPoisoned)?;
        Ok(contexts.contains_key(conversation_id))
    }

    /// Number of known conversations.
    pub fn count(&self) -> usize {
        self.contexts.read().map(|c| c.len()).unwrap_or(0)
    }

    /// All conversation ids.
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let contexts = self
            .contexts
            .read()
            .map_err(|_| ShellTetherError::LockPoisoned)?;
        Ok(contexts.keys().cloned().collect())
    }

    /// Shell settings given to new contexts.
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Tear down and forget every conversation. Returns how many there were.
    pub fn teardown_all(&self) -> Result<usize> {
        let drained: Vec<_> = {
            let mut contexts = self
                .contexts
                .write()
                .map_err(|_| ShellTetherError::LockPoisoned)?;
            contexts.drain().collect()
        };
        for (id, ctx) in &drained {
            if let Err(e) = ctx.teardown() {
                warn!(conversation = %id, "teardown failed: {}", e);
            }
        }
        Ok(drained.len())
    }
}

impl Default for ConversationRegistry {
    fn default() -> Self {
        Self::new(ShellConfig::default())
    }
}

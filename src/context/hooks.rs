//! Lifecycle hooks called by the host application.

use tracing::info;

use super::ConversationRegistry;
use crate::Result;

/// Conversation ended: close its shell, kill its background jobs and
/// forget the context. Returns `false` for an unknown conversation.
pub fn session_end(registry: &ConversationRegistry, conversation_id: &str) -> Result<bool> {
    let Some(ctx) = registry.remove(conversation_id)? else {
        return Ok(false);
    };
    ctx.teardown()?;
    info!(conversation = conversation_id, "conversation shell cleaned up");
    Ok(true)
}

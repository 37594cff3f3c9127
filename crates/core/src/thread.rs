use tracing::{debug, info};

use crate::resolve::resolve_message_id;
use crate::store::CorrelationStore;
use crate::transport::{ForwardOutcome, Transport};
use crate::{Error, Result};

/// Hard cap on reply-chain length. The platform should never produce a
/// cycle, but a poisoned chain must fail with a distinct error instead
/// of walking forever.
pub const MAX_THREAD_DEPTH: usize = 200;

#[derive(Debug, Default, Clone)]
pub struct ThreadForwardResult {
    /// Origin-chat ids in the order they were forwarded (root first,
    /// leaf last).
    pub forwarded_ids: Vec<i64>,
}

/// Re-forwards an entire reply chain into `destination_chat`,
/// preserving chronological reading order: the oldest ancestor is
/// relayed first, the leaf last.
///
/// The leaf id is first rewritten through the correlation store, so a
/// command invoked against an already-forwarded copy still walks the
/// chain in the origin chat. Any fetch or forward failure aborts the
/// whole reconstruction; messages already forwarded stay forwarded.
pub async fn reconstruct_thread<T, S>(
    transport: &T,
    store: &S,
    destination_chat: i64,
    source_chat: i64,
    leaf_message_id: i64,
) -> Result<ThreadForwardResult>
where
    T: Transport + ?Sized,
    S: CorrelationStore + ?Sized,
{
    let leaf = resolve_message_id(store, source_chat, leaf_message_id).await;

    // Walk leaf -> root with an explicit chain instead of recursing;
    // chain length is attacker-influenced data.
    let mut chain = Vec::new();
    let mut cursor = Some(leaf);
    while let Some(message_id) = cursor {
        if chain.len() >= MAX_THREAD_DEPTH {
            return Err(Error::ChainTooDeep {
                limit: MAX_THREAD_DEPTH,
            });
        }
        let message = transport.fetch_message(source_chat, message_id).await?;
        chain.push(message.id);
        cursor = message.reply_to;
    }

    debug!(
        event = "thread.chain_resolved",
        source_chat,
        leaf_message_id = leaf,
        depth = chain.len(),
        "thread.chain_resolved"
    );

    let mut result = ThreadForwardResult::default();
    for &message_id in chain.iter().rev() {
        match transport
            .forward_message(destination_chat, source_chat, message_id)
            .await?
        {
            ForwardOutcome::Forwarded { .. } => result.forwarded_ids.push(message_id),
            ForwardOutcome::RateLimited { retry_after } => {
                // A broken step invalidates the rest of the chain; the
                // reconstructor never retries internally.
                return Err(Error::ForwardFailed {
                    message_id,
                    message: format!(
                        "rate limited for {}s during thread reconstruction",
                        retry_after.as_secs()
                    ),
                });
            }
        }
    }

    info!(
        event = "thread.forwarded",
        destination_chat,
        source_chat,
        messages = result.forwarded_ids.len(),
        "thread.forwarded"
    );
    Ok(result)
}

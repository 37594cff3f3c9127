use tracing::debug;

use crate::store::CorrelationStore;

/// Rewrites a candidate message id to the original it was forwarded
/// from, when the correlation store still remembers the pair. A miss
/// (or a failing store backend) leaves the candidate unchanged; this
/// never surfaces an error.
pub async fn resolve_message_id<S>(store: &S, chat_id: i64, candidate_message_id: i64) -> i64
where
    S: CorrelationStore + ?Sized,
{
    match store.get(chat_id, candidate_message_id).await {
        Ok(Some(original)) => original,
        Ok(None) => candidate_message_id,
        Err(e) => {
            debug!(
                event = "correlation.lookup_failed",
                chat_id,
                message_id = candidate_message_id,
                error = %e,
                "correlation.lookup_failed"
            );
            candidate_message_id
        }
    }
}

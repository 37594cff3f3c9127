use tracing::{error, info, warn};

use crate::transport::{ForwardOutcome, Transport};
use crate::Result;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkForwardResult {
    pub forwarded: u64,
    pub skipped: u64,
    pub rate_limit_waits: u64,
}

/// Forwards ids `start_message_id ..= start_message_id + count`
/// sequentially, one at a time, in increasing order.
///
/// The caller validates `count <= 100`; `count == 0` still forwards the
/// start id. A rate-limit outcome suspends for exactly the signalled
/// duration and retries the same id. Any other failure is logged and
/// skipped; a bad id never aborts the run, and nothing is rolled back.
pub async fn forward_range<T>(
    transport: &T,
    destination_chat: i64,
    source_chat: i64,
    start_message_id: i64,
    count: u32,
) -> Result<BulkForwardResult>
where
    T: Transport + ?Sized,
{
    let mut result = BulkForwardResult::default();

    // Saturate near i64::MAX: the range must stay non-empty and never
    // wrap for any start id the command layer lets through.
    let end_message_id = start_message_id.saturating_add(i64::from(count));
    for message_id in start_message_id..=end_message_id {
        loop {
            match transport
                .forward_message(destination_chat, source_chat, message_id)
                .await
            {
                Ok(ForwardOutcome::Forwarded { .. }) => {
                    result.forwarded += 1;
                    break;
                }
                Ok(ForwardOutcome::RateLimited { retry_after }) => {
                    warn!(
                        event = "telegram.rate_limited",
                        message_id,
                        retry_after_secs = retry_after.as_secs(),
                        "telegram.rate_limited"
                    );
                    result.rate_limit_waits += 1;
                    tokio::time::sleep(retry_after).await;
                }
                Err(e) => {
                    error!(
                        event = "forward.skipped",
                        message_id,
                        error = %e,
                        "forward.skipped"
                    );
                    result.skipped += 1;
                    break;
                }
            }
        }
    }

    info!(
        event = "forward.range_done",
        destination_chat,
        source_chat,
        start_message_id,
        count,
        forwarded = result.forwarded,
        skipped = result.skipped,
        rate_limit_waits = result.rate_limit_waits,
        "forward.range_done"
    );
    Ok(result)
}

use rand::Rng;
use tracing::{debug, info};

use crate::store::CorrelationStore;
use crate::transport::{ForwardOutcome, Transport};
use crate::{Error, Result};

pub const MAX_RANDOM_ATTEMPTS: u32 = 5;

/// Id 1 is reserved in a chat's numbering (service/creation message)
/// and is never sampled.
pub const MIN_SAMPLED_MESSAGE_ID: i64 = 2;

#[derive(Debug, Clone, Copy)]
pub struct RandomForwardResult {
    pub sampled_id: i64,
    pub forwarded_id: i64,
    pub attempts: u32,
}

/// Forwards a uniformly random message from `source_chat`, retrying
/// with a fresh draw on any failure up to [`MAX_RANDOM_ATTEMPTS`], then
/// propagating the last failure. On success the new forwarded copy is
/// recorded in the correlation store before returning.
///
/// The caller has already consulted the cooldown throttle.
pub async fn forward_random<T, S>(
    transport: &T,
    store: &S,
    destination_chat: i64,
    source_chat: i64,
) -> Result<RandomForwardResult>
where
    T: Transport + ?Sized,
    S: CorrelationStore + ?Sized,
{
    let last_id = transport
        .latest_message_id(source_chat)
        .await?
        .ok_or(Error::EmptyChat)?;
    if last_id < MIN_SAMPLED_MESSAGE_ID {
        return Err(Error::EmptyChat);
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        let sampled_id = rand::thread_rng().gen_range(MIN_SAMPLED_MESSAGE_ID..=last_id);

        let failure = match transport
            .forward_message(destination_chat, source_chat, sampled_id)
            .await
        {
            Ok(ForwardOutcome::Forwarded { message_id }) => {
                store.put(source_chat, message_id, sampled_id).await?;
                info!(
                    event = "forward.random",
                    destination_chat,
                    source_chat,
                    sampled_id,
                    forwarded_id = message_id,
                    attempts = attempt,
                    "forward.random"
                );
                return Ok(RandomForwardResult {
                    sampled_id,
                    forwarded_id: message_id,
                    attempts: attempt,
                });
            }
            Ok(ForwardOutcome::RateLimited { retry_after }) => Error::ForwardFailed {
                message_id: sampled_id,
                message: format!("rate limited for {}s", retry_after.as_secs()),
            },
            Err(e) => e,
        };

        if attempt >= MAX_RANDOM_ATTEMPTS {
            return Err(failure);
        }

        debug!(
            event = "forward.random_retry",
            source_chat,
            sampled_id,
            attempt,
            error = %failure,
            "forward.random_retry"
        );
    }
}

mod bulk;
pub mod config;
mod cooldown;
mod error;
mod logging;
mod resolve;
mod sample;
mod store;
mod thread;
mod transport;

pub const APP_NAME: &str = "RelayForward";

pub use bulk::{BulkForwardResult, forward_range};
pub use cooldown::{COOLDOWN_WINDOW, CooldownThrottle, MAX_USES_PER_WINDOW};
pub use error::{Error, Result};
pub use logging::{SecretRedactor, init_logging};
pub use resolve::resolve_message_id;
pub use sample::{MAX_RANDOM_ATTEMPTS, MIN_SAMPLED_MESSAGE_ID, RandomForwardResult, forward_random};
pub use store::{
    CORRELATION_TTL, CorrelationStore, InMemoryCorrelationStore, SqliteCorrelationStore,
    correlation_key,
};
pub use thread::{MAX_THREAD_DEPTH, ThreadForwardResult, reconstruct_thread};
pub use transport::{
    BotApiTransport, BotApiTransportConfig, ForwardOutcome, MessageRef, Transport,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("telegram transport error: {message}")]
    Telegram { message: String },

    #[error("forward failed for message {message_id}: {message}")]
    ForwardFailed { message_id: i64, message: String },

    #[error("reply chain too deep (limit {limit})")]
    ChainTooDeep { limit: usize },

    #[error("no messages found in source chat")]
    EmptyChat,
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

use relay_forward_core::{
    CorrelationStore, Error, ForwardOutcome, InMemoryCorrelationStore, MAX_RANDOM_ATTEMPTS,
    MessageRef, Result, Transport, forward_random,
};

enum ForwardMode {
    Succeed,
    Fail,
    RateLimit,
}

struct SamplingTransport {
    latest: Option<i64>,
    mode: ForwardMode,
    sampled: Mutex<Vec<i64>>,
    attempts: AtomicU32,
    next_id: AtomicI64,
}

impl SamplingTransport {
    fn new(latest: Option<i64>, mode: ForwardMode) -> Self {
        Self {
            latest,
            mode,
            sampled: Mutex::new(Vec::new()),
            attempts: AtomicU32::new(0),
            next_id: AtomicI64::new(9000),
        }
    }

    fn sampled(&self) -> Vec<i64> {
        self.sampled.lock().unwrap().clone()
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl Transport for SamplingTransport {
    fn provider(&self) -> &'static str {
        "test.sampling"
    }

    fn forward_message<'a>(
        &'a self,
        _destination_chat: i64,
        _source_chat: i64,
        message_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<ForwardOutcome>> + Send + 'a>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            self.sampled.lock().unwrap().push(message_id);
            match self.mode {
                ForwardMode::Succeed => Ok(ForwardOutcome::Forwarded {
                    message_id: self.next_id.fetch_add(1, Ordering::Relaxed),
                }),
                ForwardMode::Fail => Err(Error::ForwardFailed {
                    message_id,
                    message: "message not found".to_string(),
                }),
                ForwardMode::RateLimit => Ok(ForwardOutcome::RateLimited {
                    retry_after: Duration::from_secs(4),
                }),
            }
        })
    }

    fn fetch_message<'a>(
        &'a self,
        _chat: i64,
        _message_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<MessageRef>> + Send + 'a>> {
        Box::pin(async {
            Err(Error::Telegram {
                message: "fetch not supported in SamplingTransport".to_string(),
            })
        })
    }

    fn latest_message_id<'a>(
        &'a self,
        _chat: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<i64>>> + Send + 'a>> {
        Box::pin(async move { Ok(self.latest) })
    }

    fn resolve_chat<'a>(
        &'a self,
        _reference: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + 'a>> {
        Box::pin(async { Ok(0) })
    }
}

#[tokio::test]
async fn never_samples_the_reserved_id() {
    let transport = SamplingTransport::new(Some(50), ForwardMode::Succeed);
    let store = InMemoryCorrelationStore::new();

    for _ in 0..1000 {
        let result = forward_random(&transport, &store, 1, -100).await.unwrap();
        assert!(result.sampled_id >= 2 && result.sampled_id <= 50);
        assert_eq!(result.attempts, 1);
    }

    assert!(transport.sampled().iter().all(|&id| (2..=50).contains(&id)));
}

#[tokio::test]
async fn success_records_the_correlation_entry() {
    let transport = SamplingTransport::new(Some(50), ForwardMode::Succeed);
    let store = InMemoryCorrelationStore::new();

    let result = forward_random(&transport, &store, 1, -100).await.unwrap();
    assert_eq!(
        store.get(-100, result.forwarded_id).await.unwrap(),
        Some(result.sampled_id)
    );
}

#[tokio::test]
async fn empty_chat_is_reported_without_any_attempt() {
    let transport = SamplingTransport::new(None, ForwardMode::Succeed);
    let store = InMemoryCorrelationStore::new();

    let err = forward_random(&transport, &store, 1, -100).await.unwrap_err();
    assert!(matches!(err, Error::EmptyChat));
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn chat_with_only_the_reserved_id_counts_as_empty() {
    let transport = SamplingTransport::new(Some(1), ForwardMode::Succeed);
    let store = InMemoryCorrelationStore::new();

    let err = forward_random(&transport, &store, 1, -100).await.unwrap_err();
    assert!(matches!(err, Error::EmptyChat));
}

#[tokio::test]
async fn exhausted_attempts_propagate_last_failure_without_store_write() {
    let transport = SamplingTransport::new(Some(50), ForwardMode::Fail);
    let store = InMemoryCorrelationStore::new();

    let err = forward_random(&transport, &store, 1, -100).await.unwrap_err();
    assert!(matches!(err, Error::ForwardFailed { .. }));
    assert_eq!(transport.attempts(), MAX_RANDOM_ATTEMPTS);
    assert_eq!(store.entry_count().await, 0);
}

#[tokio::test]
async fn rate_limit_counts_against_the_attempt_cap() {
    let transport = SamplingTransport::new(Some(50), ForwardMode::RateLimit);
    let store = InMemoryCorrelationStore::new();

    let err = forward_random(&transport, &store, 1, -100).await.unwrap_err();
    assert!(matches!(err, Error::ForwardFailed { .. }));
    assert_eq!(transport.attempts(), MAX_RANDOM_ATTEMPTS);
    assert_eq!(store.entry_count().await, 0);
}

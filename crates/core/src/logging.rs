use std::io::Write;
use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Replaces a configured secret (the bot token) with `[REDACTED]` in
/// emitted log lines. The token appears in request URLs, so any error
/// that quotes one would otherwise leak it.
#[derive(Debug, Clone, Default)]
pub struct SecretRedactor {
    secret: Option<String>,
}

impl SecretRedactor {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }

    pub fn redact(&self, text: &str) -> String {
        match &self.secret {
            Some(secret) => text.replace(secret.as_str(), "[REDACTED]"),
            None => text.to_string(),
        }
    }
}

/// Buffers written bytes up to each newline and redacts whole lines,
/// so a secret split across two `write` calls cannot slip through.
pub struct RedactingWriter<W: Write> {
    redactor: SecretRedactor,
    buffer: Vec<u8>,
    inner: W,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(redactor: SecretRedactor, inner: W) -> Self {
        Self {
            redactor,
            buffer: Vec::new(),
            inner,
        }
    }

    fn drain_buffer(&mut self, up_to: usize) -> std::io::Result<()> {
        let chunk: Vec<u8> = self.buffer.drain(..up_to).collect();
        let text = String::from_utf8_lossy(&chunk);
        self.inner.write_all(self.redactor.redact(&text).as_bytes())
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            self.drain_buffer(pos + 1)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let len = self.buffer.len();
            self.drain_buffer(len)?;
        }
        self.inner.flush()
    }
}

impl<W: Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        // The fmt layer drops the writer after each event; anything
        // still buffered must not be lost.
        let _ = self.flush();
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SecretRedactor {
    type Writer = RedactingWriter<std::io::Stdout>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new(self.clone(), std::io::stdout())
    }
}

fn build_env_filter_from(relayforward_log: Option<&str>, rust_log: Option<&str>) -> EnvFilter {
    let default = || EnvFilter::new("info");

    if let Some(v) = relayforward_log {
        return EnvFilter::try_new(v).unwrap_or_else(|_| default());
    }
    if let Some(v) = rust_log {
        return EnvFilter::try_new(v).unwrap_or_else(|_| default());
    }
    default()
}

fn build_env_filter() -> EnvFilter {
    build_env_filter_from(
        std::env::var("RELAYFORWARD_LOG").ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
    )
}

pub fn init_logging(secret: Option<&str>) {
    TRACING_INIT.get_or_init(|| {
        let env_filter = build_env_filter();

        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .with_writer(SecretRedactor::new(secret));

        let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
        let _ = subscriber.try_init();
    });
}

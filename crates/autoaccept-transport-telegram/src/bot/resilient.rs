//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! Only transport failures (network, I/O) are retried here. Flood control and
//! API errors are returned to the caller untouched, because the pipeline
//! decides what a `RetryAfter` or a blocked user means.

use std::future::Future;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message};
use teloxide::RequestError;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

/// Initial delay between retries.
pub const INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for a single retry delay.
pub const MAX_BACKOFF_MS: u64 = 4000;
/// Retries after the first attempt.
pub const MAX_RETRIES: usize = 3;

/// Whether `err` is a transport failure worth retrying.
#[must_use]
pub const fn is_transient(err: &RequestError) -> bool {
    matches!(err, RequestError::Network(_) | RequestError::Io(_))
}

/// Run a Bot API call, retrying transport failures with exponential backoff.
///
/// # Errors
///
/// Returns the first non-transient error, or the last transient one once
/// retries are exhausted.
pub async fn retry_transient<F, Fut, T>(operation: F) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let strategy = ExponentialBackoff::from_millis(INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(MAX_BACKOFF_MS))
        .map(jitter)
        .take(MAX_RETRIES);

    RetryIf::spawn(strategy, operation, is_transient)
        .await
        .inspect_err(|e| {
            if is_transient(e) {
                warn!(attempts = MAX_RETRIES + 1, error = %e, "Telegram API operation failed");
            }
        })
}

/// Send a plain text reply with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted or on an API error.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
) -> Result<Message, RequestError> {
    let text = text.into();
    retry_transient(|| bot.send_message(chat_id, text.clone()).send()).await
}

//! Bot client capability
//!
//! The pipeline never talks to Telegram directly. Everything it needs from
//! the transport goes through [`BotClient`], and every failure comes back
//! as a typed [`ClientError`] so callers can branch exhaustively.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failures reported by the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Flood control: the caller must wait before trying again.
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),
    /// The recipient blocked the bot or can no longer receive messages.
    #[error("recipient blocked the bot")]
    Blocked,
    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

/// Identity of the user asking to join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    /// Telegram user id.
    pub id: i64,
    /// Public username, if any.
    pub username: Option<String>,
    /// First name as shown in Telegram.
    pub first_name: String,
}

/// A pending join request waiting for approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    /// Channel or group the user wants to join.
    pub chat_id: i64,
    /// Who is asking.
    pub requester: Requester,
}

/// Reference to a message that already exists in some chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// Chat holding the message.
    pub chat_id: i64,
    /// Message id within that chat.
    pub message_id: i32,
}

/// Outbound operations the pipeline needs from the transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BotClient: Send + Sync {
    /// Approve a join request.
    async fn approve_join_request(&self, request: &JoinRequest) -> Result<(), ClientError>;

    /// Send a plain text message and return a reference to it.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef, ClientError>;

    /// Replace the text of a message previously sent by the bot.
    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), ClientError>;

    /// Copy a message to a recipient without the "forwarded from" header.
    async fn copy_message(&self, to: i64, message: MessageRef) -> Result<(), ClientError>;

    /// Forward a message to a recipient.
    async fn forward_message(&self, to: i64, message: MessageRef) -> Result<(), ClientError>;
}

impl ClientError {
    /// Wait duration if this is a flood-control error.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(wait) => Some(*wait),
            _ => None,
        }
    }
}

//! Bot API implementation of [`BotClient`].

use crate::bot::resilient::retry_transient;
use async_trait::async_trait;
use autoaccept_core::{BotClient, ClientError, JoinRequest, MessageRef};
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId, UserId};
use teloxide::{ApiError, RequestError};
use tracing::debug;

/// Map a teloxide error onto the pipeline's error kinds.
#[must_use]
pub fn classify(err: RequestError) -> ClientError {
    match err {
        RequestError::RetryAfter(secs) => ClientError::RateLimited(secs.duration()),
        RequestError::Api(ApiError::BotBlocked | ApiError::UserDeactivated) => ClientError::Blocked,
        other => ClientError::Other(other.to_string()),
    }
}

/// [`BotClient`] backed by a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    /// Wrap `bot`.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl BotClient for TelegramClient {
    async fn approve_join_request(&self, request: &JoinRequest) -> Result<(), ClientError> {
        let chat = ChatId(request.chat_id);
        let user = UserId(request.requester.id.cast_unsigned());
        retry_transient(|| self.bot.approve_chat_join_request(chat, user).send())
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef, ClientError> {
        let message = retry_transient(|| self.bot.send_message(ChatId(chat_id), text).send())
            .await
            .map_err(classify)?;
        Ok(MessageRef {
            chat_id: message.chat.id.0,
            message_id: message.id.0,
        })
    }

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), ClientError> {
        let result = retry_transient(|| {
            self.bot
                .edit_message_text(ChatId(message.chat_id), MessageId(message.message_id), text)
                .send()
        })
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(RequestError::Api(ApiError::MessageNotModified)) => {
                debug!(chat_id = message.chat_id, "Message update skipped: message is not modified");
                Ok(())
            }
            Err(e) => Err(classify(e)),
        }
    }

    async fn copy_message(&self, to: i64, message: MessageRef) -> Result<(), ClientError> {
        retry_transient(|| {
            self.bot
                .copy_message(
                    ChatId(to),
                    ChatId(message.chat_id),
                    MessageId(message.message_id),
                )
                .send()
        })
        .await
        .map(|_| ())
        .map_err(classify)
    }

    async fn forward_message(&self, to: i64, message: MessageRef) -> Result<(), ClientError> {
        retry_transient(|| {
            self.bot
                .forward_message(
                    ChatId(to),
                    ChatId(message.chat_id),
                    MessageId(message.message_id),
                )
                .send()
        })
        .await
        .map(|_| ())
        .map_err(classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use teloxide::types::Seconds;

    #[test]
    fn test_retry_after_becomes_rate_limited() {
        let err = classify(RequestError::RetryAfter(Seconds::from_seconds(7)));
        assert!(matches!(err, ClientError::RateLimited(d) if d == Duration::from_secs(7)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_unreachable_users_are_blocked() {
        assert!(matches!(
            classify(RequestError::Api(ApiError::BotBlocked)),
            ClientError::Blocked
        ));
        assert!(matches!(
            classify(RequestError::Api(ApiError::UserDeactivated)),
            ClientError::Blocked
        ));
    }

    #[test]
    fn test_everything_else_is_other() {
        assert!(matches!(
            classify(RequestError::Api(ApiError::ChatNotFound)),
            ClientError::Other(_)
        ));
        assert!(matches!(
            classify(RequestError::Api(ApiError::MessageToCopyNotFound)),
            ClientError::Other(_)
        ));
    }
}

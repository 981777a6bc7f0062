use crate::bot::resilient::send_message_resilient;
use crate::bot::views;
use crate::config::BotSettings;
use anyhow::Result;
use autoaccept_core::{AccessControl, AccessError, JoinRequest, MessageRef, Requester};
use autoaccept_runtime::{BroadcastMode, Pipeline};
use std::sync::Arc;
use teloxide::prelude::Requester as _;
use teloxide::{
    prelude::*,
    types::{ChatId, ChatJoinRequest},
    utils::command::BotCommands,
};
use tracing::{debug, info};

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the command overview
    #[command(description = "Show available commands.")]
    Start,
    /// Allow-list a channel for auto-approval
    #[command(description = "Allow-list a channel.")]
    AddChannel(String),
    /// Grant admin access (owner only)
    #[command(description = "Grant admin access.")]
    GiveAccess(String),
    /// Arm a copy broadcast
    #[command(description = "Broadcast the next message as a copy.")]
    Broadcast,
    /// Arm a forward broadcast
    #[command(description = "Broadcast the next message as a forward.")]
    BroadcastForwardMsg,
    /// Stop the running broadcast
    #[command(description = "Cancel the running broadcast.")]
    CancelBroadcast,
    /// Show the last broadcast report
    #[command(description = "Show the last broadcast report.")]
    LastBroadcast,
    /// Show lifetime statistics
    #[command(description = "Show bot statistics.")]
    Stats,
    /// Show queue depths
    #[command(description = "Show queue depths.")]
    Rate,
}

/// Why an id argument was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdArgError {
    /// No argument was given.
    Missing,
    /// The argument is not an integer.
    Invalid,
}

/// Parse the first whitespace-separated token of `args` as an id.
///
/// # Errors
///
/// Returns [`IdArgError`] if the token is missing or not an integer.
pub fn parse_id(args: &str) -> Result<i64, IdArgError> {
    let token = args.split_whitespace().next().ok_or(IdArgError::Missing)?;
    token.parse().map_err(|_| IdArgError::Invalid)
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Whether `msg` carries content that can be broadcast.
#[must_use]
pub fn is_broadcast_payload(msg: &Message) -> bool {
    msg.text().is_some() || msg.photo().is_some() || msg.video().is_some() || msg.document().is_some()
}

/// Convert a Telegram join request into the pipeline's request type.
#[must_use]
pub fn join_request_from(request: &ChatJoinRequest) -> JoinRequest {
    JoinRequest {
        chat_id: request.chat.id.0,
        requester: Requester {
            id: request.from.id.0.cast_signed(),
            username: request.from.username.clone(),
            first_name: request.from.first_name.clone(),
        },
    }
}

async fn reply(bot: &Bot, msg: &Message, text: impl Into<String>) -> Result<()> {
    send_message_resilient(bot, msg.chat.id, text).await?;
    Ok(())
}

/// Reply with the denial text when the sender is not authorized.
///
/// Returns `true` when the caller may proceed.
async fn ensure_authorized(bot: &Bot, msg: &Message, access: &AccessControl) -> Result<bool> {
    let user_id = get_user_id_safe(msg);
    if access.is_authorized(user_id).await {
        return Ok(true);
    }
    info!(user_id, "⛔️ Unauthorized command, sending denial");
    reply(bot, msg, views::DENIED).await?;
    Ok(false)
}

async fn id_argument(
    bot: &Bot,
    msg: &Message,
    args: &str,
    command: &str,
    kind: &str,
) -> Result<Option<i64>> {
    match parse_id(args) {
        Ok(id) => Ok(Some(id)),
        Err(IdArgError::Missing) => {
            reply(bot, msg, views::usage_text(command, &format!("{kind}_id"))).await?;
            Ok(None)
        }
        Err(IdArgError::Invalid) => {
            reply(bot, msg, views::invalid_id_text(kind)).await?;
            Ok(None)
        }
    }
}

/// Start handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn start(
    bot: Bot,
    msg: Message,
    access: Arc<AccessControl>,
    settings: Arc<BotSettings>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!(user_id, "User initiated /start command.");

    if access.is_authorized(user_id).await {
        reply(&bot, &msg, views::help_text()).await
    } else {
        reply(
            &bot,
            &msg,
            views::restricted_text(settings.telegram.access_contact()),
        )
        .await
    }
}

/// `/addchannel <id>` handler
///
/// # Errors
///
/// Returns an error if the channel list cannot be persisted or the reply
/// cannot be sent.
pub async fn add_channel(
    bot: Bot,
    msg: Message,
    args: String,
    access: Arc<AccessControl>,
    pipeline: Arc<Pipeline>,
) -> Result<()> {
    if !ensure_authorized(&bot, &msg, &access).await? {
        return Ok(());
    }
    let Some(channel_id) = id_argument(&bot, &msg, &args, "addchannel", "channel").await? else {
        return Ok(());
    };

    let added = pipeline.store().add_channel(channel_id).await;
    if added {
        pipeline.store().flush().await?;
        info!(channel_id, "Channel allow-listed");
    }
    reply(&bot, &msg, views::channel_added_text(added)).await
}

/// `/giveaccess <id>` handler
///
/// # Errors
///
/// Returns an error if the grant cannot be persisted or the reply cannot be
/// sent.
pub async fn give_access(
    bot: Bot,
    msg: Message,
    args: String,
    access: Arc<AccessControl>,
) -> Result<()> {
    if !ensure_authorized(&bot, &msg, &access).await? {
        return Ok(());
    }
    let caller = get_user_id_safe(&msg);
    if !access.is_owner(caller) {
        return reply(&bot, &msg, views::OWNER_ONLY).await;
    }
    let Some(target) = id_argument(&bot, &msg, &args, "giveaccess", "user").await? else {
        return Ok(());
    };

    let newly_granted = match access.grant(caller, target).await {
        Ok(granted) => granted,
        Err(AccessError::NotOwner) => return reply(&bot, &msg, views::OWNER_ONLY).await,
        Err(e) => return Err(e.into()),
    };
    reply(&bot, &msg, views::access_granted_text(target, newly_granted)).await?;

    if newly_granted {
        if let Err(e) = bot
            .send_message(ChatId(target), views::ACCESS_GRANTED_NOTICE)
            .await
        {
            debug!(target_id = target, error = %e, "Could not notify granted user");
        }
    }
    Ok(())
}

/// `/broadcast` and `/broadcastforwardmsg` handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn arm_broadcast(
    bot: Bot,
    msg: Message,
    mode: BroadcastMode,
    access: Arc<AccessControl>,
    pipeline: Arc<Pipeline>,
) -> Result<()> {
    if !ensure_authorized(&bot, &msg, &access).await? {
        return Ok(());
    }
    let result = pipeline.broadcasts().arm(msg.chat.id.0, mode).await;
    reply(&bot, &msg, views::arm_text(mode, result)).await
}

/// `/cancelbroadcast` handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn cancel_broadcast(
    bot: Bot,
    msg: Message,
    access: Arc<AccessControl>,
    pipeline: Arc<Pipeline>,
) -> Result<()> {
    if !ensure_authorized(&bot, &msg, &access).await? {
        return Ok(());
    }
    let outcome = pipeline.broadcasts().cancel(msg.chat.id.0).await;
    reply(&bot, &msg, views::cancel_text(outcome)).await
}

/// `/lastbroadcast` handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn last_broadcast(
    bot: Bot,
    msg: Message,
    access: Arc<AccessControl>,
    pipeline: Arc<Pipeline>,
) -> Result<()> {
    if !ensure_authorized(&bot, &msg, &access).await? {
        return Ok(());
    }
    match pipeline.broadcasts().last_report(msg.chat.id.0).await {
        Some(report) => reply(&bot, &msg, views::report_text(&report)).await,
        None => reply(&bot, &msg, views::NO_REPORT).await,
    }
}

/// `/stats` handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn stats(
    bot: Bot,
    msg: Message,
    access: Arc<AccessControl>,
    pipeline: Arc<Pipeline>,
) -> Result<()> {
    if !ensure_authorized(&bot, &msg, &access).await? {
        return Ok(());
    }
    let stats = pipeline.store().stats().await;
    reply(&bot, &msg, views::stats_text(&stats)).await
}

/// `/rate` handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn rate(
    bot: Bot,
    msg: Message,
    access: Arc<AccessControl>,
    pipeline: Arc<Pipeline>,
) -> Result<()> {
    if !ensure_authorized(&bot, &msg, &access).await? {
        return Ok(());
    }
    reply(&bot, &msg, views::rate_text(&pipeline.queue_depths())).await
}

/// Start the pending broadcast of this chat with `msg` as its payload.
///
/// Messages from unauthorized users, or in chats without a pending
/// broadcast, are ignored.
pub async fn broadcast_payload(msg: Message, access: Arc<AccessControl>, pipeline: Arc<Pipeline>) {
    let user_id = get_user_id_safe(&msg);
    if !access.is_authorized(user_id).await {
        return;
    }
    let payload = MessageRef {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
    };
    if pipeline.broadcasts().start(payload.chat_id, payload).await.is_some() {
        info!(user_id, chat_id = payload.chat_id, "Broadcast payload received");
    }
}

/// Queue an incoming join request.
pub async fn join_request(request: ChatJoinRequest, pipeline: Arc<Pipeline>) {
    let request = join_request_from(&request);
    let (chat_id, user_id) = (request.chat_id, request.requester.id);
    if pipeline.submit_join_request(request).await {
        debug!(chat_id, user_id, "Join request queued");
    } else {
        debug!(chat_id, user_id, "Join request for unlisted chat ignored");
    }
}

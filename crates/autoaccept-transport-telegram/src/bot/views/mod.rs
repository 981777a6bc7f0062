//! View layer for bot replies
//!
//! Every text the bot sends in response to a command lives here.

use autoaccept_core::StoreStats;
use autoaccept_runtime::{ArmError, BroadcastMode, BroadcastReport, CancelOutcome, QueueDepths};
use chrono::{DateTime, Utc};

/// Reply to any admin command from an unauthorized user.
pub const DENIED: &str = "❌ You are not authorized to use this bot.";
/// Reply to `/giveaccess` from an authorized user who is not the owner.
pub const OWNER_ONLY: &str = "❌ Only main admin can grant access.";
/// Notice sent to a newly granted user.
pub const ACCESS_GRANTED_NOTICE: &str = "✅ You have been granted access to the bot.";
/// Reply to `/lastbroadcast` before any run finished.
pub const NO_REPORT: &str = "ℹ️ No broadcast report found.";

/// Command overview shown by `/start`.
#[must_use]
pub fn help_text() -> String {
    "👋 Welcome\n\n\
     Available Commands:\n\
     /addchannel <channel_id>\n\
     /broadcast\n\
     /broadcastforwardmsg\n\
     /cancelbroadcast\n\
     /lastbroadcast\n\
     /stats\n\
     /rate\n\
     /giveaccess <user_id>"
        .to_string()
}

/// `/start` reply for unauthorized users.
#[must_use]
pub fn restricted_text(contact: Option<&str>) -> String {
    match contact {
        Some(contact) => format!("🚫 Access Restricted\n\nContact here for access 👉 {contact}"),
        None => "🚫 Access Restricted".to_string(),
    }
}

/// Usage line for a command taking an id.
#[must_use]
pub fn usage_text(command: &str, placeholder: &str) -> String {
    format!("Usage: /{command} <{placeholder}>")
}

/// Reply to a malformed id argument.
#[must_use]
pub fn invalid_id_text(kind: &str) -> String {
    format!("Invalid {kind} ID.")
}

/// Reply to `/addchannel`.
#[must_use]
pub const fn channel_added_text(added: bool) -> &'static str {
    if added {
        "✅ Channel added successfully."
    } else {
        "ℹ️ Channel already exists."
    }
}

/// Reply to `/giveaccess`.
#[must_use]
pub fn access_granted_text(user_id: i64, newly_granted: bool) -> String {
    if newly_granted {
        format!("✅ Access granted to user {user_id}")
    } else {
        format!("ℹ️ User {user_id} already has access.")
    }
}

/// Reply to `/broadcast` and `/broadcastforwardmsg`.
#[must_use]
pub const fn arm_text(mode: BroadcastMode, result: Result<(), ArmError>) -> &'static str {
    match (result, mode) {
        (Ok(()), BroadcastMode::Copy) => "📢 Send message to broadcast (DM only).",
        (Ok(()), BroadcastMode::Forward) => "📨 Forward message to broadcast.",
        (Err(ArmError::AlreadyPending), _) => "⚠️ Broadcast already pending.",
        (Err(ArmError::AlreadyRunning), _) => "⚠️ Broadcast already running.",
    }
}

/// Reply to `/cancelbroadcast`.
#[must_use]
pub const fn cancel_text(outcome: CancelOutcome) -> &'static str {
    match outcome {
        CancelOutcome::Requested => "❌ Broadcast cancellation requested.",
        CancelOutcome::AlreadyRequested => "ℹ️ Broadcast already cancelling.",
        CancelOutcome::NotRunning => "ℹ️ Broadcast not started yet.",
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Reply to `/lastbroadcast`.
#[must_use]
pub fn report_text(report: &BroadcastReport) -> String {
    format!(
        "📊 Last Broadcast Report\n\n\
         🟢 Status: {}\n\
         🕒 Started: {}\n\
         🕓 Ended: {}\n\n\
         🎯 Targeted: {}\n\
         📤 Delivered: {}\n\
         🚫 Blocked: {}",
        report.status.as_str().to_uppercase(),
        timestamp(report.started_at),
        timestamp(report.ended_at),
        report.total,
        report.sent,
        report.blocked
    )
}

/// Reply to `/stats`.
#[must_use]
pub fn stats_text(stats: &StoreStats) -> String {
    format!(
        "📊 Bot Stats\n\n\
         👥 Active Users: {}\n\
         📢 Channels: {}\n\
         ✅ Approved Requests: {}\n\
         📨 Broadcasts: {}\n\
         🚫 Total Blocked (lifetime): {}",
        stats.active_users,
        stats.channels,
        stats.counters.approved_requests,
        stats.counters.broadcasts,
        stats.counters.blocked_users
    )
}

/// Reply to `/rate`.
#[must_use]
pub fn rate_text(depths: &QueueDepths) -> String {
    format!(
        "📈 Join Queue: {}\n\
         📬 Welcome Queue: {}\n\
         ⚙️ Workers: {}\n\
         🔒 Approvals concurrency: {}",
        depths.join_queue, depths.welcome_queue, depths.workers, depths.approve_concurrency
    )
}

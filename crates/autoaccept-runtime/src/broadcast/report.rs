use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a broadcast run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastStatus {
    /// Every targeted user was attempted.
    Completed,
    /// Stopped early by `/cancelbroadcast`.
    Cancelled,
}

impl BroadcastStatus {
    /// Lowercase name used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Outcome of the most recent broadcast in a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    /// How the run ended.
    pub status: BroadcastStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub ended_at: DateTime<Utc>,
    /// Users targeted, fixed when the run started.
    pub total: usize,
    /// Users actually attempted before the run ended.
    pub processed: usize,
    /// Successful deliveries.
    pub sent: usize,
    /// Deliveries refused because the user blocked the bot.
    pub blocked: usize,
}

impl BroadcastReport {
    /// Attempts that neither succeeded nor hit a block.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.processed.saturating_sub(self.sent + self.blocked)
    }
}

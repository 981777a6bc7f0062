#![deny(missing_docs)]
//! Autoaccept runtime.
//!
//! The concurrent pipeline behind the bot: join-request workers, the welcome
//! worker and background broadcasts. Transport-agnostic; everything outbound
//! goes through [`autoaccept_core::BotClient`].

/// Approval worker pool.
pub mod approval;
/// Broadcast sessions and the broadcast task.
pub mod broadcast;
/// Application state wiring the workers together.
pub mod pipeline;
/// Unbounded FIFO work queue shared by workers.
pub mod queue;
/// Welcome notification worker.
pub mod welcome;

pub use approval::{ApprovalOutcome, ApprovalPool};
pub use broadcast::{
    ArmError, BroadcastController, BroadcastMode, BroadcastReport, BroadcastStatus, CancelOutcome,
    SessionStatus,
};
pub use pipeline::{Pipeline, QueueDepths};
pub use queue::WorkQueue;
pub use welcome::{WelcomeOutcome, WelcomeWorker};

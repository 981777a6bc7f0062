#![deny(missing_docs)]
//! Autoaccept core library.
//!
//! Transport-agnostic building blocks: configuration, the bot client
//! capability, JSON persistence and access control.

/// Access control for the admin surface.
pub mod access;
/// Bot client capability consumed by the pipeline.
pub mod client;
/// Configuration management.
pub mod config;
/// Persistent JSON store.
pub mod storage;

pub use access::{AccessControl, AccessError};
pub use client::{BotClient, ClientError, JoinRequest, MessageRef, Requester};
pub use config::PipelineSettings;
pub use storage::{Counters, StorageError, Store, StoreStats, UserRecord};

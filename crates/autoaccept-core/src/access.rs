//! Two-tier access control
//!
//! The owner configured at startup is always authorized. Everybody else needs
//! an explicit grant from the owner, which is persisted with the store.

use crate::storage::{StorageError, Store};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Reasons a grant can be refused.
#[derive(Error, Debug)]
pub enum AccessError {
    /// Only the owner may grant access.
    #[error("only the owner can grant access")]
    NotOwner,
    /// The grant could not be persisted.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Decides who may use the admin surface.
#[derive(Clone)]
pub struct AccessControl {
    owner: i64,
    store: Arc<Store>,
}

impl AccessControl {
    /// Create access control for `owner` backed by the store's allow-list.
    #[must_use]
    pub const fn new(owner: i64, store: Arc<Store>) -> Self {
        Self { owner, store }
    }

    /// The always-authorized principal.
    #[must_use]
    pub const fn owner(&self) -> i64 {
        self.owner
    }

    /// Whether `user_id` is the owner.
    #[must_use]
    pub const fn is_owner(&self, user_id: i64) -> bool {
        user_id == self.owner
    }

    /// Whether `user_id` may use admin commands.
    pub async fn is_authorized(&self, user_id: i64) -> bool {
        self.is_owner(user_id) || self.store.is_admin_granted(user_id).await
    }

    /// Grant `target` admin access on behalf of `caller`.
    ///
    /// Returns `Ok(false)` when `target` already had access. The allow-list
    /// is flushed immediately.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NotOwner`] if `caller` is not the owner, or a
    /// storage error if the flush fails.
    pub async fn grant(&self, caller: i64, target: i64) -> Result<bool, AccessError> {
        if !self.is_owner(caller) {
            return Err(AccessError::NotOwner);
        }
        let granted = self.store.grant_admin(target).await;
        self.store.flush().await?;
        info!(target_id = target, granted, "Admin access granted");
        Ok(granted)
    }
}

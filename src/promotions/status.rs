//! Promotion Status

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::promotions::schedule::ValidityWindow;

/// Lifecycle status of a promotion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    /// Created, awaiting approval
    #[default]
    Draft,

    /// Redeemable while inside its validity window
    Active,

    /// Temporarily not redeemable
    Paused,

    /// Validity window has passed (terminal)
    Expired,

    /// Withdrawn before any use (terminal)
    Cancelled,
}

/// Manual status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusAction {
    /// `draft → active`
    Approve,

    /// `active → paused`
    Pause,

    /// `paused → active`
    Resume,

    /// `draft | active | paused → cancelled`, only while unused
    Cancel,
}

/// Rejected status changes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The action is not available from the current status.
    #[error("cannot {action} a promotion that is {from}")]
    NotPermitted {
        /// Effective status at the time of the action
        from: PromotionStatus,

        /// Requested action
        action: StatusAction,
    },

    /// Cancelling is only allowed before the first redemption.
    #[error("cannot cancel a promotion that has been redeemed {used} time(s)")]
    CancelWithUsage {
        /// Redemptions committed so far
        used: u64,
    },
}

impl PromotionStatus {
    /// Stable name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled)
    }

    /// Status after applying date-based expiry at `now`.
    ///
    /// Every consumer (evaluation, listing, lifecycle actions and the sweep)
    /// goes through this function.
    pub fn effective(self, window: &ValidityWindow, now: Timestamp) -> Self {
        match self {
            Self::Active | Self::Paused if window.has_ended(now) => Self::Expired,
            status => status,
        }
    }

    /// Apply a manual action to an effective status.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::CancelWithUsage`] when cancelling a redeemed
    /// promotion and [`TransitionError::NotPermitted`] for any other
    /// unavailable action.
    pub fn apply(self, action: StatusAction, total_used: u64) -> Result<Self, TransitionError> {
        match (self, action) {
            (Self::Draft, StatusAction::Approve) | (Self::Paused, StatusAction::Resume) => {
                Ok(Self::Active)
            }
            (Self::Active, StatusAction::Pause) => Ok(Self::Paused),
            (Self::Draft | Self::Active | Self::Paused, StatusAction::Cancel) => {
                if total_used == 0 {
                    Ok(Self::Cancelled)
                } else {
                    Err(TransitionError::CancelWithUsage { used: total_used })
                }
            }
            (from, action) => Err(TransitionError::NotPermitted { from, action }),
        }
    }
}

impl fmt::Display for PromotionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for StatusAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "approve",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
        })
    }
}

//! Payment state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of a payment.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Completed ──► Refunded
///           └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Intent created, awaiting confirmation.
    #[default]
    Pending,

    /// Money captured.
    Completed,

    /// Charge declined or otherwise failed (terminal state).
    Failed,

    /// Money returned to the customer (terminal state).
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    /// Returns the statuses reachable from this one in a single step.
    pub fn allowed_transitions(&self) -> &'static [PaymentStatus] {
        match self {
            PaymentStatus::Pending => &[PaymentStatus::Completed, PaymentStatus::Failed],
            PaymentStatus::Completed => &[PaymentStatus::Refunded],
            PaymentStatus::Failed | PaymentStatus::Refunded => &[],
        }
    }

    /// Returns true if the payment may move to `next`.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if a payment in this status already reflects `target`.
    ///
    /// That is the case when it is in `target` or has moved past it; a
    /// refunded payment was necessarily completed first.
    pub fn has_reached(&self, target: PaymentStatus) -> bool {
        *self == target || (*self == PaymentStatus::Refunded && target == PaymentStatus::Completed)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown payment status: {s}"))
    }
}

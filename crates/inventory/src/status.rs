//! Transfer lifecycle states and the single table deciding which actions are legal.
//!
//! ```text
//! DRAFT ──ship──▶ SHIPPED ──receive──▶ RECEIVED
//!   │                │
//!   └──cancel──▶ CANCELLED ◀──cancel──┘
//! ```
//!
//! `Edit` and `Delete` are only legal in `DRAFT`. `RECEIVED` and `CANCELLED`
//! are terminal.

use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Draft,
    Shipped,
    Received,
    Cancelled,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferAction {
    Edit,
    Delete,
    Ship,
    Receive,
    Cancel,
}

/// (current, action) → next. Anything absent is illegal.
const TRANSITIONS: &[(TransferStatus, TransferAction, TransferStatus)] = &[
    (TransferStatus::Draft, TransferAction::Edit, TransferStatus::Draft),
    (TransferStatus::Draft, TransferAction::Delete, TransferStatus::Draft),
    (TransferStatus::Draft, TransferAction::Ship, TransferStatus::Shipped),
    (TransferStatus::Draft, TransferAction::Cancel, TransferStatus::Cancelled),
    (TransferStatus::Shipped, TransferAction::Receive, TransferStatus::Received),
    (TransferStatus::Shipped, TransferAction::Cancel, TransferStatus::Cancelled),
];

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Draft => "DRAFT",
            TransferStatus::Shipped => "SHIPPED",
            TransferStatus::Received => "RECEIVED",
            TransferStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Received | TransferStatus::Cancelled)
    }

    /// Next status if `action` is legal from `self`.
    pub fn next(self, action: TransferAction) -> Option<TransferStatus> {
        TRANSITIONS
            .iter()
            .find(|(from, a, _)| *from == self && *a == action)
            .map(|(_, _, to)| *to)
    }

    /// Like [`next`](Self::next) but yields the conflict error callers surface.
    pub fn ensure(self, action: TransferAction) -> DomainResult<TransferStatus> {
        self.next(action).ok_or_else(|| {
            DomainError::conflict(format!(
                "cannot {} transfer in status {}",
                action.as_str(),
                self.as_str()
            ))
        })
    }
}

impl core::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TransferAction {
    pub const ALL: [TransferAction; 5] = [
        TransferAction::Edit,
        TransferAction::Delete,
        TransferAction::Ship,
        TransferAction::Receive,
        TransferAction::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferAction::Edit => "edit",
            TransferAction::Delete => "delete",
            TransferAction::Ship => "ship",
            TransferAction::Receive => "receive",
            TransferAction::Cancel => "cancel",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_allow_nothing() {
        for status in [TransferStatus::Received, TransferStatus::Cancelled] {
            assert!(status.is_terminal());
            for action in TransferAction::ALL {
                assert_eq!(status.next(action), None, "{status} / {action:?}");
            }
        }
    }

    #[test]
    fn shipped_transfers_can_only_be_received_or_cancelled() {
        let legal: Vec<_> = TransferAction::ALL
            .into_iter()
            .filter(|a| TransferStatus::Shipped.next(*a).is_some())
            .collect();
        assert_eq!(legal, vec![TransferAction::Receive, TransferAction::Cancel]);
    }

    #[test]
    fn illegal_action_is_a_conflict_naming_the_status() {
        assert_eq!(
            TransferStatus::Shipped.ensure(TransferAction::Ship).unwrap_err(),
            DomainError::conflict("cannot ship transfer in status SHIPPED")
        );
        assert_eq!(
            TransferStatus::Draft.ensure(TransferAction::Ship).unwrap(),
            TransferStatus::Shipped
        );
    }
}

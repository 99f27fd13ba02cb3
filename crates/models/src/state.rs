use std::fmt;

use serde::{Deserialize, Serialize};

/// Externally-visible status of a request, projected from
/// [`InternalRequestState`].
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum RequestState {
    /// The request is queued or being applied.
    Waiting,

    /// The request was applied and committed.
    Success,

    /// The request failed; compensating reverts may still be in flight.
    Failed,

    /// Cancellation was requested; reverts are in flight.
    Canceling,

    /// The request was cancelled and reverted.
    Cancelled,

    /// The request required no action.
    InvalidRequestNoop,

    /// The request's state could not be determined.
    Unknown,
}

/// The complete state machine driving a request from submission to a
/// terminal state.
///
/// `Pending` is the initial state. `CancelledSendRevertRequests` is reachable
/// only from cancelable states. `Completed` is the sole success state.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum InternalRequestState {
    /// Admitted and awaiting pickup by the worker.
    Pending,

    /// Validation during processing found nothing to do.
    InvalidRequestNoop,

    /// Apply requests are being dispatched to agents.
    SendApplyRequests,

    /// Waiting on agent acknowledgements for apply requests.
    CheckApplyResponses,

    /// All agents acknowledged; the request has been committed.
    Completed,

    /// Apply failed; revert requests are being dispatched.
    FailedSendRevertRequests,

    /// Apply failed; waiting on agent acknowledgements for reverts.
    FailedCheckRevertResponses,

    /// Apply failed and the revert also failed.
    FailedRevertFailed,

    /// Apply failed and the revert completed.
    FailedReverted,

    /// Cancellation accepted; revert requests are being dispatched.
    CancelledSendRevertRequests,

    /// Cancellation accepted; waiting on agent acknowledgements for reverts.
    CancelledCheckRevertResponses,

    /// Cancellation completed.
    Cancelled,
}

impl InternalRequestState {
    /// The externally-visible projection of this state.
    #[must_use]
    pub const fn public_state(self) -> RequestState {
        match self {
            Self::Pending | Self::SendApplyRequests | Self::CheckApplyResponses => {
                RequestState::Waiting
            }
            Self::InvalidRequestNoop => RequestState::InvalidRequestNoop,
            Self::Completed => RequestState::Success,
            Self::FailedSendRevertRequests
            | Self::FailedCheckRevertResponses
            | Self::FailedRevertFailed
            | Self::FailedReverted => RequestState::Failed,
            Self::CancelledSendRevertRequests | Self::CancelledCheckRevertResponses => {
                RequestState::Canceling
            }
            Self::Cancelled => RequestState::Cancelled,
        }
    }

    /// Whether a cancellation may still be accepted from this state.
    ///
    /// Only pre-commit forward states are cancelable; once reverts are in
    /// flight or a terminal state is reached, cancellation is a no-op.
    #[must_use]
    pub const fn is_cancelable(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::SendApplyRequests | Self::CheckApplyResponses
        )
    }

    /// Whether this state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::InvalidRequestNoop
                | Self::Completed
                | Self::FailedRevertFailed
                | Self::FailedReverted
                | Self::Cancelled
        )
    }

    /// Whether this state represents overall success.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for InternalRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_is_cancelable_and_waiting() {
        assert!(InternalRequestState::Pending.is_cancelable());
        assert!(!InternalRequestState::Pending.is_terminal());
        assert_eq!(
            InternalRequestState::Pending.public_state(),
            RequestState::Waiting
        );
    }

    #[test]
    fn test_completed_is_sole_success() {
        for state in [
            InternalRequestState::Pending,
            InternalRequestState::InvalidRequestNoop,
            InternalRequestState::SendApplyRequests,
            InternalRequestState::CheckApplyResponses,
            InternalRequestState::FailedSendRevertRequests,
            InternalRequestState::FailedCheckRevertResponses,
            InternalRequestState::FailedRevertFailed,
            InternalRequestState::FailedReverted,
            InternalRequestState::CancelledSendRevertRequests,
            InternalRequestState::CancelledCheckRevertResponses,
            InternalRequestState::Cancelled,
        ] {
            assert!(!state.is_success());
        }
        assert!(InternalRequestState::Completed.is_success());
        assert!(InternalRequestState::Completed.is_terminal());
    }

    #[test]
    fn test_cancellation_states_are_not_cancelable() {
        assert!(!InternalRequestState::CancelledSendRevertRequests.is_cancelable());
        assert!(!InternalRequestState::CancelledCheckRevertResponses.is_cancelable());
        assert!(!InternalRequestState::Cancelled.is_cancelable());
        assert_eq!(
            InternalRequestState::CancelledSendRevertRequests.public_state(),
            RequestState::Canceling
        );
    }

    #[test]
    fn test_terminal_states_are_not_cancelable() {
        for state in [
            InternalRequestState::InvalidRequestNoop,
            InternalRequestState::Completed,
            InternalRequestState::FailedRevertFailed,
            InternalRequestState::FailedReverted,
            InternalRequestState::Cancelled,
        ] {
            assert!(state.is_terminal());
            assert!(!state.is_cancelable());
        }
    }
}

//! Actions processed by the dispatch reducer.

use crate::error::DispatchError;
use crate::types::{ActorId, CorrelationId, Location, RequestId, ServiceKind};

/// Everything that can happen to dispatch state
///
/// Three families share one reducer:
///
/// - **Commands** carry a [`CorrelationId`] and always produce exactly one
///   outcome action ([`CommandSucceeded`](Self::CommandSucceeded) or
///   [`CommandFailed`](Self::CommandFailed)) via an effect, which is how
///   callers learn the result.
/// - **Simulator transitions** (`Simulate*`) fire from delayed effects.
///   They re-validate their guard against current state and drop silently
///   if it no longer holds.
/// - **Outcomes** mutate nothing; they exist to travel the broadcast
///   channel back to waiting callers.
#[derive(Debug, Clone)]
pub enum DispatchAction {
    /// Create a new pending request for the signed-in requester
    CreateRequest {
        /// Token echoed on the outcome
        correlation: CorrelationId,
        /// Pre-allocated id for the new request
        id: RequestId,
        /// The requester on whose behalf the request is created
        requester: ActorId,
        /// Category of service needed
        kind: ServiceKind,
        /// Free-text description of the problem
        description: String,
        /// Where service is needed
        location: Location,
    },

    /// Cancel a pending or accepted request
    CancelRequest {
        /// Token echoed on the outcome
        correlation: CorrelationId,
        /// The request to cancel
        id: RequestId,
    },

    /// Accept a pending request as a provider
    AcceptRequest {
        /// Token echoed on the outcome
        correlation: CorrelationId,
        /// The request to accept
        id: RequestId,
        /// The accepting provider
        provider: ActorId,
        /// Estimated minutes until arrival
        eta_minutes: u32,
    },

    /// Complete an in-progress request
    CompleteRequest {
        /// Token echoed on the outcome
        correlation: CorrelationId,
        /// The request to complete
        id: RequestId,
    },

    /// Simulator: a provider accepts this request if it is still pending
    SimulateAccept {
        /// The request the simulator targets
        id: RequestId,
    },

    /// Simulator: work starts on this request if it is still accepted
    SimulateProgress {
        /// The request the simulator targets
        id: RequestId,
    },

    /// A command went through
    CommandSucceeded {
        /// Token of the command this answers
        correlation: CorrelationId,
    },

    /// A command was rejected
    CommandFailed {
        /// Token of the command this answers
        correlation: CorrelationId,
        /// Why it was rejected
        error: DispatchError,
    },
}

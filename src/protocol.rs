//! The node network message protocol.

use crate::ordering;
use crate::yac;
use actix_derive::{Message, MessageResponse};

#[derive(Debug, Clone, Serialize, Deserialize, Message)]
#[rtype(result = "Response")]
pub enum Request {
    // Ordering
    GetProposal(ordering::GetProposal),
    PushBatches(ordering::PushBatches),
    // Yac
    State(yac::State),
}

#[derive(Debug, Clone, Serialize, Deserialize, MessageResponse)]
pub enum Response {
    // Ordering
    Proposal(ordering::ProposalReply),
    BatchesAck,
    // Yac
    StateAck,
    /// Malformed payload; the sender must not retry it as-is.
    Cancelled,
    // Error
    Unknown,
}

//! Yac vote transport: fan-out of vote bundles to peers and reception of
//! inbound bundles, with a cooperative stop gate.

mod network;
mod outcome_delay;
mod vote;

pub use network::*;
pub use outcome_delay::*;
pub use vote::*;

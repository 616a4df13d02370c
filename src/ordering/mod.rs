//! On-demand ordering: the gate, the connection manager and the per-node
//! ordering service.

mod cache;
mod connection;
mod gate;
mod service;
mod strategy;

pub use cache::*;
pub use connection::*;
pub use gate::*;
pub use service::*;
pub use strategy::*;

#[derive(Debug)]
pub enum Error {
    /// The ledger peer list is empty; no role assignment is possible.
    EmptyLedgerPeers,
    /// The block-hash window does not hold three hashes yet.
    WindowNotPrimed,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

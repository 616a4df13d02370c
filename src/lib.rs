//! # Boreal
//!
//! Boreal is the core of a permissioned BFT node: the on-demand ordering
//! subsystem, the YAC vote transport and the round progression machinery
//! binding them together.
//!
//! ## Ordering
//!
//! The ordering component decides which peer assembles the proposal for each
//! consensus round. An [ordering gate](ordering::OrderingGate) consumes
//! synchronization outcomes and committed blocks, a
//! [connection manager](ordering::ConnectionManager) derives the per-round
//! peer roles from deterministic permutations of the ledger peer list, and an
//! [ordering service](ordering::OrderingService) answers proposal requests
//! from a queue of admitted transaction batches.
//!
//! ## Yac
//!
//! Yac is the voting transport: it fans vote bundles out to peers and hands
//! inbound bundles to the subscribed consensus handler.

#[macro_use]
extern crate serde_derive;
extern crate actix_derive;
extern crate colored;

pub mod channel;
pub mod client;
pub mod protocol;
pub mod server;
pub mod util;

pub mod ledger;
pub mod ordering;
pub mod permutation;
pub mod proposal;
pub mod round;
pub mod tx;
pub mod tx_cache;
pub mod yac;

#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),
    Dalek(ed25519_dalek::ed25519::Error),
    Actix(actix::MailboxError),

    // channel errors
    ChannelError(String),

    // configuration errors
    Config(String),
    PeerParseError,
    HashParseError,

    // client errors
    Timeout,
    EmptyResponse,
    UnexpectedResponse,
}

impl std::error::Error for Error {}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(error)
    }
}

impl std::convert::From<actix::MailboxError> for Error {
    fn from(error: actix::MailboxError) -> Self {
        Error::Actix(error)
    }
}

impl std::convert::From<ed25519_dalek::ed25519::Error> for Error {
    fn from(error: ed25519_dalek::ed25519::Error) -> Self {
        Error::Dalek(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Builds the actor graph of a node core from its settings.

use std::convert::TryInto;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use crate::client::Client;
use crate::colored::Colorize;
use crate::ledger::BlockHash;
use crate::ordering::{
    ConnectionManager, OrderingGate, OrderingService, RoundProposal, UniqueCreationStrategy,
};
use crate::proposal::UncheckedProposalFactory;
use crate::round::Round;
use crate::server::settings::Settings;
use crate::server::{Router, Server};
use crate::tx_cache::MemoryTxCache;
use crate::util;
use crate::yac::YacNetwork;
use crate::{Error, Result};

use actix::{Actor, Arbiter, Context, Handler};
use ed25519_dalek::{Keypair, PublicKey, SecretKey};
use rand::RngCore;
use tracing::info;

/// Downstream sink for round proposals. A consensus or simulation component
/// subscribes here in a full deployment; the bare core logs what it would
/// hand over.
pub struct ProposalSink;

impl Actor for ProposalSink {
    type Context = Context<Self>;
}

impl Handler<RoundProposal> for ProposalSink {
    type Result = ();

    fn handle(&mut self, msg: RoundProposal, _ctx: &mut Context<Self>) -> Self::Result {
        info!(
            "[{}] proposal for {} with {} transactions",
            "node".blue(),
            msg.round,
            msg.proposal.transactions.len()
        );
    }
}

fn parse_initial_hashes(settings: &Settings) -> Result<[BlockHash; 2]> {
    if settings.initial_hashes.len() != 2 {
        return Err(Error::Config(format!(
            "expected exactly 2 initial hashes, got {}",
            settings.initial_hashes.len()
        )));
    }
    Ok([
        BlockHash::from_hex(&settings.initial_hashes[0])?,
        BlockHash::from_hex(&settings.initial_hashes[1])?,
    ])
}

fn load_or_generate_keypair(keypair_hex: &Option<String>) -> Result<Keypair> {
    match keypair_hex {
        Some(keypair_hex) => {
            let bytes = hex::decode(keypair_hex)
                .map_err(|_| Error::Config("malformed keypair hex".to_owned()))?;
            Ok(Keypair::from_bytes(&bytes)?)
        }
        None => {
            let mut seed = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut seed);
            let secret = SecretKey::from_bytes(&seed)?;
            let public = PublicKey::from(&secret);
            Ok(Keypair { secret, public })
        }
    }
}

pub fn run(settings: Settings) -> Result<()> {
    let listener_ip: SocketAddr = settings
        .listener_ip
        .to_socket_addrs()
        .map_err(|_| Error::PeerParseError)?
        .next()
        .ok_or(Error::PeerParseError)?;

    if settings.ledger_peers.is_empty() {
        return Err(Error::Config("ledger_peers must not be empty".to_owned()));
    }
    let ledger_peers = settings
        .ledger_peers
        .iter()
        .map(|peer| util::parse_peer(peer))
        .collect::<Result<Vec<_>>>()?;

    let initial_hashes = parse_initial_hashes(&settings)?;
    let keypair = load_or_generate_keypair(&settings.keypair)?;
    let node_key = hex::encode(keypair.public.as_bytes());

    info!("node {} is starting with {} ledger peers", &node_key[..8], ledger_peers.len());

    let max_transactions: usize = settings
        .max_number_of_transactions
        .try_into()
        .map_err(|_| Error::Config("max_number_of_transactions out of range".to_owned()))?;
    let proposal_delay = Duration::from_millis(settings.proposal_delay_ms);

    let execution = async move {
        // Create the `client` actor
        let client = Client::new();
        let client_addr = client.start();

        // The seams shared by the ordering actors
        let tx_cache = Arc::new(MemoryTxCache::new());
        let proposal_factory = Arc::new(UncheckedProposalFactory);

        // Create the ordering `service` actor
        let service = OrderingService::new(
            max_transactions,
            proposal_factory.clone(),
            tx_cache.clone(),
            Box::new(UniqueCreationStrategy::new()),
            // first post-genesis round
            Round::new(1, 0),
        );
        let service_addr = service.start();

        // Create the `connection manager` actor
        let connection = ConnectionManager::new(
            client_addr.clone().recipient(),
            initial_hashes,
            proposal_delay,
        );
        let connection_addr = connection.start();

        // Create the `yac` network actor
        let yac = YacNetwork::new(client_addr.clone().recipient());
        let yac_addr = yac.start();

        // Create the ordering `gate` actor; the synchronizer drives it with
        // sync events and committed blocks
        let sink_addr = ProposalSink.start();
        let gate = OrderingGate::new(
            service_addr.clone(),
            connection_addr,
            tx_cache,
            proposal_factory,
            sink_addr.recipient(),
        );
        let gate_addr = gate.start();

        let listener_execution = async move {
            // the gate lives as long as the listener
            let _gate = gate_addr;
            // Setup the router
            let router = Router::new(service_addr, yac_addr);
            let router_addr = router.start();
            // Setup the server
            let server = Server::new(
                format!("0.0.0.0:{}", listener_ip.port()).parse().unwrap(),
                router_addr,
            );
            // Listen for incoming connections
            server.listen().await.unwrap()
        };

        let arbiter = Arbiter::new();
        arbiter.spawn(listener_execution);
    };

    let arbiter = Arbiter::new();
    arbiter.spawn(execution);

    Ok(())
}

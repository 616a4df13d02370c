//! The vote transport actor.
//!
//! Outbound vote bundles are fire-and-forget: transient transport failures
//! are logged and the consensus layer re-broadcasts as it sees fit. Inbound
//! bundles are validated for shape only and handed to the subscribed
//! notifications handler. The handler is held weakly: the consensus state
//! machine owns the transport, so the back-reference must not keep it alive.

use crate::client::ClientRequest;
use crate::colored::Colorize;
use crate::ledger::Peer;
use crate::protocol::Request;

use super::vote::{same_round, State, VoteMessage};

use tracing::{debug, error, info, warn};

use actix::{Actor, Context, Handler, WeakRecipient};
use actix_derive::{Message, MessageResponse};

pub struct YacNetwork {
    /// The client used to make external requests.
    sender: actix::Recipient<ClientRequest>,
    /// Consensus handler for inbound vote bundles, held weakly.
    handler: Option<WeakRecipient<StateNotification>>,
    stop_requested: bool,
}

impl YacNetwork {
    pub fn new(sender: actix::Recipient<ClientRequest>) -> Self {
        YacNetwork { sender, handler: None, stop_requested: false }
    }
}

impl Actor for YacNetwork {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!(": started");
    }
}

/// Inbound vote bundle delivered to the subscribed handler.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct StateNotification {
    pub votes: Vec<VoteMessage>,
}

/// Registers the notifications handler. A later subscribe replaces the
/// prior one.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Subscribe {
    pub handler: WeakRecipient<StateNotification>,
}

impl Handler<Subscribe> for YacNetwork {
    type Result = ();

    fn handle(&mut self, msg: Subscribe, _ctx: &mut Context<Self>) -> Self::Result {
        self.handler = Some(msg.handler);
    }
}

/// Requests the transport to stop sending. Idempotent.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct Stop;

impl Handler<Stop> for YacNetwork {
    type Result = ();

    fn handle(&mut self, _msg: Stop, _ctx: &mut Context<Self>) -> Self::Result {
        self.stop_requested = true;
    }
}

/// Sends a vote bundle to `peer`, fire-and-forget.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct SendState {
    pub peer: Peer,
    pub votes: Vec<VoteMessage>,
}

impl Handler<SendState> for YacNetwork {
    type Result = ();

    fn handle(&mut self, msg: SendState, _ctx: &mut Context<Self>) -> Self::Result {
        if self.stop_requested {
            warn!(
                "[{}] not sending state to {} because stop was requested",
                "yac".magenta(),
                msg.peer
            );
            return;
        }
        info!("[{}] send votes bundle[size={}] to {}", "yac".magenta(), msg.votes.len(), msg.peer);
        let request = Request::State(State { votes: msg.votes });
        let _ = self.sender.do_send(ClientRequest::Notify { peer: msg.peer, request });
    }
}

/// Outcome of an inbound bundle: `Cancelled` tells the sender the payload is
/// malformed and must not be retried as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, MessageResponse)]
pub enum StateStatus {
    Accepted,
    Cancelled,
}

/// Inbound vote bundle from the wire server.
#[derive(Debug, Clone, Message)]
#[rtype(result = "StateStatus")]
pub struct ReceiveState {
    pub votes: Vec<VoteMessage>,
}

impl Handler<ReceiveState> for YacNetwork {
    type Result = StateStatus;

    fn handle(&mut self, msg: ReceiveState, _ctx: &mut Context<Self>) -> Self::Result {
        if msg.votes.is_empty() {
            info!("[{}] received an empty votes collection", "yac".magenta());
            return StateStatus::Cancelled;
        }
        if !same_round(&msg.votes) {
            info!("[{}] votes are statelessly invalid: rounds differ", "yac".magenta());
            return StateStatus::Cancelled;
        }

        info!(
            "[{}] received votes[size={}] for {}",
            "yac".magenta(),
            msg.votes.len(),
            msg.votes[0].round
        );

        match self.handler.as_ref().and_then(|handler| handler.upgrade()) {
            Some(subscriber) => {
                let _ = subscriber.do_send(StateNotification { votes: msg.votes });
            }
            None => error!("[{}] unable to reach the subscribed handler", "yac".magenta()),
        }
        StateStatus::Accepted
    }
}

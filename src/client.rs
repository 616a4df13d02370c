use crate::channel::Connection;
use crate::ledger::Peer;
use crate::protocol::{Request, Response};
use crate::{Error, Result};

use tracing::{debug, error};

use actix::{Actor, Context, Handler, ResponseFuture};
use actix_derive::{Message, MessageResponse};
use futures::FutureExt;
use std::time::Duration;

/// Client is responsible for making requests to one or many nodes in the
/// network. Its main handler is [ClientRequest], which accepts
/// [ClientRequest::Oneshot], [ClientRequest::Fanout] or
/// [ClientRequest::Notify].
pub struct Client;

impl Client {
    pub fn new() -> Client {
        Client
    }
}

impl Default for Client {
    fn default() -> Self {
        Client::new()
    }
}

impl Actor for Client {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("started client");
    }
}

/// A request to one or many nodes, passed through the [Client].
#[derive(Debug, Clone, Message)]
#[rtype(result = "ClientResponse")]
pub enum ClientRequest {
    /// Single request to a node, waiting for the response up to `timeout`.
    Oneshot { peer: Peer, request: Request, timeout: Duration },
    /// Single request to many nodes, waiting for all responses.
    Fanout { peers: Vec<Peer>, request: Request },
    /// Fire-and-forget request; the response, if any, is discarded.
    Notify { peer: Peer, request: Request },
}

#[derive(Debug, Clone, MessageResponse)]
pub enum ClientResponse {
    Oneshot(Option<Response>),
    Fanout(Vec<Response>),
    Notified,
}

impl Handler<ClientRequest> for Client {
    type Result = ResponseFuture<ClientResponse>;

    fn handle(&mut self, msg: ClientRequest, _ctx: &mut Context<Self>) -> Self::Result {
        match msg {
            ClientRequest::Oneshot { peer, request, timeout } => Box::pin(async move {
                let response = oneshot_with_timeout(&peer, request, timeout).await;
                ClientResponse::Oneshot(err_to_none(response))
            }),
            ClientRequest::Fanout { peers, request } => {
                Box::pin(async move { ClientResponse::Fanout(fanout(peers, request).await) })
            }
            ClientRequest::Notify { peer, request } => Box::pin(async move {
                tokio::spawn(async move {
                    let _ = err_to_none(oneshot(&peer, request).await);
                });
                ClientResponse::Notified
            }),
        }
    }
}

/// Sends a request to a peer and waits for its response.
pub async fn oneshot(peer: &Peer, request: Request) -> Result<Option<Response>> {
    let mut connection = Connection::connect(&peer.address).await?;
    connection.send(&request).await?;
    let response = connection.recv().await?;
    Ok(response)
}

/// [oneshot] bounded by `timeout`; elapsing counts as a transient failure.
pub async fn oneshot_with_timeout(
    peer: &Peer,
    request: Request,
    timeout: Duration,
) -> Result<Option<Response>> {
    match tokio::time::timeout(timeout, oneshot(peer, request)).await {
        Ok(result) => result,
        Err(_elapsed) => Err(Error::Timeout),
    }
}

/// Sends a request to many peers and collects the responses that arrived.
async fn fanout(peers: Vec<Peer>, request: Request) -> Vec<Response> {
    let mut client_futs = vec![];
    for peer in peers.iter().cloned() {
        let request = request.clone();
        let client_fut = tokio::spawn(async move { err_to_none(oneshot(&peer, request).await) });
        client_futs.push(client_fut)
    }
    // join the futures and collect the responses
    futures::future::join_all(client_futs)
        .map(|results| {
            let mut responses = vec![];
            for r in results.iter() {
                match r {
                    Ok(Some(response)) => responses.push(response.clone()),
                    Ok(None) => (),
                    Err(_) => error!("error: joining client futures"),
                }
            }
            responses
        })
        .await
}

/// Collapses transport failures into `None`; the error is logged here and
/// the caller substitutes an empty result.
#[inline]
fn err_to_none<T>(x: Result<Option<T>>) -> Option<T> {
    match x {
        Ok(result) => result,
        Err(err) => {
            debug!("{:?}", err);
            None
        }
    }
}

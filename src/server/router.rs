use crate::ordering::OrderingService;
use crate::protocol::{Request, Response};
use crate::yac::{ReceiveState, StateStatus, YacNetwork};

use tracing::{debug, error, info};

use actix::{Actor, Addr, Context, Handler, ResponseFuture};

pub struct Router {
    service: Addr<OrderingService>,
    yac: Addr<YacNetwork>,
}

impl Router {
    pub fn new(service: Addr<OrderingService>, yac: Addr<YacNetwork>) -> Self {
        Router { service, yac }
    }
}

impl Actor for Router {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("router> started");
    }
}

impl Handler<Request> for Router {
    type Result = ResponseFuture<Response>;

    fn handle(&mut self, msg: Request, _ctx: &mut Context<Self>) -> Self::Result {
        let service = self.service.clone();
        let yac = self.yac.clone();
        Box::pin(async move {
            match msg {
                Request::GetProposal(get_proposal) => {
                    info!("routing GetProposal -> OrderingService");
                    match service.send(get_proposal).await {
                        Ok(reply) => Response::Proposal(reply),
                        Err(err) => {
                            error!("ordering service unreachable: {}", err);
                            Response::Unknown
                        }
                    }
                }
                Request::PushBatches(push_batches) => {
                    info!("routing PushBatches -> OrderingService");
                    match service.send(push_batches).await {
                        Ok(()) => Response::BatchesAck,
                        Err(err) => {
                            error!("ordering service unreachable: {}", err);
                            Response::Unknown
                        }
                    }
                }
                Request::State(state) => {
                    info!("routing State -> YacNetwork");
                    match yac.send(ReceiveState { votes: state.votes }).await {
                        Ok(StateStatus::Accepted) => Response::StateAck,
                        Ok(StateStatus::Cancelled) => Response::Cancelled,
                        Err(err) => {
                            error!("yac network unreachable: {}", err);
                            Response::Unknown
                        }
                    }
                }
            }
        })
    }
}

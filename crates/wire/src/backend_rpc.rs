//! RPC transport backend (spec §4.3 "RPC backend"), gated behind the
//! `rpc-transport` feature. Built on tonic/prost, mirroring the gRPC stack
//! `reifydb-reifydb` uses for its own service layer.
//!
//! The service surface is deliberately a single opaque-bytes procedure
//! (`proto/hxhim.proto`): the `rmp-serde`-encoded [`Message`] is the only
//! thing that crosses the wire, so the generated client/server code never
//! needs to know about the message taxonomy.

use crate::message::{self, Message};
use crate::transport::{Shutdown, Transport};
use hxhim_core::{HxhimError, HxhimResult, Rank};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tonic::transport::Channel;
use tonic::{Request, Response, Status};

pub mod proto {
    tonic::include_proto!("hxhim");
}

use proto::range_server_client::RangeServerClient;
use proto::range_server_server::{RangeServer, RangeServerServer};
use proto::Envelope;

/// A request the generated gRPC service handed us, paired with where to send
/// the reply once a range-server worker has produced one.
struct Inbound {
    request: Message,
    reply: oneshot::Sender<Message>,
}

/// The tonic service implementation. It only decodes/encodes frames and
/// forwards them to the listener thread via `inbound_tx`; it has no knowledge
/// of range-server internals.
struct Service {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
}

#[tonic::async_trait]
impl RangeServer for Service {
    async fn client_to_range_server(&self, request: Request<Envelope>) -> Result<Response<Envelope>, Status> {
        let payload = request.into_inner().payload;
        let message = message::from_bytes(&payload).map_err(|e| Status::invalid_argument(e.to_string()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbound_tx
            .send(Inbound { request: message, reply: reply_tx })
            .map_err(|_| Status::unavailable("range server listener has shut down"))?;
        let response = reply_rx.await.map_err(|_| Status::internal("handler dropped the reply channel"))?;
        Ok(Response::new(Envelope { payload: message::to_bytes(&response) }))
    }
}

/// An RPC-backed [`Transport`]. Holds a dedicated tokio runtime (the rest of
/// hxhim is synchronous) to drive outbound calls and the inbound server.
pub struct RpcTransport {
    runtime: Runtime,
    endpoints: HashMap<Rank, String>,
    channels: Mutex<HashMap<Rank, Channel>>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    // Keyed by the request's source rank. hxhim clients never have more than
    // one request outstanding at a time (the pipeline's synchronous flush
    // calls and the single PUT drainer both serialize on one in-flight call
    // per peer), so one pending reply slot per source rank is enough.
    pending: Mutex<HashMap<Rank, oneshot::Sender<Message>>>,
}

impl RpcTransport {
    /// Build a transport that knows how to reach every rank in `endpoints`
    /// (e.g. `{1: "http://10.0.0.2:50051"}`) and, if `listen_addr` is given,
    /// serves the `RangeServer` service on it in the background.
    pub fn new(endpoints: HashMap<Rank, String>, listen_addr: Option<std::net::SocketAddr>) -> HxhimResult<Arc<Self>> {
        let runtime = Runtime::new().map_err(|e| HxhimError::Transport(format!("failed to start tokio runtime: {e}")))?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let transport = Arc::new(RpcTransport {
            runtime,
            endpoints,
            channels: Mutex::new(HashMap::new()),
            inbound_rx: Mutex::new(inbound_rx),
            pending: Mutex::new(HashMap::new()),
        });

        if let Some(addr) = listen_addr {
            let service = Service { inbound_tx };
            transport.runtime.spawn(async move {
                if let Err(e) = tonic::transport::Server::builder()
                    .add_service(RangeServerServer::new(service))
                    .serve(addr)
                    .await
                {
                    tracing::error!("rpc transport server exited: {e}");
                }
            });
        }

        Ok(transport)
    }

    async fn channel_for(&self, rank: Rank) -> HxhimResult<Channel> {
        if let Some(channel) = self.channels.lock().get(&rank).cloned() {
            return Ok(channel);
        }
        let uri = self
            .endpoints
            .get(&rank)
            .ok_or_else(|| HxhimError::Transport(format!("no RPC endpoint configured for rank {rank}")))?
            .clone();
        let channel = Channel::from_shared(uri)
            .map_err(|e| HxhimError::Transport(format!("invalid endpoint URI for rank {rank}: {e}")))?
            .connect()
            .await
            .map_err(|e| HxhimError::Transport(format!("failed to connect to rank {rank}: {e}")))?;
        self.channels.lock().insert(rank, channel.clone());
        Ok(channel)
    }
}

impl Transport for RpcTransport {
    fn send_request(&self, request: Message) -> HxhimResult<Message> {
        let dst = request.header().dst;
        self.runtime.block_on(async {
            let channel = self.channel_for(dst).await?;
            let mut client = RangeServerClient::new(channel);
            let envelope = Envelope { payload: message::to_bytes(&request) };
            let response = client
                .client_to_range_server(Request::new(envelope))
                .await
                .map_err(|e| HxhimError::Transport(format!("rpc call to rank {dst} failed: {e}")))?;
            message::from_bytes(&response.into_inner().payload)
                .map_err(|e| HxhimError::Transport(format!("malformed response from rank {dst}: {e}")))
        })
    }

    fn send_response(&self, response: Message) -> HxhimResult<()> {
        let dst = response.header().dst;
        let reply = self
            .pending
            .lock()
            .remove(&dst)
            .ok_or_else(|| HxhimError::Transport(format!("no pending rpc request recorded for rank {dst}")))?;
        reply
            .send(response)
            .map_err(|_| HxhimError::Transport(format!("rank {dst}'s rpc caller already gave up")))
    }

    fn recv_request(&self, shutdown: &Shutdown) -> HxhimResult<Message> {
        crate::transport::poll_until_ready(shutdown, || {
            self.runtime.block_on(async {
                match tokio::time::timeout(std::time::Duration::from_millis(50), self.inbound_rx.lock().recv()).await {
                    Ok(Some(inbound)) => {
                        let src = inbound.request.header().src;
                        self.pending.lock().insert(src, inbound.reply);
                        Some(inbound.request)
                    }
                    _ => None,
                }
            })
        })
    }
}

use std::net::SocketAddr;

use tokio::sync::oneshot;

use super::{ClientStats, ConnectionStats};

/// Messages the connection manager (and anything else on the request path)
/// sends to the stats actor. The actor owns all mutable accounting state;
/// everything else only ever sees a consistent snapshot via the `Query*`
/// variants.
#[derive(Debug)]
pub enum StatEvent {
    ClientConnected(SocketAddr),
    ClientDisconnected(SocketAddr),
    RequestProcessed {
        addr: SocketAddr,
        success: bool,
        duration_ms: u64,
    },
    QueryStats {
        addr: SocketAddr,
        response_tx: oneshot::Sender<ClientStats>,
    },
    QueryConnectionStats {
        response_tx: oneshot::Sender<ConnectionStats>,
    },
}

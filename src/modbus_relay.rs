//! Ties the TCP-facing MBAP server to the RTU-facing transaction dispatcher.
//!
//! One [`Dispatcher`] owns the serial bus; every accepted TCP client decodes
//! its own MBAP requests with its own [`SocketFramer`] and forwards them
//! through that shared, mutex-serialized dispatcher, so at most one
//! transaction is ever in flight on the RTU bus regardless of how many TCP
//! clients are connected.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::{broadcast, Mutex},
    time::{sleep, timeout, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    config::RelayConfig,
    connection::{ConnectionManager, StatsManager},
    errors::{ClientErrorKind, IoOperation, TransportError},
    modbus::{
        encoder,
        framer::socket::SocketFramer,
        framer::{FrameEvent, Framer},
        pdu::Direction,
        transaction::{Dispatcher, ExecuteOutcome},
    },
    rtu_transport::RtuTransport,
    RelayError,
};

pub struct ModbusRelay {
    dispatcher: Arc<Mutex<Dispatcher<RtuTransport>>>,
    config: RelayConfig,
    connection_manager: Arc<ConnectionManager>,
    shutdown: broadcast::Sender<()>,
}

impl ModbusRelay {
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;

        let transport = RtuTransport::new(&config.rtu)
            .map_err(|e| RelayError::Transport(TransportError::from(e)))?;
        let dispatcher = Dispatcher::new_rtu(
            transport,
            config.rtu.baud_rate,
            config.dispatch.clone(),
            Arc::new(|_slave_id| true),
        );

        let (mut stats_manager, stats_tx) = StatsManager::new(config.stats.clone());
        let connection_manager = Arc::new(ConnectionManager::new(
            config.connection.clone(),
            stats_tx,
        ));

        let shutdown = broadcast::channel(1).0;
        let stats_shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            stats_manager.run(stats_shutdown_rx).await;
        });

        Ok(Self {
            dispatcher: Arc::new(Mutex::new(dispatcher)),
            config,
            connection_manager,
            shutdown,
        })
    }

    fn spawn_task<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(future);
        debug!("Spawned {} task: {:?}", name, task.id());
    }

    pub async fn run(self: Arc<Self>) -> Result<(), RelayError> {
        let addr = format!("{}:{}", self.config.tcp.bind_addr, self.config.tcp.bind_port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            RelayError::Transport(TransportError::Io {
                operation: IoOperation::Configure,
                details: format!("Failed to bind to address {}", addr),
                source: e,
            })
        })?;

        info!("Listening on {}", addr);

        if self.config.http.enabled {
            let manager = Arc::clone(&self.connection_manager);
            let shutdown_rx = self.shutdown.subscribe();
            let http_addr = self.config.http.bind_addr.clone();
            let http_port = self.config.http.bind_port;

            self.spawn_task("http", async move {
                if let Err(e) =
                    crate::http_api::start_http_server(http_addr, http_port, manager, shutdown_rx)
                        .await
                {
                    error!("HTTP server error: {}", e);
                }
            });
        }

        // Periodically log statistics
        let manager = Arc::clone(&self.connection_manager);
        let mut shutdown_rx = self.shutdown.subscribe();

        self.spawn_task("stats", async move {
            loop {
                tokio::select! {
                    _ = sleep(Duration::from_secs(300)) => {
                      match manager.get_stats().await {
                        Ok(stats) => info!("Connection stats: {:?}", stats),
                        Err(e) => error!("Failed to get connection stats: {}", e),
                      }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Stats task received shutdown signal");
                        break;
                    }
                }
            }
        });

        loop {
            let accept_result = listener.accept().await;
            match accept_result {
                Ok((socket, peer)) => {
                    info!("New connection from {}", peer);

                    match self.connection_manager.accept_connection(peer).await {
                        Ok(guard) => {
                            let dispatcher = Arc::clone(&self.dispatcher);
                            let manager = Arc::clone(&self.connection_manager);

                            self.spawn_task("client", async move {
                                if let Err(e) =
                                    handle_client(socket, dispatcher, &manager, peer).await
                                {
                                    error!("Client error: {}", e);
                                }
                                drop(guard);
                            });
                        }
                        Err(e) => {
                            error!("Connection rejected: {}", e);
                            sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Graceful shutdown
    pub async fn shutdown(&self) -> Result<(), RelayError> {
        info!("Initiating graceful shutdown");
        self.shutdown.send(()).map_err(|e| {
            RelayError::Connection(crate::errors::ConnectionError::InvalidState(format!(
                "Failed to send shutdown signal: {}",
                e
            )))
        })?;

        // Allow time for active connections to close
        sleep(Duration::from_secs(5)).await;

        Ok(())
    }
}

/// Serves one TCP client: decode MBAP requests off the socket, forward each
/// through the shared RTU dispatcher, and relay the reply back as MBAP.
async fn handle_client(
    mut socket: TcpStream,
    dispatcher: Arc<Mutex<Dispatcher<RtuTransport>>>,
    manager: &ConnectionManager,
    peer_addr: SocketAddr,
) -> Result<(), RelayError> {
    socket.set_nodelay(true).map_err(|e| {
        RelayError::Transport(TransportError::Io {
            operation: IoOperation::Configure,
            details: "Failed to set TCP_NODELAY".to_string(),
            source: e,
        })
    })?;

    info!("New client connected from {}", peer_addr);

    let mut framer = SocketFramer::accept_any(Direction::Request, Some(peer_addr));
    let mut buf = vec![0u8; 512];

    loop {
        let n = match timeout(Duration::from_secs(60), socket.read(&mut buf)).await {
            Ok(Ok(0)) => {
                info!("Client {} disconnected", peer_addr);
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                return Err(RelayError::client(
                    ClientErrorKind::ConnectionLost,
                    peer_addr,
                    format!("Connection lost: {}", e),
                ));
            }
            Err(_) => {
                return Err(RelayError::client(
                    ClientErrorKind::Timeout,
                    peer_addr,
                    "Read operation timed out".to_string(),
                ));
            }
        };

        debug!(
            "Received TCP frame from {}: {:02X?}",
            peer_addr,
            &buf[..n]
        );

        let mut frames = Vec::new();
        framer.process_incoming(&buf[..n], &mut |event| frames.push(event));

        for event in frames {
            let request = match event {
                FrameEvent::Frame(pdu) => pdu,
                FrameEvent::DecodeFailed {
                    function_code,
                    source,
                    ..
                } => {
                    warn!(
                        "Failed to decode request from {}: function {:#04x}: {}",
                        peer_addr, function_code, source
                    );
                    manager.record_request(peer_addr, false, Duration::ZERO).await;
                    continue;
                }
            };

            let request_id = crate::utils::generate_request_id();
            let transaction_id = request.transaction_id;
            let protocol_id = request.protocol_id;
            let started = Instant::now();

            let outcome = {
                let mut dispatcher = dispatcher.lock().await;
                dispatcher
                    .execute(request.slave_id, request.function_code, request.body)
                    .await
            };
            let elapsed = started.elapsed();

            match outcome {
                Ok(ExecuteOutcome::Response(mut reply)) => {
                    reply.transaction_id = transaction_id;
                    reply.protocol_id = protocol_id;
                    let response = encoder::encode_mbap(&reply);

                    debug!(
                        "[req {}] Sending TCP response to {}: {:02X?}",
                        request_id, peer_addr, &response
                    );

                    if let Err(e) = socket.write_all(&response).await {
                        manager.record_request(peer_addr, false, elapsed).await;
                        return Err(RelayError::client(
                            ClientErrorKind::WriteError,
                            peer_addr,
                            format!("Failed to send response: {}", e),
                        ));
                    }
                    manager.record_request(peer_addr, true, elapsed).await;
                }
                Ok(ExecuteOutcome::Broadcast) => {
                    manager.record_request(peer_addr, true, elapsed).await;
                }
                Err(e) => {
                    manager.record_request(peer_addr, false, elapsed).await;
                    warn!("RTU transaction failed for {}: {}", peer_addr, e);
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_modbus_relay_shutdown() {
        let config = RelayConfig::default();
        let relay = ModbusRelay::new(config).unwrap();

        assert!(relay.shutdown().await.is_ok());
    }
}

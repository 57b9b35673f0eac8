use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};

use crate::{config::ConnectionConfig, ConnectionError, RelayError};

use super::{ConnectionGuard, ConnectionStats, StatEvent};

/// Connection admission control: per-IP and global concurrency limits.
///
/// Usage accounting (active connections, request counts, response times)
/// is owned by the stats actor this manager reports to over `stats_tx`;
/// the manager itself holds no counters beyond the semaphores needed to
/// admit or reject a connection attempt.
#[derive(Debug)]
pub struct Manager {
    per_ip_semaphores: Mutex<HashMap<SocketAddr, Arc<Semaphore>>>,
    global_semaphore: Arc<Semaphore>,
    config: ConnectionConfig,
    stats_tx: mpsc::Sender<StatEvent>,
}

impl Manager {
    pub fn new(config: ConnectionConfig, stats_tx: mpsc::Sender<StatEvent>) -> Self {
        Self {
            per_ip_semaphores: Mutex::new(HashMap::new()),
            global_semaphore: Arc::new(Semaphore::new(config.max_connections)),
            config,
            stats_tx,
        }
    }

    /// Attempt to establish a new connection, admitting it against the
    /// per-IP and global limits before notifying the stats actor.
    pub async fn accept_connection(
        self: &Arc<Self>,
        addr: SocketAddr,
    ) -> Result<ConnectionGuard, RelayError> {
        let per_ip_permit = if let Some(per_ip_limit) = self.config.per_ip_limits {
            let mut semaphores = self.per_ip_semaphores.lock().await;

            let semaphore = semaphores
                .entry(addr)
                .or_insert_with(|| Arc::new(Semaphore::new(per_ip_limit)));

            Some(semaphore.clone().try_acquire_owned().map_err(|_| {
                RelayError::Connection(ConnectionError::limit_exceeded(format!(
                    "Per-IP limit ({}) reached for {}",
                    per_ip_limit, addr
                )))
            })?)
        } else {
            None
        };

        let global_permit = self
            .global_semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| {
                RelayError::Connection(ConnectionError::limit_exceeded(
                    "Global connection limit reached",
                ))
            })?;

        let _ = self.stats_tx.send(StatEvent::ClientConnected(addr)).await;

        Ok(ConnectionGuard {
            manager: Arc::clone(self),
            addr,
            _global_permit: global_permit,
            _per_ip_permit: per_ip_permit,
        })
    }

    /// Called by [`super::ConnectionGuard`] on drop; not part of the public API.
    pub(super) async fn notify_disconnected(&self, addr: SocketAddr) {
        let _ = self
            .stats_tx
            .send(StatEvent::ClientDisconnected(addr))
            .await;
    }

    /// Records the outcome of a served request against the stats actor.
    pub async fn record_request(&self, addr: SocketAddr, success: bool, duration: Duration) {
        let _ = self
            .stats_tx
            .send(StatEvent::RequestProcessed {
                addr,
                success,
                duration_ms: duration.as_millis() as u64,
            })
            .await;
    }

    pub async fn get_connection_count(&self, addr: &SocketAddr) -> u32 {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .stats_tx
            .send(StatEvent::QueryStats {
                addr: *addr,
                response_tx,
            })
            .await
            .is_err()
        {
            return 0;
        }
        response_rx
            .await
            .map(|stats| stats.active_connections as u32)
            .unwrap_or(0)
    }

    /// Returns aggregate connection statistics, queried from the stats actor.
    pub async fn get_stats(&self) -> Result<ConnectionStats, RelayError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.stats_tx
            .send(StatEvent::QueryConnectionStats { response_tx })
            .await
            .map_err(|_| {
                RelayError::Connection(ConnectionError::invalid_state(
                    "stats actor is not running".to_string(),
                ))
            })?;
        response_rx.await.map_err(|_| {
            RelayError::Connection(ConnectionError::invalid_state(
                "stats actor dropped the response channel".to_string(),
            ))
        })
    }

    /// Idle/error-timeout accounting lives on the stats actor's own cleanup
    /// tick; this is retained for callers that want to poll explicitly.
    pub async fn cleanup_idle_connections(&self) -> Result<(), RelayError> {
        Ok(())
    }

    pub async fn close_all_connections(&self) -> Result<(), RelayError> {
        tracing::info!("connection shutdown requested; guards release their own permits on drop");
        Ok(())
    }
}

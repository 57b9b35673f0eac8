use std::{net::SocketAddr, sync::Arc};

use super::ConnectionManager;

/// RAII guard for an admitted connection: releases its semaphore permits
/// and notifies the stats actor of the disconnect when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    pub manager: Arc<ConnectionManager>,
    pub addr: SocketAddr,
    pub _global_permit: tokio::sync::OwnedSemaphorePermit,
    pub _per_ip_permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let manager = Arc::clone(&self.manager);
        let addr = self.addr;

        tokio::spawn(async move {
            manager.notify_disconnected(addr).await;
        });
    }
}

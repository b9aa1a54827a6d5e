//! Server module
//!
//! Handles TCP connections. This module is responsible for accepting
//! connections and giving each one its own session on the shared services.

mod connection;

use crate::dispatch::{Dispatcher, Services};
use tokio::net::TcpListener;
use tracing::{error, info};

pub use connection::Connection;

/// Run the server
///
/// Binds `addr` and serves it until accepting fails.
pub async fn run(addr: &str, services: Services) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("FerrumSlot RESP server listening on {}", listener.local_addr()?);
    serve(listener, services).await
}

/// Serve connections from an already bound listener
pub async fn serve(listener: TcpListener, services: Services) -> anyhow::Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        let session = Dispatcher::new(services.clone());
        info!(connection = session.connection_id(), "New RESP connection from {}", addr);

        tokio::spawn(async move {
            let id = session.connection_id();
            let mut connection = Connection::new(socket);

            if let Err(e) = connection.handle(session).await {
                error!(connection = id, "Connection error from {}: {}", addr, e);
            }

            info!(connection = id, "Connection closed: {}", addr);
        });
    }
}

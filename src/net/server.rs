//! Connection dispatcher: accept, resolve identity, bootstrap first-seen
//! clients, apply the block list, then hand the connection to a session.

use crate::Registry;
use crate::error::{AppResult, InfraError};
use crate::net::connection::handle_connection;
use crate::proto::encode_status;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

/// Bind and run the server. Only a bind failure is fatal.
pub async fn serve(addr: SocketAddr, registry: Arc<Registry>) -> AppResult<()> {
    registry.vault.ensure_root().await?;
    let listener = TcpListener::bind(&addr).await.map_err(InfraError::from)?;
    run(listener, registry).await
}

/// Accept loop over an already-bound listener. Never blocks on a session:
/// each connection gets its own task, including its admission check.
pub async fn run(listener: TcpListener, registry: Arc<Registry>) -> AppResult<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::info!(%peer, "client connected");

                let registry = registry.clone();
                tokio::spawn(async move {
                    if let Err(e) = admit(stream, peer, registry).await {
                        tracing::error!(%peer, error=%e, "connection error");
                    }
                    tracing::info!(%peer, "client disconnected");
                });
            }
            Err(e) => {
                tracing::error!(error=%e, "failed to accept connection");
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        }
    }
}

/// Identity is the peer IP alone; connections from one host share a record
/// and a quota.
async fn admit(mut stream: TcpStream, peer: SocketAddr, registry: Arc<Registry>) -> AppResult<()> {
    let identity = peer.ip().to_string();

    let (record, created) = registry.ledger.ensure_client(&identity).await?;
    if created {
        tracing::info!(identity = %identity, quota = record.quota, "new client registered");
        let message = match registry.vault.create_client_dir(&identity).await {
            Ok(true) => "OK Directory created".to_string(),
            Ok(false) => "ERROR Directory already exists".to_string(),
            Err(e) => format!("ERROR {e}"),
        };
        stream.write_all(message.as_bytes()).await?;
    }

    if record.blocked {
        forbidden(stream, peer).await
    } else {
        handle_connection(stream, peer, registry).await
    }
}

/// Blocked client: rejection frame, no command is ever read.
async fn forbidden(mut stream: TcpStream, peer: SocketAddr) -> AppResult<()> {
    stream.write_all(&encode_status(false)).await?;
    tracing::info!(%peer, "connection rejected: client is blocked");
    Ok(())
}

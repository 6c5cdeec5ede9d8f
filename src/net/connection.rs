//! Per-connection session driver: handshake, one command, teardown.

use crate::Session;
use crate::commands::{CmdCtx, dispatch};
use crate::error::{AppResult, DomainError};
use crate::proto::{encode_status, read_command};
use crate::state::registry::Registry;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, registry: Arc<Registry>) -> AppResult<()> {
    let identity = peer.ip().to_string();
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = write_half;

    let sess = Arc::new(RwLock::new(Session::new(identity.clone())));

    // admission already happened in the dispatcher, so the ack is
    // unconditional
    writer.write_all(&encode_status(true)).await?;

    let cmd = match read_command(&mut reader).await {
        Ok(cmd) => cmd,
        Err(DomainError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            // peer connected and left without a command
            tracing::debug!(identity = %identity, "disconnected before sending a command");
            sess.write().close();
            return Ok(());
        }
        Err(e) => {
            // no command was identified: best-effort reply, no request count
            let _ = writer.write_all(&encode_status(false)).await;
            sess.write().close();
            return Err(e);
        }
    };

    sess.write().begin_serving();
    tracing::info!(
        identity = %identity,
        verb = cmd.verb(),
        file = cmd.filename().unwrap_or("-"),
        "command received"
    );

    let ctx = CmdCtx {
        registry: registry.clone(),
        identity: identity.clone(),
        sess: sess.clone(),
    };
    let outcome = dispatch(&cmd, &ctx, &mut reader, &mut writer).await;

    // an identified command counts exactly once, success or declared error
    if let Err(e) = registry.ledger.bump_requests(&identity).await {
        tracing::warn!(identity = %identity, error = %e, "failed to count request");
    }

    sess.write().close();
    let (elapsed, size) = {
        let s = sess.read();
        (s.session_started.elapsed(), s.transfer_size())
    };
    match &outcome {
        Ok(()) => tracing::info!(identity = %identity, verb = cmd.verb(), ?elapsed, ?size, "command served"),
        Err(e) => tracing::warn!(identity = %identity, verb = cmd.verb(), ?size, error = %e, "command failed"),
    }
    outcome
}

//! Per-command sub-protocols. Each handler converts its own failures into
//! a wire-level reply; the session driver only logs what comes back.

use crate::error::{AppResult, DomainError};
use crate::Registry;
use crate::proto::{
    Command, ERR_CONNECTION_BROKEN, ERR_FILE_NOT_FOUND, Reply, encode_error, encode_listing,
    encode_size_checked, encode_status, read_reply,
};
use crate::services::{Admission, transfer};
use crate::state::session::Session;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

type Reader = BufReader<OwnedReadHalf>;
type Writer = OwnedWriteHalf;

pub struct CmdCtx {
    pub registry: Arc<Registry>,
    pub identity: String,
    pub sess: Arc<RwLock<Session>>,
}

pub async fn dispatch(cmd: &Command, ctx: &CmdCtx, reader: &mut Reader, writer: &mut Writer) -> AppResult<()> {
    match cmd {
        Command::Get { name } => get(ctx, reader, writer, name).await,
        Command::Put { name } => put(ctx, reader, writer, name).await,
        Command::List => list(ctx, writer).await,
        Command::Delete { name } => delete(ctx, writer, name).await,
    }
}

/// GET: size frame, explicit ready signal, body stream, final ack.
/// Anything but an explicit "ready" aborts without sending a byte; the
/// final ack is logged only.
async fn get(ctx: &CmdCtx, reader: &mut Reader, writer: &mut Writer, name: &str) -> AppResult<()> {
    let size = match ctx.registry.vault.stat(&ctx.identity, name).await {
        Ok(size) => size,
        Err(DomainError::FileNotFound(_)) => {
            tracing::info!(identity = %ctx.identity, name, "GET of absent file");
            writer.write_all(&encode_error(ERR_FILE_NOT_FOUND)).await?;
            return Ok(());
        }
        Err(e) => {
            let _ = writer.write_all(&encode_error(ERR_CONNECTION_BROKEN)).await;
            return Err(e);
        }
    };
    ctx.sess.write().set_transfer_size(size);

    let size_frame = match encode_size_checked(size) {
        Ok(frame) => frame,
        Err(e) => {
            let _ = writer.write_all(&encode_error(ERR_CONNECTION_BROKEN)).await;
            return Err(e);
        }
    };
    writer.write_all(&size_frame).await?;

    match read_reply(reader).await {
        Ok(Reply::Status(true)) => {}
        other => {
            tracing::info!(identity = %ctx.identity, name, ?other, "peer not ready, transfer aborted");
            return Ok(());
        }
    }

    let path = ctx.registry.vault.resolve(&ctx.identity, name)?;
    let sent = transfer::send_file(writer, &path, size).await?;
    tracing::info!(identity = %ctx.identity, name, sent, "file sent");

    // final acknowledgment is informational only
    match read_reply(reader).await {
        Ok(Reply::Status(true)) => tracing::debug!(identity = %ctx.identity, name, "peer confirmed receipt"),
        other => tracing::debug!(identity = %ctx.identity, name, ?other, "no receipt confirmation"),
    }
    Ok(())
}

/// PUT: declared-size frame, quota admission, body stream, final status.
/// A quota rejection aborts the transfer outright: the server never reads
/// body bytes from a peer that was told "not ok".
async fn put(ctx: &CmdCtx, reader: &mut Reader, writer: &mut Writer, name: &str) -> AppResult<()> {
    let expected = match read_reply(reader).await {
        Ok(Reply::Size(n)) => n as u64,
        Ok(other) => {
            let _ = writer.write_all(&encode_status(false)).await;
            return Err(DomainError::Protocol(format!("expected size frame, got {other:?}")));
        }
        Err(e) => {
            let _ = writer.write_all(&encode_status(false)).await;
            return Err(e);
        }
    };
    ctx.sess.write().set_transfer_size(expected);

    match ctx.registry.ledger.try_reserve(&ctx.identity, expected).await? {
        Admission::Admitted => {}
        Admission::Rejected { occupied, quota } => {
            tracing::info!(identity = %ctx.identity, name, expected, occupied, quota, "PUT rejected by quota");
            writer.write_all(&encode_status(false)).await?;
            return Ok(());
        }
    }
    writer.write_all(&encode_status(true)).await?;

    let path = ctx.registry.vault.resolve(&ctx.identity, name)?;
    match transfer::receive_file(reader, &path, expected).await {
        Ok(received) => {
            tracing::info!(identity = %ctx.identity, name, received, "file stored");
            writer.write_all(&encode_status(true)).await?;
            Ok(())
        }
        Err(e) => {
            // a partial file is not a stored file: drop it and give the
            // reserved bytes back
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                tracing::warn!(identity = %ctx.identity, name, error = %rm, "failed to drop partial file");
            }
            if let Err(rel) = ctx.registry.ledger.release(&ctx.identity, expected).await {
                tracing::warn!(identity = %ctx.identity, name, error = %rel, "failed to release reservation");
            }
            let _ = writer.write_all(&encode_status(false)).await;
            Err(e)
        }
    }
}

/// LIST: one listing body, delimited by connection close.
async fn list(ctx: &CmdCtx, writer: &mut Writer) -> AppResult<()> {
    let entries = match ctx.registry.vault.list(&ctx.identity).await {
        Ok(entries) => entries,
        Err(e) => {
            let _ = writer.write_all(&encode_error(ERR_CONNECTION_BROKEN)).await;
            return Err(e);
        }
    };
    tracing::info!(identity = %ctx.identity, files = entries.len(), "listing sent");
    writer.write_all(&encode_listing(&entries)).await?;
    writer.flush().await?;
    Ok(())
}

/// DELETE: remove under the directory lock, then release the freed bytes.
async fn delete(ctx: &CmdCtx, writer: &mut Writer, name: &str) -> AppResult<()> {
    match ctx.registry.vault.remove(&ctx.identity, name).await {
        Ok(size) => {
            writer.write_all(&encode_status(true)).await?;
            ctx.registry.ledger.release(&ctx.identity, size).await?;
            tracing::info!(identity = %ctx.identity, name, size, "file deleted");
            Ok(())
        }
        Err(DomainError::FileNotFound(_)) => {
            tracing::info!(identity = %ctx.identity, name, "DELETE of absent file");
            writer.write_all(&encode_error(ERR_FILE_NOT_FOUND)).await?;
            Ok(())
        }
        Err(e) => {
            let _ = writer.write_all(&encode_error(ERR_CONNECTION_BROKEN)).await;
            Err(e)
        }
    }
}

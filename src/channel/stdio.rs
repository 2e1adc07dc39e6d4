//! Line-delimited JSON channel over a reader/writer pair.
//!
//! The worker process reads inbound messages from stdin and writes outbound
//! messages to stdout, one JSON object per line. Malformed lines are logged
//! and skipped. EOF on the reader means the host has gone away: the
//! recipient is marked destroyed, the session disconnects (stored
//! credentials are kept) and [`serve`] returns once every queued signal has
//! been written.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::{decode_inbound, encode_outbound, ChannelRecipient, OutboundMessage};
use crate::session::{SessionHandle, SessionManager};
use crate::store::KeyValueStore;
use crate::transport::PushTransport;

/// Run a session over `reader`/`writer` until the reader hits EOF.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    store: Box<dyn KeyValueStore>,
    transport: Arc<dyn PushTransport>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (recipient, outbound_rx) = ChannelRecipient::new();
    let manager = SessionManager::new(store, transport, Arc::new(recipient.clone()));
    let handle = manager.handle();

    let session_task = tokio::spawn(manager.run());
    let writer_task = tokio::spawn(write_outbound(outbound_rx, writer));

    let read_result = read_inbound(reader, &handle).await;

    log::info!("[Stdio] Host channel closed, shutting down");
    recipient.mark_destroyed();
    handle.shutdown();
    session_task.await.context("Session task panicked")?;

    // The writer drains until every recipient clone is gone.
    drop(recipient);
    writer_task.await.context("Writer task panicked")??;

    read_result
}

async fn read_inbound<R>(reader: R, handle: &SessionHandle) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read from host")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match decode_inbound(line) {
            Ok(message) => {
                log::debug!("[Stdio] <- {}", message.name());
                if !handle.dispatch(message) {
                    log::warn!("[Stdio] Session worker has exited");
                    break;
                }
            }
            Err(e) => log::warn!("[Stdio] Skipping line: {e:#}"),
        }
    }

    Ok(())
}

async fn write_outbound<W>(mut rx: mpsc::UnboundedReceiver<OutboundMessage>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        log::debug!("[Stdio] -> {}", message.name());
        let mut line = encode_outbound(&message)?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to write to host")?;
        writer.flush().await.context("Failed to flush host channel")?;
    }
    Ok(())
}

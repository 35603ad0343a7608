//! Connection Pumps
//!
//! Two tasks per connection. The inbound pump is the only reader of the
//! transport and the outbound pump is its only writer; the two are joined
//! only by the connection's delivery queue. The pumps are generic over the
//! socket halves so they run the same against an axum `WebSocket` or an
//! in-memory channel.

use std::fmt::Display;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::protocol::Envelope;
use crate::relay::queue::DeliveryReceiver;
use crate::relay::CoordinatorHandle;

use super::Connection;

/// Why an inbound pump stopped reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundExit {
    /// The peer sent a close frame
    Closed,
    /// The stream ended without a close frame
    Ended,
    /// A read failed
    ReadError(String),
    /// The Coordinator is gone
    CoordinatorStopped,
}

/// Register `connection` and pump it until the transport goes away.
///
/// The outbound pump runs on its own task; the inbound pump runs on the
/// caller's task. Returns once both have finished. A connection whose
/// identifier is already taken is closed without reading from it.
pub async fn serve_connection<R, W, E>(
    connection: Connection,
    queue: DeliveryReceiver,
    reader: R,
    writer: W,
    coordinator: CoordinatorHandle,
    strict_decoding: bool,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display + Send,
{
    let conn_id = connection.id().to_string();

    match coordinator.admit(connection).await {
        Ok(true) => {}
        Ok(false) => {
            // The rejected connection is gone, so its queue is closed and this only says goodbye
            warn!(conn_id = %conn_id, "Identifier already in use, closing connection");
            run_outbound(conn_id, writer, queue).await;
            return;
        }
        Err(e) => {
            warn!(conn_id = %conn_id, "Failed to register connection: {:#}", e);
            return;
        }
    }

    let outbound = tokio::spawn(run_outbound(conn_id.clone(), writer, queue));
    let exit = run_inbound(conn_id.clone(), reader, &coordinator, strict_decoding).await;

    if let Err(e) = outbound.await {
        warn!(conn_id = %conn_id, "Outbound pump task failed: {}", e);
    }
    info!(conn_id = %conn_id, ?exit, "Connection finished");
}

/// Forward every envelope read from `reader` to the Coordinator, stamped with
/// this connection's identifier as sender.
///
/// On exit, whatever the reason, requests unregistration exactly once. The
/// reader is dropped on return; the writer side closes once the Coordinator
/// has closed the delivery queue.
pub async fn run_inbound<R, E>(
    conn_id: String,
    mut reader: R,
    coordinator: &CoordinatorHandle,
    strict_decoding: bool,
) -> InboundExit
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let exit = loop {
        let frame = match reader.next().await {
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(bytes))) => bytes,
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) => break InboundExit::Closed,
            Some(Err(e)) => break InboundExit::ReadError(e.to_string()),
            None => break InboundExit::Ended,
        };

        let mut envelope = match Envelope::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                coordinator.metrics().decode_failed();
                if strict_decoding {
                    warn!(conn_id = %conn_id, "Discarding undecodable frame: {:#}", e);
                    continue;
                }
                warn!(conn_id = %conn_id, "Relaying undecodable frame as an empty envelope: {:#}", e);
                Envelope::default()
            }
        };

        // Clients cannot speak for anyone else
        envelope.sender.clone_from(&conn_id);

        debug!(
            conn_id = %conn_id,
            recipient = %envelope.recipient,
            content = %envelope.content,
            "Read envelope"
        );

        if coordinator.route(envelope).is_err() {
            break InboundExit::CoordinatorStopped;
        }
    };

    match &exit {
        InboundExit::ReadError(e) => debug!(conn_id = %conn_id, error = %e, "Read failed"),
        other => debug!(conn_id = %conn_id, exit = ?other, "Inbound pump stopped"),
    }

    if let Err(e) = coordinator.unregister(&conn_id) {
        debug!(conn_id = %conn_id, "Unregister skipped: {:#}", e);
    }

    exit
}

/// Write every payload from the delivery queue to `writer` as a text frame.
///
/// When the queue is closed, sends a close frame. A failed write ends the
/// pump without unregistering; the inbound side notices the dead transport.
pub async fn run_outbound<W>(conn_id: String, mut writer: W, mut queue: DeliveryReceiver)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut write_failed = false;
    while let Some(payload) = queue.recv().await {
        match writer.send(Message::Text(payload.to_string())).await {
            Ok(()) => debug!(conn_id = %conn_id, payload = %payload, "Wrote envelope"),
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "Write failed, closing transport");
                write_failed = true;
                break;
            }
        }
    }

    if !write_failed {
        debug!(conn_id = %conn_id, "Delivery queue closed, sending close frame");
        if let Err(e) = writer.send(Message::Close(None)).await {
            debug!(conn_id = %conn_id, error = %e, "Close frame not sent");
        }
    }
    let _ = writer.close().await;
}

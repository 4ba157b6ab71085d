//! WebSocket client transport.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};

use crate::{
    connector::{
        ConnectionHandle, ConnectionId, Connector, Outgoing, TransportEvent, TransportEventKind,
        TransportSink,
    },
    protocol::{CLOSE_ABNORMAL, CLOSE_NORMAL},
};

/// Close code reported when the peer sent a close frame without a status.
const CLOSE_NO_STATUS: u16 = 1005;

/// Connector opening one WebSocket per connection attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn open(&self, id: ConnectionId, url: &str, sink: TransportSink) -> ConnectionHandle {
        let (handle, outgoing) = ConnectionHandle::new(id);
        tokio::spawn(run_connection(id, url.to_owned(), outgoing, sink));
        handle
    }
}

async fn run_connection(
    id: ConnectionId,
    url: String,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    sink: TransportSink,
) {
    let emit = |kind| sink(TransportEvent::new(id, kind));

    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            tracing::warn!(%id, %url, "WebSocket connect failed: {e}");
            emit(TransportEventKind::Error(e.to_string()));
            emit(TransportEventKind::Closed {
                code: CLOSE_ABNORMAL,
                reason: e.to_string(),
            });
            return;
        }
    };

    tracing::debug!(%id, %url, "WebSocket connected");
    emit(TransportEventKind::Opened);

    let (mut ws_tx, mut ws_rx) = ws.split();

    let (code, reason) = loop {
        tokio::select! {
            cmd = outgoing.recv() => match cmd {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        emit(TransportEventKind::Error(e.to_string()));
                        break (CLOSE_ABNORMAL, e.to_string());
                    }
                }
                Some(Outgoing::Close(code)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: String::new().into(),
                    };
                    if let Err(e) = ws_tx.send(Message::Close(Some(frame))).await {
                        tracing::debug!(%id, "Close frame not sent: {e}");
                    }
                    break (code, "closed by client".to_owned());
                }
                None => {
                    let _ = ws_tx.close().await;
                    break (CLOSE_NORMAL, "handle dropped".to_owned());
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEventKind::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => emit(TransportEventKind::Frame(text)),
                    Err(_) => tracing::debug!(%id, "Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(
                        || (CLOSE_NO_STATUS, String::new()),
                        |f| (u16::from(f.code), f.reason.as_str().to_owned()),
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(%id, "WebSocket error: {e}");
                    emit(TransportEventKind::Error(e.to_string()));
                    break (CLOSE_ABNORMAL, e.to_string());
                }
                None => break (CLOSE_ABNORMAL, "stream ended".to_owned()),
            },
        }
    };

    tracing::debug!(%id, code, %reason, "WebSocket closed");
    emit(TransportEventKind::Closed { code, reason });
}

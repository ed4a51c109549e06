//! WebSocket传输层
//! WebSocket transport
//!
//! 每个连接一个读循环加一个经无界通道驱动的写任务。读循环解析JSON
//! 事件交给中枢；传输断开触发中枢侧清理。
//! One read loop per connection plus a write task driven by an unbounded
//! channel. The read loop parses JSON events for the hub; transport
//! teardown triggers hub-side cleanup.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use uuid::Uuid;

use crate::error::AppResult;

use super::events::{ClientEvent, ServerEvent};
use super::hub::ChatHub;

/// 绑定监听地址并接入连接，直至任务被取消
/// Bind the listen address and accept connections until cancelled
pub async fn run(hub: Arc<ChatHub>, listen: &str) -> AppResult<()> {
    let listener = TcpListener::bind(listen).await.map_err(anyhow::Error::from)?;
    tracing::info!(listen, "realtime listener started");

    loop {
        let (stream, peer) = listener.accept().await.map_err(anyhow::Error::from)?;
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_socket(hub, stream).await {
                tracing::warn!(%peer, error = %err, "connection ended with error");
            }
        });
    }
}

async fn handle_socket(hub: Arc<ChatHub>, stream: TcpStream) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();
    let conn_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    hub.connect(&conn_id, tx.clone());

    let writer_conn = conn_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(json) => WsMessage::Text(json),
                Err(err) => {
                    tracing::error!(conn_id = writer_conn, error = %err, "event serialization failed");
                    continue;
                }
            };
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = source.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => hub.handle(&conn_id, event),
                Err(err) => {
                    let _ = tx.send(ServerEvent::Error {
                        message: format!("malformed event: {}", err),
                    });
                }
            },
            Ok(WsMessage::Close(_)) => break,
            // 控制帧由协议栈处理 / Control frames are handled by the stack
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(conn_id, error = %err, "read failed");
                break;
            }
        }
    }

    hub.disconnect(&conn_id);
    drop(tx);
    writer.abort();
    Ok(())
}

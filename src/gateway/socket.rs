use std::sync::Arc;

use actix_web::{get, rt, web, HttpRequest, HttpResponse};
use actix_ws::{Message, MessageStream};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::handshake::{authenticate, Session};
use super::turn::{BackgroundWrite, ReplySink, TurnOutcome, TurnPipeline, TurnRequest};
use crate::error::EmitError;
use crate::types::{InboundEvent, OutboundEvent, Reply};
use crate::AppState;

/// Outbound half of one socket.
struct SocketSink {
    ws: actix_ws::Session,
}

fn encode(event: &OutboundEvent) -> Result<String, EmitError> {
    Ok(serde_json::to_string(event)?)
}

impl SocketSink {
    async fn send(&mut self, event: &OutboundEvent) -> Result<(), EmitError> {
        let frame = encode(event)?;
        self.ws.text(frame).await.map_err(|_| EmitError::Closed)
    }
}

#[async_trait]
impl ReplySink for SocketSink {
    async fn emit(&mut self, reply: Reply) -> Result<(), EmitError> {
        self.send(&OutboundEvent::AiResponse(reply)).await
    }
}

#[get("/ws")]
pub async fn chat_socket(
    req: HttpRequest,
    body: web::Payload,
    app_state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, actix_web::Error> {
    let session = match authenticate(app_state.verifier.as_ref(), &req).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Rejecting socket handshake: {}", e);
            return Ok(HttpResponse::Unauthorized().body("Unauthorized"));
        }
    };

    let (response, ws, stream) = actix_ws::handle(&req, body)?;
    rt::spawn(run_connection(app_state.pipeline.clone(), session, ws, stream));

    Ok(response)
}

/// Reports the outcome of a reply's persistence. Runs detached from the
/// connection, so a disconnect does not cancel the write.
async fn watch_write(
    connection_id: Uuid,
    chat_id: Uuid,
    turn: u64,
    write: BackgroundWrite,
) {
    if let Err(e) = write.finish().await {
        error!(%connection_id, %chat_id, turn, "Background write failed: {}", e);
    }
}

/// Reads frames until the client leaves. Turns run one at a time, in the
/// order they arrive; a turn's background write outlives the connection.
async fn run_connection(
    pipeline: TurnPipeline,
    session: Session,
    ws: actix_ws::Session,
    mut stream: MessageStream,
) {
    let mut sink = SocketSink { ws: ws.clone() };
    let mut turn: u64 = 0;

    let close_reason = loop {
        let frame = match stream.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!(connection_id = %session.connection_id, "Socket protocol error: {}", e);
                break None;
            }
            None => break None,
        };

        match frame {
            Message::Text(text) => match serde_json::from_str::<InboundEvent>(&text) {
                Ok(InboundEvent::Ping) => match sink.send(&OutboundEvent::Pong).await {
                    Ok(()) => {}
                    Err(EmitError::Closed) => break None,
                    Err(e) => {
                        error!(connection_id = %session.connection_id, "Pong not sent: {}", e);
                    }
                },
                Ok(event) => {
                    let Some(request) = TurnRequest::from_event(event) else {
                        continue;
                    };
                    turn += 1;
                    let chat_id = request.chat_id;
                    match pipeline.run(&session, turn, request, &mut sink).await {
                        Ok(TurnOutcome::Replied(write)) => {
                            rt::spawn(watch_write(session.connection_id, chat_id, turn, write));
                        }
                        Ok(TurnOutcome::FellBack(e)) => {
                            debug!(
                                connection_id = %session.connection_id,
                                %chat_id,
                                turn,
                                "Turn answered with fallback: {}",
                                e
                            );
                        }
                        Err(e) => {
                            debug!(
                                connection_id = %session.connection_id,
                                %chat_id,
                                turn,
                                "Turn ended without a reply: {}",
                                e
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        connection_id = %session.connection_id,
                        "Ignoring malformed frame: {}",
                        e
                    );
                }
            },
            Message::Ping(bytes) => {
                if sink.ws.pong(&bytes).await.is_err() {
                    break None;
                }
            }
            Message::Close(reason) => break reason,
            _ => {}
        }
    };

    info!(
        connection_id = %session.connection_id,
        user_id = %session.user.id,
        turns = turn,
        "Connection closed"
    );
    let _ = ws.close(close_reason).await;
}

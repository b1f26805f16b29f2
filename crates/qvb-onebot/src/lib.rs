//! OneBot v11 forward-WebSocket adapter (napcat and friends).
//!
//! Owns the connection, reconnection and wire protocol, and exposes the
//! core's ports: [`MessageTransport`] and [`GroupMembershipOracle`]. API
//! calls are correlated with their responses by `echo` ids over the same
//! socket the events arrive on.

pub mod api;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use qvb_core::{
    domain::{GroupId, Role, UserId},
    message::IncomingMessage,
    ports::{GroupMember, GroupMembershipOracle, MessageTransport},
    Error, Result,
};

use api::{parse_frame, role_from_wire, text_segment, Frame, WireGroupMember};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const EVENT_BUFFER: usize = 128;
const CALL_BUFFER: usize = 32;

/// Raw API call result: the caller decides what a non-zero retcode means.
#[derive(Clone, Debug)]
pub struct ApiOutcome {
    pub retcode: i64,
    pub data: Value,
}

struct ApiCall {
    action: &'static str,
    params: Value,
    respond: oneshot::Sender<Result<ApiOutcome>>,
}

/// Handle for making API calls over the adapter's socket.
///
/// Cheap to clone; calls made while the socket is down fail with
/// [`Error::Transport`] instead of blocking until reconnect.
#[derive(Clone)]
pub struct OneBotApi {
    calls: mpsc::Sender<ApiCall>,
}

impl OneBotApi {
    async fn call(&self, action: &'static str, params: Value) -> Result<ApiOutcome> {
        let (tx, rx) = oneshot::channel();
        self.calls
            .send(ApiCall {
                action,
                params,
                respond: tx,
            })
            .await
            .map_err(|_| Error::Transport("connection task stopped".to_string()))?;
        rx.await
            .map_err(|_| Error::Transport("connection lost before reply".to_string()))?
    }

    async fn call_ok(&self, action: &'static str, params: Value) -> Result<Value> {
        let outcome = self.call(action, params).await?;
        if outcome.retcode != 0 {
            return Err(Error::Transport(format!(
                "{action} failed with retcode {}",
                outcome.retcode
            )));
        }
        Ok(outcome.data)
    }
}

#[async_trait]
impl MessageTransport for OneBotApi {
    async fn send_private(&self, user: UserId, text: &str) -> Result<()> {
        self.call_ok(
            "send_private_msg",
            serde_json::json!({
                "user_id": user.0,
                "message": [text_segment(text)],
            }),
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl GroupMembershipOracle for OneBotApi {
    async fn group_members(&self, group: GroupId) -> Result<Vec<GroupMember>> {
        let data = self
            .call_ok(
                "get_group_member_list",
                serde_json::json!({ "group_id": group.0, "no_cache": true }),
            )
            .await?;
        let members: Vec<WireGroupMember> = serde_json::from_value(data)
            .map_err(|e| Error::Transport(format!("bad member list: {e}")))?;
        Ok(members
            .into_iter()
            .map(|m| GroupMember {
                user_id: UserId(m.user_id),
                card: m.card,
            })
            .collect())
    }

    async fn member_role(&self, group: GroupId, user: UserId) -> Result<Option<Role>> {
        let outcome = self
            .call(
                "get_group_member_info",
                serde_json::json!({ "group_id": group.0, "user_id": user.0, "no_cache": true }),
            )
            .await?;

        // Non-members come back as an API-level error, not as a member
        // record with an empty role.
        if outcome.retcode != 0 {
            return Ok(None);
        }

        let member: WireGroupMember = serde_json::from_value(outcome.data)
            .map_err(|e| Error::Transport(format!("bad member info: {e}")))?;
        Ok(member.role.as_deref().and_then(role_from_wire))
    }
}

/// The adapter: a background connection task plus the handles it serves.
pub struct OneBotClient {
    api: OneBotApi,
    events: mpsc::Receiver<IncomingMessage>,
}

impl OneBotClient {
    /// Spawn the connection task. Returns immediately; the task connects and
    /// reconnects in the background until `shutdown` fires.
    pub fn spawn(host: &str, port: u16, access_token: &str, shutdown: CancellationToken) -> Self {
        let url = format!("ws://{host}:{port}/?access_token={access_token}");
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (call_tx, call_rx) = mpsc::channel(CALL_BUFFER);

        tokio::spawn(connection_loop(url, call_rx, event_tx, shutdown));

        Self {
            api: OneBotApi { calls: call_tx },
            events: event_rx,
        }
    }

    pub fn api(&self) -> OneBotApi {
        self.api.clone()
    }

    /// Next inbound message; `None` once the connection task has stopped.
    pub async fn next_message(&mut self) -> Option<IncomingMessage> {
        self.events.recv().await
    }
}

async fn connection_loop(
    url: String,
    mut call_rx: mpsc::Receiver<ApiCall>,
    event_tx: mpsc::Sender<IncomingMessage>,
    shutdown: CancellationToken,
) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                info!("onebot connected");
                if run_connection(ws, &mut call_rx, &event_tx, &shutdown).await {
                    return;
                }
                warn!("onebot disconnected, retrying in {RECONNECT_DELAY:?}");
            }
            Err(e) => {
                warn!("onebot connect failed: {e}, retrying in {RECONNECT_DELAY:?}");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = shutdown.cancelled() => return,
        }
    }
}

/// Pump one connection until it drops. Returns `true` on shutdown.
async fn run_connection(
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    call_rx: &mut mpsc::Receiver<ApiCall>,
    event_tx: &mpsc::Sender<IncomingMessage>,
    shutdown: &CancellationToken,
) -> bool {
    let (mut write, mut read) = ws.split();
    let mut pending: HashMap<String, oneshot::Sender<Result<ApiOutcome>>> = HashMap::new();
    let mut echo_seq: u64 = 0;

    let done = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break true,

            call = call_rx.recv() => {
                let Some(call) = call else { break true };
                echo_seq += 1;
                let echo = echo_seq.to_string();
                let frame = serde_json::json!({
                    "action": call.action,
                    "params": call.params,
                    "echo": echo,
                });
                match write.send(Message::Text(frame.to_string().into())).await {
                    Ok(()) => {
                        pending.insert(echo, call.respond);
                    }
                    Err(e) => {
                        let _ = call
                            .respond
                            .send(Err(Error::Transport(format!("send failed: {e}"))));
                        break false;
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(text.as_str(), &mut pending, event_tx).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break false,
                    Some(Err(e)) => {
                        warn!("onebot read error: {e}");
                        break false;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    };

    // Whatever ended this connection, in-flight calls will never be answered.
    for (_, respond) in pending.drain() {
        let _ = respond.send(Err(Error::Transport("connection lost".to_string())));
    }
    done
}

async fn handle_frame(
    raw: &str,
    pending: &mut HashMap<String, oneshot::Sender<Result<ApiOutcome>>>,
    event_tx: &mpsc::Sender<IncomingMessage>,
) {
    match parse_frame(raw) {
        Frame::Api(resp) => {
            let Some(respond) = pending.remove(&resp.echo) else {
                return;
            };
            let _ = respond.send(Ok(ApiOutcome {
                retcode: resp.retcode,
                data: resp.data,
            }));
        }
        Frame::Message(event) => {
            if let Some(msg) = event.into_incoming() {
                let _ = event_tx.send(msg).await;
            }
        }
        Frame::Other => {}
    }
}

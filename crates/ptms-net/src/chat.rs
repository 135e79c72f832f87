//! Real-time chat client with tokio mpsc command/notification pattern.
//!
//! The WebSocket link runs in a dedicated tokio task. The owner talks to it
//! through a [`ChatCommand`] channel and receives [`ChatNotification`]s in the
//! exact order the transport delivered them. The task authenticates on every
//! (re)connect, replays the requested room subscriptions, sends heartbeats,
//! and reconnects with capped exponential backoff until the owner asks it to
//! disconnect or the reconnect budget is spent.

use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use ptms_shared::constants::{
    CLOSE_CODE_ABNORMAL, CLOSE_CODE_HEARTBEAT_TIMEOUT, CLOSE_CODE_NORMAL, DEFAULT_HEARTBEAT_SECS,
    HEARTBEAT_MISS_LIMIT, HTTP_TIMEOUT_SECS,
};
use ptms_shared::protocol::{ChatEvent, ClientFrame, ServerFrame};
use ptms_shared::types::{ConnectionState, RoomId};

use crate::connection::ChatConnection;
use crate::reconnect::ReconnectPolicy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the chat task.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    Subscribe(RoomId),
    Unsubscribe(RoomId),
    SendMessage { room_id: RoomId, body: String },
    SetTyping { room_id: RoomId, is_typing: bool },
    MarkRead(RoomId),
    /// Close the link and stop; no reconnection follows.
    Disconnect,
}

/// Notifications sent *from* the chat task to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatNotification {
    /// The connection lifecycle moved.
    StateChanged(ConnectionState),
    /// An inbound chat event, in transport order.
    Event(ChatEvent),
    /// A message could not be handed to the gateway.
    SendFailed {
        room_id: RoomId,
        body: String,
        reason: String,
    },
    /// Reconnection gave up after `attempts` consecutive failures.
    ReconnectFailed { attempts: u32 },
}

/// Configuration for spawning the chat task.
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    /// Gateway URL (`ws://` or `wss://`).
    pub url: String,
    /// Session token presented in the authentication handshake.
    pub token: String,
    pub heartbeat: Duration,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ChatClientConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            connect_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Owner-side handle of a running chat task.
pub struct ChatHandle {
    cmd_tx: mpsc::Sender<ChatCommand>,
    task: JoinHandle<()>,
}

impl ChatHandle {
    /// A sender for issuing commands from elsewhere.
    pub fn commands(&self) -> mpsc::Sender<ChatCommand> {
        self.cmd_tx.clone()
    }

    pub async fn send(&self, command: ChatCommand) -> Result<(), ChatCommand> {
        self.cmd_tx.send(command).await.map_err(|e| e.0)
    }

    /// Close the link cleanly and wait for the task to finish.
    pub async fn disconnect(self) {
        let _ = self.cmd_tx.send(ChatCommand::Disconnect).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Chat task ended abnormally");
        }
    }
}

/// Spawn the chat task. The link is owned by the task; one task per chat
/// screen.
pub fn spawn_chat_client(
    config: ChatClientConfig,
) -> (ChatHandle, mpsc::Receiver<ChatNotification>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<ChatCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<ChatNotification>(256);

    let task = tokio::spawn(async move {
        run(config, cmd_rx, notif_tx).await;
    });

    (ChatHandle { cmd_tx, task }, notif_rx)
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

enum SessionEnd {
    /// Owner asked to disconnect.
    Closed,
    /// Every command sender is gone.
    HandleDropped,
    /// The link failed or the gateway closed it.
    Dropped { code: u16, reason: String },
    /// The link never came up.
    ConnectFailed(String),
}

struct Notifier {
    tx: mpsc::Sender<ChatNotification>,
}

impl Notifier {
    async fn send(&self, notification: ChatNotification) {
        if self.tx.send(notification).await.is_err() {
            debug!("Chat notification receiver dropped");
        }
    }

    async fn state(&self, changed: Option<ConnectionState>) {
        if let Some(state) = changed {
            self.send(ChatNotification::StateChanged(state)).await;
        }
    }
}

async fn run(
    config: ChatClientConfig,
    mut cmd_rx: mpsc::Receiver<ChatCommand>,
    notif_tx: mpsc::Sender<ChatNotification>,
) {
    let notifier = Notifier { tx: notif_tx };
    let mut conn = ChatConnection::new();
    let mut failures: u32 = 0;

    info!(url = %config.url, "Chat client started");

    loop {
        notifier.state(conn.begin_connect()).await;

        let end = match connect(&config).await {
            Ok(ws) => {
                info!(url = %config.url, "Chat gateway connected");
                notifier.state(conn.apply(&ChatEvent::Connected)).await;
                notifier.send(ChatNotification::Event(ChatEvent::Connected)).await;
                drive_session(ws, &config, &mut conn, &mut cmd_rx, &notifier).await
            }
            Err(e) => {
                warn!(url = %config.url, error = %e, "Chat connection failed");
                SessionEnd::ConnectFailed(e.to_string())
            }
        };

        let was_authenticated = conn.is_authenticated();
        match end {
            SessionEnd::Closed => {
                info!("Chat client disconnected by owner");
                let event = ChatEvent::Disconnected {
                    code: CLOSE_CODE_NORMAL,
                    reason: "closed by client".into(),
                };
                notifier.state(conn.apply(&event)).await;
                notifier.send(ChatNotification::Event(event)).await;
                return;
            }
            SessionEnd::HandleDropped => {
                info!("Chat command channel closed, stopping chat client");
                return;
            }
            SessionEnd::Dropped { code, reason } => {
                let event = ChatEvent::Disconnected { code, reason };
                notifier.state(conn.apply(&event)).await;
                notifier.send(ChatNotification::Event(event)).await;
            }
            SessionEnd::ConnectFailed(message) => {
                let event = ChatEvent::Disconnected {
                    code: CLOSE_CODE_ABNORMAL,
                    reason: message.clone(),
                };
                notifier.state(conn.apply(&event)).await;
                notifier
                    .send(ChatNotification::Event(ChatEvent::Error { message }))
                    .await;
            }
        }

        if was_authenticated {
            failures = 0;
        }
        failures += 1;

        let Some(delay) = config.reconnect.delay_for(failures) else {
            let attempts = failures - 1;
            warn!(attempts, "Chat reconnection failed, giving up");
            notifier
                .send(ChatNotification::ReconnectFailed { attempts })
                .await;
            return;
        };

        debug!(attempt = failures, delay_ms = delay.as_millis() as u64, "Scheduling chat reconnect");
        if !wait_before_retry(delay, &mut conn, &mut cmd_rx, &notifier).await {
            info!("Chat client stopped while waiting to reconnect");
            return;
        }
    }
}

async fn connect(config: &ChatClientConfig) -> anyhow::Result<WsStream> {
    let attempt = tokio_tungstenite::connect_async(config.url.as_str());
    let (ws, response) = tokio::time::timeout(config.connect_timeout, attempt)
        .await
        .map_err(|_| anyhow::anyhow!("connect timed out"))?
        .map_err(|e| anyhow::anyhow!("connect failed: {e}"))?;
    debug!(status = %response.status(), "WebSocket handshake complete");
    Ok(ws)
}

/// Pump one live link until it ends.
async fn drive_session(
    ws: WsStream,
    config: &ChatClientConfig,
    conn: &mut ChatConnection,
    cmd_rx: &mut mpsc::Receiver<ChatCommand>,
    notifier: &Notifier,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    let auth = ClientFrame::Authenticate {
        token: config.token.clone(),
    };
    if let Err(e) = send_frame(&mut sink, &auth).await {
        return dropped(CLOSE_CODE_ABNORMAL, e);
    }

    let mut heartbeat = tokio::time::interval(config.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;
    let mut last_inbound = Instant::now();
    let dead_after = config.heartbeat.saturating_mul(HEARTBEAT_MISS_LIMIT);

    loop {
        tokio::select! {
            // --- Gateway frames ---
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        last_inbound = Instant::now();
                        if let Err(e) = handle_text(&text, conn, &mut sink, notifier).await {
                            return dropped(CLOSE_CODE_ABNORMAL, e);
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or((CLOSE_CODE_ABNORMAL, "closed without status".into()));
                        info!(code, reason = %reason, "Chat gateway closed the connection");
                        return SessionEnd::Dropped { code, reason };
                    }
                    Some(Ok(_)) => {
                        last_inbound = Instant::now();
                    }
                    Some(Err(e)) => return dropped(CLOSE_CODE_ABNORMAL, e),
                    None => {
                        return SessionEnd::Dropped {
                            code: CLOSE_CODE_ABNORMAL,
                            reason: "connection reset".into(),
                        };
                    }
                }
            }

            // --- Owner commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ChatCommand::Disconnect) => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return SessionEnd::Closed;
                    }
                    Some(command) => {
                        if let Err(e) = handle_live_command(command, conn, &mut sink, notifier).await {
                            return dropped(CLOSE_CODE_ABNORMAL, e);
                        }
                    }
                    None => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return SessionEnd::HandleDropped;
                    }
                }
            }

            // --- Heartbeat ---
            _ = heartbeat.tick() => {
                if last_inbound.elapsed() > dead_after {
                    warn!(silent_ms = last_inbound.elapsed().as_millis() as u64, "Chat heartbeat timed out");
                    return SessionEnd::Dropped {
                        code: CLOSE_CODE_HEARTBEAT_TIMEOUT,
                        reason: "heartbeat timeout".into(),
                    };
                }
                if let Err(e) = send_frame(&mut sink, &ClientFrame::Ping).await {
                    return dropped(CLOSE_CODE_ABNORMAL, e);
                }
            }
        }
    }
}

async fn handle_text(
    text: &str,
    conn: &mut ChatConnection,
    sink: &mut WsSink,
    notifier: &Notifier,
) -> anyhow::Result<()> {
    let frame = match ServerFrame::from_json(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed chat frame");
            return Ok(());
        }
    };

    let Some(event) = frame.into_event() else {
        return Ok(());
    };
    debug!(event = ?event, "Chat event received");

    let changed = conn.apply(&event);
    let just_authenticated = changed == Some(ConnectionState::Authenticated);
    notifier.state(changed).await;
    notifier.send(ChatNotification::Event(event)).await;

    if just_authenticated {
        let rooms: Vec<RoomId> = conn.desired_rooms().iter().copied().collect();
        for room_id in rooms {
            debug!(room = %room_id, "Replaying room subscription");
            send_frame(sink, &ClientFrame::Subscribe { room_id }).await?;
        }
    }
    Ok(())
}

async fn handle_live_command(
    command: ChatCommand,
    conn: &mut ChatConnection,
    sink: &mut WsSink,
    notifier: &Notifier,
) -> anyhow::Result<()> {
    let authenticated = conn.is_authenticated();
    match command {
        ChatCommand::Subscribe(room_id) => {
            conn.request_subscribe(room_id);
            if authenticated {
                send_frame(sink, &ClientFrame::Subscribe { room_id }).await?;
            }
        }
        ChatCommand::Unsubscribe(room_id) => {
            conn.request_unsubscribe(room_id);
            if authenticated {
                send_frame(sink, &ClientFrame::Unsubscribe { room_id }).await?;
            }
        }
        ChatCommand::SendMessage { room_id, body } => {
            if !authenticated {
                notifier
                    .send(ChatNotification::SendFailed {
                        room_id,
                        body,
                        reason: "not authenticated".into(),
                    })
                    .await;
                return Ok(());
            }
            let frame = ClientFrame::SendMessage {
                room_id,
                body: body.clone(),
            };
            if let Err(e) = send_frame(sink, &frame).await {
                notifier
                    .send(ChatNotification::SendFailed {
                        room_id,
                        body,
                        reason: e.to_string(),
                    })
                    .await;
                return Err(e);
            }
        }
        ChatCommand::SetTyping { room_id, is_typing } => {
            if authenticated {
                send_frame(sink, &ClientFrame::Typing { room_id, is_typing }).await?;
            }
        }
        ChatCommand::MarkRead(room_id) => {
            if authenticated {
                send_frame(sink, &ClientFrame::MarkRead { room_id }).await?;
            }
        }
        ChatCommand::Disconnect => {}
    }
    Ok(())
}

/// Sleep out the backoff delay while still serving commands. Returns `false`
/// when the owner asked to stop.
async fn wait_before_retry(
    delay: Duration,
    conn: &mut ChatConnection,
    cmd_rx: &mut mpsc::Receiver<ChatCommand>,
    notifier: &Notifier,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(ChatCommand::Disconnect) => return false,
                    Some(ChatCommand::Subscribe(room_id)) => conn.request_subscribe(room_id),
                    Some(ChatCommand::Unsubscribe(room_id)) => conn.request_unsubscribe(room_id),
                    Some(ChatCommand::SendMessage { room_id, body }) => {
                        notifier
                            .send(ChatNotification::SendFailed {
                                room_id,
                                body,
                                reason: "not connected".into(),
                            })
                            .await;
                    }
                    Some(other) => debug!(command = ?other, "Dropping command while disconnected"),
                }
            }
        }
    }
}

async fn send_frame(sink: &mut WsSink, frame: &ClientFrame) -> anyhow::Result<()> {
    let text = frame.to_json()?;
    sink.send(WsMessage::Text(text)).await?;
    Ok(())
}

fn dropped(code: u16, err: impl std::fmt::Display) -> SessionEnd {
    warn!(error = %err, "Chat link dropped");
    SessionEnd::Dropped {
        code,
        reason: err.to_string(),
    }
}

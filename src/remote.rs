//! Remote bridge - a chatbot reached over a websocket
//!
//! The chatbot speaks one JSON object per message. Outbound turns are
//! `{"role": "User", "text": ...}`; replies are `{"text": ..., ...}` and are
//! tagged with `"role": "Bot"` on the way in.
//!
//! Before the bot treats messages as conversation turns its own state
//! machine has to be walked past a greeting phase. [`RemoteBridge::handshake`]
//! does that by sending `dummy` and then `begin`, discarding both replies.
//! This is an external contract with the bot server.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, RoundtableError};
use crate::participant::{Participant, ParticipantRole};
use crate::turn::{TurnRecord, DONE_SIGNAL, NOTHING_TO_REPLY};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sentinel messages that move the bot past its greeting phase, in order
pub const HANDSHAKE_SENTINELS: [&str; 2] = ["dummy", "begin"];

/// Address of the bot's websocket endpoint
pub fn websocket_url(host: &str, port: u16) -> String {
    format!("ws://{host}:{port}/websocket")
}

/// Tell a bot the episode is over and wait for one reply so it can
/// release its resources. The reply is discarded.
pub async fn send_done(bot: &dyn Participant) -> Result<()> {
    bot.observe(&TurnRecord::text(DONE_SIGNAL)).await?;
    let ack = bot.act().await?;
    debug!(participant = %bot.id(), reply = %ack.text, "Chatbot acknowledged done signal");
    Ok(())
}

/// Lifecycle of the bridge's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Handshaking,
    Ready,
    Sending,
    Receiving,
    /// Terminal; a closed connection is never reused
    Closed,
}

impl ConnectionState {
    fn accepts_traffic(self) -> bool {
        matches!(self, Self::Handshaking | Self::Ready)
    }
}

/// Open socket plus the number of replies the bot still owes us
struct Connection {
    stream: WsStream,
    awaiting: usize,
}

/// Participant backed by a websocket chatbot
pub struct RemoteBridge {
    id: String,
    role: ParticipantRole,
    addr: String,
    state: RwLock<ConnectionState>,
    connection: AsyncMutex<Option<Connection>>,
}

impl RemoteBridge {
    /// Create a bridge to `host:port`; nothing is opened yet
    pub fn new(host: &str, port: u16, registered_name: impl Into<String>) -> Self {
        Self {
            id: "RemoteBridge".to_string(),
            role: ParticipantRole::bot(registered_name),
            addr: websocket_url(host, port),
            state: RwLock::new(ConnectionState::Disconnected),
            connection: AsyncMutex::new(None),
        }
    }

    /// Set the display id shown on the bot's turns
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Connect and handshake in one step
    pub async fn open(
        host: &str,
        port: u16,
        screen_name: &str,
        registered_name: &str,
    ) -> Result<Self> {
        let bridge = Self::new(host, port, registered_name).with_id(screen_name);
        bridge.connect().await?;
        bridge.handshake().await?;
        Ok(bridge)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Open the websocket. Failure here is fatal for the session.
    #[instrument(skip(self), fields(addr = %self.addr))]
    pub async fn connect(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);

        let (stream, _) = connect_async(self.addr.as_str()).await.map_err(|source| {
            error!(error = %source, "Failed to connect to chatbot");
            self.set_state(ConnectionState::Closed);
            RoundtableError::RemoteUnavailable {
                addr: self.addr.clone(),
                source,
            }
        })?;

        *self.connection.lock().await = Some(Connection {
            stream,
            awaiting: 0,
        });
        self.set_state(ConnectionState::Handshaking);

        info!("Connected to chatbot");
        Ok(())
    }

    /// Walk the bot past its greeting phase
    pub async fn handshake(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Handshaking => {}
            ConnectionState::Ready => return Ok(()),
            ConnectionState::Closed => return Err(RoundtableError::ConnectionClosed(self.id())),
            _ => return Err(RoundtableError::NotConnected(self.id())),
        }

        for sentinel in HANDSHAKE_SENTINELS {
            self.observe(&TurnRecord::text(sentinel)).await?;
            let discarded = self.act().await?;
            debug!(sentinel, reply = %discarded.text, "Discarded handshake reply");
        }

        self.set_state(ConnectionState::Ready);
        info!(participant = %self.id, "Chatbot handshake complete");
        Ok(())
    }

    /// Borrow the open connection, or say why there is none
    fn ready<'a>(&self, slot: &'a mut Option<Connection>) -> Result<&'a mut Connection> {
        let state = self.state();
        if state == ConnectionState::Closed {
            return Err(RoundtableError::ConnectionClosed(self.id()));
        }
        let connection = slot
            .as_mut()
            .ok_or_else(|| RoundtableError::NotConnected(self.id()))?;
        if !state.accepts_traffic() {
            return Err(RoundtableError::NotConnected(self.id()));
        }
        Ok(connection)
    }

    /// Drop the socket after a transport failure
    fn fail(&self, slot: &mut Option<Connection>, err: &RoundtableError) {
        if err.is_transport_failure() {
            warn!(participant = %self.id, error = %err, "Chatbot connection lost");
        } else {
            warn!(participant = %self.id, error = %err, "Closing chatbot connection after bad reply");
        }
        *slot = None;
        self.set_state(ConnectionState::Closed);
    }

    async fn receive(&self, connection: &mut Connection) -> Result<TurnRecord> {
        loop {
            match connection.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text).map_err(|source| {
                        RoundtableError::MalformedReply {
                            participant: self.id(),
                            source,
                        }
                    });
                }
                Some(Ok(Message::Binary(bytes))) => {
                    warn!(participant = %self.id, len = bytes.len(), "Chatbot replied with a binary frame");
                    return serde_json::from_slice(&bytes).map_err(|source| {
                        RoundtableError::MalformedReply {
                            participant: self.id(),
                            source,
                        }
                    });
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(RoundtableError::ConnectionClosed(self.id()))
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(other)) => {
                    warn!(participant = %self.id, frame = ?other, "Ignoring unexpected frame from chatbot");
                    continue;
                }
                Some(Err(source)) => {
                    return Err(RoundtableError::Transport {
                        participant: self.id(),
                        source,
                    })
                }
            }
        }
    }
}

#[async_trait]
impl Participant for RemoteBridge {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn role(&self) -> &ParticipantRole {
        &self.role
    }

    async fn observe(&self, message: &TurnRecord) -> Result<()> {
        let mut slot = self.connection.lock().await;
        let resting = self.state();
        let connection = self.ready(&mut slot)?;

        let payload = json!({ "role": "User", "text": message.text }).to_string();
        self.set_state(ConnectionState::Sending);
        match connection.stream.send(Message::text(payload)).await {
            Ok(()) => {
                connection.awaiting += 1;
                self.set_state(resting);
                Ok(())
            }
            Err(source) => {
                let err = RoundtableError::Transport {
                    participant: self.id(),
                    source,
                };
                self.fail(&mut slot, &err);
                Err(err)
            }
        }
    }

    async fn act(&self) -> Result<TurnRecord> {
        let mut slot = self.connection.lock().await;
        let resting = self.state();
        let connection = self.ready(&mut slot)?;

        if connection.awaiting == 0 {
            return Ok(TurnRecord::new(self.id(), NOTHING_TO_REPLY));
        }

        self.set_state(ConnectionState::Receiving);
        let mut received = Ok(None);
        while connection.awaiting > 0 {
            match self.receive(connection).await {
                Ok(reply) => {
                    connection.awaiting -= 1;
                    if connection.awaiting > 0 {
                        debug!(participant = %self.id, text = %reply.text, "Skipping stale reply");
                    }
                    received = Ok(Some(reply));
                }
                Err(err) => {
                    received = Err(err);
                    break;
                }
            }
        }

        match received {
            Ok(Some(mut reply)) => {
                self.set_state(resting);
                reply.id = self.id();
                reply.episode_done = false;
                reply.extra.insert("role".to_string(), Value::from("Bot"));
                Ok(reply)
            }
            Ok(None) => {
                self.set_state(resting);
                Ok(TurnRecord::new(self.id(), NOTHING_TO_REPLY))
            }
            // a reply that cannot be read leaves the socket out of step
            Err(err) => {
                self.fail(&mut slot, &err);
                Err(err)
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        let mut slot = self.connection.lock().await;
        if let Some(mut connection) = slot.take() {
            if let Err(e) = connection.stream.close(None).await {
                debug!(participant = %self.id, error = %e, "Error closing chatbot socket");
            }
        }
        self.set_state(ConnectionState::Closed);
        info!(participant = %self.id, "Chatbot connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{spawn_bot, spawn_counting_bot, BotMode};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn connected_bridge(addr: SocketAddr) -> RemoteBridge {
        let bridge = RemoteBridge::new("127.0.0.1", addr.port(), "ECHO").with_id("Bot");
        bridge.connect().await.unwrap();
        bridge
    }

    #[tokio::test]
    async fn test_handshake_then_reply_is_third_message() {
        let (addr, path, server) = spawn_counting_bot().await;
        let bridge = connected_bridge(addr).await;
        assert_eq!(bridge.state(), ConnectionState::Handshaking);

        bridge.handshake().await.unwrap();
        assert_eq!(bridge.state(), ConnectionState::Ready);

        bridge.observe(&TurnRecord::new("Chat Agent 2", "hello")).await.unwrap();
        let reply = bridge.act().await.unwrap();
        assert_eq!(reply.text, "reply 3");
        assert_eq!(reply.id, "Bot");
        assert_eq!(reply.role(), Some("Bot"));
        assert!(!reply.episode_done);
        assert_eq!(reply.extra.get("mood"), Some(&Value::from("calm")));

        bridge.shutdown().await.unwrap();
        assert_eq!(bridge.state(), ConnectionState::Closed);

        let received = server.await.unwrap();
        assert_eq!(
            received,
            vec![
                json!({"role": "User", "text": "dummy"}),
                json!({"role": "User", "text": "begin"}),
                json!({"role": "User", "text": "hello"}),
            ]
        );
        assert_eq!(path.lock().as_str(), "/websocket");
    }

    #[tokio::test]
    async fn test_act_before_observation_returns_placeholder() {
        let (addr, _path, _server) = spawn_counting_bot().await;
        let bridge = connected_bridge(addr).await;
        bridge.handshake().await.unwrap();

        let reply = bridge.act().await.unwrap();
        assert_eq!(reply.text, NOTHING_TO_REPLY);
        assert!(!reply.episode_done);
    }

    #[tokio::test]
    async fn test_stale_replies_are_skipped() {
        let (addr, _path, _server) = spawn_counting_bot().await;
        let bridge = connected_bridge(addr).await;
        bridge.handshake().await.unwrap();

        bridge.observe(&TurnRecord::text("first")).await.unwrap();
        bridge.observe(&TurnRecord::text("second")).await.unwrap();
        assert_eq!(bridge.act().await.unwrap().text, "reply 4");
    }

    #[tokio::test]
    async fn test_done_signal_is_sent_and_acknowledged() {
        let (addr, _path, server) = spawn_counting_bot().await;
        let bridge = connected_bridge(addr).await;
        bridge.handshake().await.unwrap();

        send_done(&bridge).await.unwrap();
        bridge.shutdown().await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(received.last(), Some(&json!({"role": "User", "text": "[DONE]"})));
    }

    #[tokio::test]
    async fn test_connection_refused_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let bridge = RemoteBridge::new("127.0.0.1", port, "ECHO");
        let err = bridge.connect().await.unwrap_err();
        match err {
            RoundtableError::RemoteUnavailable { addr, .. } => {
                assert_eq!(addr, format!("ws://127.0.0.1:{port}/websocket"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(bridge.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_observe_without_connection_fails_loudly() {
        let bridge = RemoteBridge::new("127.0.0.1", 1, "ECHO");
        let err = bridge.observe(&TurnRecord::text("hello")).await.unwrap_err();
        assert!(matches!(err, RoundtableError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_server_hang_up_closes_bridge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            let _ = ws.close(None).await;
        });

        let bridge = connected_bridge(addr).await;
        bridge.observe(&TurnRecord::text("dummy")).await.unwrap();

        let err = bridge.act().await.unwrap_err();
        assert!(err.is_transport_failure());
        assert_eq!(bridge.state(), ConnectionState::Closed);

        let err = bridge.observe(&TurnRecord::text("again")).await.unwrap_err();
        assert!(matches!(err, RoundtableError::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn test_malformed_reply_closes_bridge() {
        let (addr, _path, _server) = spawn_bot(BotMode::GarbleReply(3)).await;
        let bridge = connected_bridge(addr).await;
        bridge.handshake().await.unwrap();

        bridge.observe(&TurnRecord::text("hello")).await.unwrap();
        let err = bridge.act().await.unwrap_err();
        assert!(matches!(err, RoundtableError::MalformedReply { .. }));
        assert_eq!(bridge.state(), ConnectionState::Closed);

        let err = send_done(&bridge).await.unwrap_err();
        assert!(matches!(err, RoundtableError::ConnectionClosed(_)));
        tokio_test::assert_ok!(bridge.shutdown().await);
    }

    #[tokio::test]
    async fn test_binary_json_reply_is_accepted() {
        let (addr, _path, _server) = spawn_bot(BotMode::Binary).await;
        let bridge = connected_bridge(addr).await;
        bridge.handshake().await.unwrap();

        bridge.observe(&TurnRecord::text("hello")).await.unwrap();
        let reply = bridge.act().await.unwrap();
        assert_eq!(reply.text, "reply 3");
        assert_eq!(reply.role(), Some("Bot"));
    }
}

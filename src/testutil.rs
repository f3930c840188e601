//! Scripted participants and a stand-in chatbot server for tests

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Result, RoundtableError};
use crate::participant::{Participant, ParticipantRole, WorkerIdentity};
use crate::turn::TurnRecord;

/// One scripted act
#[derive(Debug, Clone)]
pub enum Step {
    Say(TurnRecord),
    /// Never answer
    Hang,
    /// Fail the act
    Fail,
}

/// Ordered acts for a scripted participant
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: VecDeque<Step>,
}

impl Script {
    pub fn lines(lines: &[&str]) -> Self {
        let mut script = Self::default();
        for line in lines {
            script = script.say(line);
        }
        script
    }

    pub fn say(mut self, text: &str) -> Self {
        self.steps.push_back(Step::Say(TurnRecord::text(text)));
        self
    }

    pub fn leave(mut self, text: &str) -> Self {
        self.steps
            .push_back(Step::Say(TurnRecord::text(text).with_episode_done(true)));
        self
    }

    pub fn hang(mut self) -> Self {
        self.steps.push_back(Step::Hang);
        self
    }

    pub fn fail(mut self) -> Self {
        self.steps.push_back(Step::Fail);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownBehavior {
    Succeed,
    Fail,
    Panic,
    Hang,
}

pub struct ScriptedParticipant {
    label: RwLock<String>,
    role: ParticipantRole,
    steps: Mutex<VecDeque<Step>>,
    observed: Mutex<Vec<TurnRecord>>,
    timeout_support: bool,
    bounded_calls: bool,
    shutdown: ShutdownBehavior,
    shut_down: AtomicBool,
    unbounded_acts: AtomicUsize,
    bounded_acts: AtomicUsize,
}

impl ScriptedParticipant {
    /// A worker named `name` with unit id `unit-<name>`
    pub fn new(name: &str, script: Script) -> Self {
        Self {
            label: RwLock::new(name.to_string()),
            role: ParticipantRole::Worker(WorkerIdentity::new(name, format!("unit-{name}"))),
            steps: Mutex::new(script.steps),
            observed: Mutex::new(Vec::new()),
            timeout_support: false,
            bounded_calls: true,
            shutdown: ShutdownBehavior::Succeed,
            shut_down: AtomicBool::new(false),
            unbounded_acts: AtomicUsize::new(0),
            bounded_acts: AtomicUsize::new(0),
        }
    }

    pub fn as_bot(mut self, registered_name: &str) -> Self {
        self.role = ParticipantRole::bot(registered_name);
        self
    }

    pub fn with_timeout_support(mut self) -> Self {
        self.timeout_support = true;
        self
    }

    /// Keep the default (unsupported) bounded methods
    pub fn without_bounded_calls(mut self) -> Self {
        self.bounded_calls = false;
        self
    }

    pub fn with_shutdown(mut self, behavior: ShutdownBehavior) -> Self {
        self.shutdown = behavior;
        self
    }

    pub fn observed(&self) -> Vec<TurnRecord> {
        self.observed.lock().clone()
    }

    pub fn observed_texts(&self) -> Vec<String> {
        self.observed.lock().iter().map(|m| m.text.clone()).collect()
    }

    pub fn was_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn unbounded_acts(&self) -> usize {
        self.unbounded_acts.load(Ordering::SeqCst)
    }

    pub fn bounded_acts(&self) -> usize {
        self.bounded_acts.load(Ordering::SeqCst)
    }

    async fn next_step(&self) -> Result<TurnRecord> {
        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Say(mut turn)) => {
                turn.id = self.id();
                Ok(turn)
            }
            Some(Step::Hang) => std::future::pending().await,
            Some(Step::Fail) => Err(RoundtableError::Participant(format!(
                "{} failed on purpose",
                self.id()
            ))),
            None => Err(RoundtableError::Disconnected(self.id())),
        }
    }
}

#[async_trait]
impl Participant for ScriptedParticipant {
    fn id(&self) -> String {
        self.label.read().clone()
    }

    fn role(&self) -> &ParticipantRole {
        &self.role
    }

    fn assign_label(&self, label: &str) {
        if !self.role.is_bot() {
            *self.label.write() = label.to_string();
        }
    }

    fn supports_timeout(&self) -> bool {
        self.timeout_support
    }

    async fn observe(&self, message: &TurnRecord) -> Result<()> {
        self.observed.lock().push(message.clone());
        Ok(())
    }

    async fn act(&self) -> Result<TurnRecord> {
        self.unbounded_acts.fetch_add(1, Ordering::SeqCst);
        self.next_step().await
    }

    async fn act_with_timeout(&self, timeout: Duration) -> Result<TurnRecord> {
        if !self.bounded_calls {
            return Err(RoundtableError::TimeoutUnsupported(self.id()));
        }
        self.bounded_acts.fetch_add(1, Ordering::SeqCst);
        tokio::time::timeout(timeout, self.next_step())
            .await
            .map_err(|_| RoundtableError::TurnTimeout {
                participant: self.id(),
                timeout,
            })?
    }

    async fn shutdown(&self) -> Result<()> {
        match self.shutdown {
            ShutdownBehavior::Succeed => {
                self.shut_down.store(true, Ordering::SeqCst);
                Ok(())
            }
            ShutdownBehavior::Fail => Err(RoundtableError::Participant("unreachable".into())),
            ShutdownBehavior::Panic => panic!("shutdown exploded"),
            ShutdownBehavior::Hang => std::future::pending().await,
        }
    }

    async fn shutdown_with_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        if !self.bounded_calls {
            return Err(RoundtableError::TimeoutUnsupported(self.id()));
        }
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.shutdown())
                .await
                .map_err(|_| RoundtableError::Participant(format!("{} hung", self.id())))?,
            None => self.shutdown().await,
        }
    }
}

/// How the stand-in chatbot answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotMode {
    /// `{"text": "reply N", "mood": "calm"}` as a text frame
    Counting,
    /// Same replies, sent as binary frames
    Binary,
    /// Answer frame N with text that is not JSON
    GarbleReply(usize),
    /// Close the socket after answering N frames
    HangUpAfter(usize),
}

/// Counting bot server for one connection.
///
/// Returns the bound address, the request path seen during the upgrade,
/// and a handle resolving to every JSON message the bot received.
pub async fn spawn_counting_bot() -> (SocketAddr, Arc<Mutex<String>>, JoinHandle<Vec<Value>>) {
    spawn_bot(BotMode::Counting).await
}

/// Bot server for one connection, answering as `mode` says
pub async fn spawn_bot(mode: BotMode) -> (SocketAddr, Arc<Mutex<String>>, JoinHandle<Vec<Value>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let path = Arc::new(Mutex::new(String::new()));
    let seen_path = Arc::clone(&path);

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
            *seen_path.lock() = req.uri().path().to_string();
            Ok(resp)
        };
        let mut ws = accept_hdr_async(stream, callback).await.unwrap();

        let mut received = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => {
                    received.push(serde_json::from_str::<Value>(&text).unwrap());
                    let n = received.len();
                    let reply = json!({
                        "text": format!("reply {n}"),
                        "mood": "calm",
                    })
                    .to_string();
                    let frame = match mode {
                        BotMode::GarbleReply(bad) if bad == n => Message::text("oops not json"),
                        BotMode::Binary => Message::binary(reply.into_bytes()),
                        _ => Message::text(reply),
                    };
                    if ws.send(frame).await.is_err() {
                        break;
                    }
                    if mode == BotMode::HangUpAfter(n) {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        received
    });

    (addr, path, handle)
}

//! In-memory gateway and history backend for driving the sync core in tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};

use guided_sync::{ConnectError, Connector, HistoryError, HistorySource, Link};
use guided_types::events::{AckStatus, ChatNotice, ChatPayload, GatewayCommand, GatewayEvent};
use guided_types::{Message, RoomId, UserId};

/// How the fake gateway answers published chat events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    #[default]
    Ok,
    Error,
    /// Park the ack until `release_held`.
    Hold,
    /// Never answer.
    Silent,
}

#[derive(Clone, Default)]
pub struct MemoryGateway {
    inner: Arc<GatewayInner>,
}

#[derive(Default)]
struct GatewayInner {
    connects: AtomicUsize,
    refuse: AtomicBool,
    connect_gate: Mutex<Option<Arc<Semaphore>>>,
    mode: Mutex<AckMode>,
    published: Mutex<Vec<ChatPayload>>,
    held: Mutex<Vec<u64>>,
    downlink: Mutex<Option<mpsc::UnboundedSender<GatewayEvent>>>,
}

impl GatewayInner {
    fn reply(&self, event: GatewayEvent) -> bool {
        match self.downlink.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&self, mode: AckMode) {
        *self.inner.mode.lock().unwrap() = mode;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Park connect attempts until `release_connections`.
    pub fn hold_connections(&self) {
        *self.inner.connect_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_connections(&self) {
        if let Some(gate) = self.inner.connect_gate.lock().unwrap().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<ChatPayload> {
        self.inner.published.lock().unwrap().clone()
    }

    /// Push a server frame down the current link.
    pub fn push(&self, event: GatewayEvent) -> bool {
        self.inner.reply(event)
    }

    pub fn notify_room(&self, room: &str) -> bool {
        self.push(GatewayEvent::Chat(ChatNotice {
            group: Some(RoomId::from(room)),
        }))
    }

    pub fn release_held(&self, status: AckStatus) {
        let held: Vec<u64> = self.inner.held.lock().unwrap().drain(..).collect();
        for ack in held {
            self.inner.reply(GatewayEvent::Ack { ack, status });
        }
    }

    /// Server side closes the link.
    pub fn hang_up(&self) {
        self.inner.downlink.lock().unwrap().take();
    }

    /// Whether a client is still reading the current link.
    pub fn is_linked(&self) -> bool {
        self.inner
            .downlink
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[async_trait]
impl Connector for MemoryGateway {
    async fn connect(&self) -> Result<Link, ConnectError> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(ConnectError::Unavailable("gateway refused".into()));
        }

        let gate = self.inner.connect_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<GatewayCommand>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<GatewayEvent>();
        *self.inner.downlink.lock().unwrap() = Some(in_tx);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(GatewayCommand::Chat { ack, payload }) = out_rx.recv().await {
                inner.published.lock().unwrap().push(payload);
                let mode = *inner.mode.lock().unwrap();
                match mode {
                    AckMode::Ok => {
                        inner.reply(GatewayEvent::Ack { ack, status: AckStatus::Ok });
                    }
                    AckMode::Error => {
                        inner.reply(GatewayEvent::Ack { ack, status: AckStatus::Error });
                    }
                    AckMode::Hold => inner.held.lock().unwrap().push(ack),
                    AckMode::Silent => {}
                }
            }
        });

        Ok(Link {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

/// History backend with per-room contents, failures and gates.
#[derive(Clone, Default)]
pub struct ScriptedHistory {
    inner: Arc<HistoryInner>,
}

#[derive(Default)]
struct HistoryInner {
    rooms: Mutex<HashMap<String, Vec<Message>>>,
    failing: Mutex<HashSet<String>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_room(&self, room: &str, messages: Vec<Message>) {
        self.inner.rooms.lock().unwrap().insert(room.to_string(), messages);
    }

    pub fn fail_room(&self, room: &str, failing: bool) {
        let mut set = self.inner.failing.lock().unwrap();
        if failing {
            set.insert(room.to_string());
        } else {
            set.remove(room);
        }
    }

    /// Park fetches for `room` until `release`.
    pub fn hold(&self, room: &str) {
        self.inner
            .gates
            .lock()
            .unwrap()
            .insert(room.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, room: &str) {
        if let Some(gate) = self.inner.gates.lock().unwrap().remove(room) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, room: &str) -> usize {
        self.calls().iter().filter(|r| r.as_str() == room).count()
    }
}

#[async_trait]
impl HistorySource for ScriptedHistory {
    async fn fetch(&self, room: &RoomId) -> Result<Vec<Message>, HistoryError> {
        self.inner.calls.lock().unwrap().push(room.to_string());

        let gate = self.inner.gates.lock().unwrap().get(room.as_str()).cloned();
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }

        if self.inner.failing.lock().unwrap().contains(room.as_str()) {
            return Err(HistoryError::Rejected("error".into()));
        }
        Ok(self
            .inner
            .rooms
            .lock()
            .unwrap()
            .get(room.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

pub fn msg(sender: &str, body: &str) -> Message {
    Message {
        sender: UserId::from(sender),
        sender_name: sender.to_string(),
        body: body.to_string(),
        group: None,
        channel: None,
        received_at: None,
    }
}

/// Let every spawned task run until the runtime is idle. With a paused clock
/// this advances time by only a few milliseconds.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

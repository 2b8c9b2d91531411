use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use guided_types::RoomId;
use guided_types::events::{AckStatus, ChatNotice, ChatPayload, GatewayCommand, GatewayEvent};

use crate::config::SyncConfig;
use crate::error::{ConnectError, PublishError};
use crate::transport::{Connector, Link};

/// Notices buffered per subscriber before it starts missing them.
const NOTICE_BUFFER: usize = 256;

/// Acks awaited on one link: ack id -> waiting publisher.
/// Dropping an entry resolves its publisher with `LinkClosed`.
type PendingAcks = Arc<Mutex<HashMap<u64, oneshot::Sender<AckStatus>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// What a subscription yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Notice(ChatNotice),
    /// The subscriber fell behind and this many notices were dropped.
    Missed(u64),
    /// The peer closed the live link. Not sent for `disconnect()`.
    LinkLost,
}

/// What travels on the fan-out channel.
#[derive(Debug, Clone)]
enum Feed {
    Notice(ChatNotice),
    LinkLost,
}

/// Receives every inbound chat notice, whatever room it targets.
pub struct Subscription {
    room: RoomId,
    rx: broadcast::Receiver<Feed>,
}

impl Subscription {
    /// The room this subscription was opened for.
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Next inbound item, or `None` once the connection manager is gone.
    pub async fn recv(&mut self) -> Option<Inbound> {
        match self.rx.recv().await {
            Ok(Feed::Notice(notice)) => Some(Inbound::Notice(notice)),
            Ok(Feed::LinkLost) => Some(Inbound::LinkLost),
            Err(broadcast::error::RecvError::Lagged(n)) => Some(Inbound::Missed(n)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

/// Owns the one gateway link shared by the whole client.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    connector: Arc<dyn Connector>,
    ack_timeout: Duration,
    connect_timeout: Duration,

    /// Fan-out of inbound notices and link loss to every subscription
    notices_tx: broadcast::Sender<Feed>,

    state_tx: watch::Sender<ConnectionState>,

    /// Held across a connect attempt so concurrent callers wait for it
    /// instead of opening a second link.
    connect_gate: Mutex<()>,
    /// Bumped by `disconnect`. An attempt that started under an older
    /// generation throws its link away.
    generation: AtomicU64,

    /// The live link, if any. Only ever locked briefly.
    link: Mutex<Option<ActiveLink>>,

    next_ack: AtomicU64,
}

struct ActiveLink {
    id: Uuid,
    outgoing: mpsc::UnboundedSender<GatewayCommand>,
    pending: PendingAcks,
    router: JoinHandle<()>,
}

impl ConnectionManager {
    pub fn new(connector: impl Connector + 'static, config: &SyncConfig) -> Self {
        Self::with_connector(Arc::new(connector), config)
    }

    pub fn with_connector(connector: Arc<dyn Connector>, config: &SyncConfig) -> Self {
        let (notices_tx, _) = broadcast::channel(NOTICE_BUFFER);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ConnectionInner {
                connector,
                ack_timeout: config.ack_timeout,
                connect_timeout: config.connect_timeout,
                notices_tx,
                state_tx,
                connect_gate: Mutex::new(()),
                generation: AtomicU64::new(0),
                link: Mutex::new(None),
                next_ack: AtomicU64::new(1),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Open the link unless one is already up.
    ///
    /// A `disconnect` while the attempt is running wins: the new link is
    /// dropped and the attempt fails with `ConnectError::Cancelled`.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let _gate = self.inner.connect_gate.lock().await;
        if self.inner.link.lock().await.is_some() {
            return Ok(());
        }

        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.inner.state_tx.send_replace(ConnectionState::Connecting);

        let link = match tokio::time::timeout(self.inner.connect_timeout, self.inner.connector.connect()).await {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                self.inner.state_tx.send_replace(ConnectionState::Disconnected);
                warn!("Gateway connect failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                self.inner.state_tx.send_replace(ConnectionState::Disconnected);
                warn!("Gateway connect timed out after {:?}", self.inner.connect_timeout);
                return Err(ConnectError::Timeout(self.inner.connect_timeout));
            }
        };

        let mut slot = self.inner.link.lock().await;
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            debug!("discarding gateway link opened after release");
            return Err(ConnectError::Cancelled);
        }

        let Link { outgoing, incoming } = link;
        let id = Uuid::new_v4();
        let pending: PendingAcks = Arc::new(Mutex::new(HashMap::new()));
        let router = tokio::spawn(route_inbound(
            Arc::downgrade(&self.inner),
            id,
            incoming,
            pending.clone(),
            self.inner.notices_tx.clone(),
        ));

        *slot = Some(ActiveLink {
            id,
            outgoing,
            pending,
            router,
        });
        self.inner.state_tx.send_replace(ConnectionState::Connected);
        info!("Gateway link {} connected", id);
        Ok(())
    }

    /// Start receiving inbound notices. No room filtering happens here.
    pub fn subscribe(&self, room: RoomId) -> Subscription {
        debug!("subscribing for room {}", room);
        Subscription {
            room,
            rx: self.inner.notices_tx.subscribe(),
        }
    }

    /// Publish a chat event and wait for its ack.
    ///
    /// Resolves exactly once. Transport trouble, a dropped link, an `error`
    /// ack and a missing ack all come back as `Err`.
    pub async fn publish(&self, payload: ChatPayload) -> Result<(), PublishError> {
        self.connect()
            .await
            .map_err(|e| PublishError::NotConnected(e.to_string()))?;

        let ack = self.inner.next_ack.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let pending = {
            let slot = self.inner.link.lock().await;
            let Some(link) = slot.as_ref() else {
                return Err(PublishError::LinkClosed);
            };
            link.pending.lock().await.insert(ack, tx);
            if link.outgoing.send(GatewayCommand::Chat { ack, payload }).is_err() {
                link.pending.lock().await.remove(&ack);
                return Err(PublishError::LinkClosed);
            }
            debug!("published chat event (ack {}) on link {}", ack, link.id);
            link.pending.clone()
        };

        match tokio::time::timeout(self.inner.ack_timeout, rx).await {
            Ok(Ok(AckStatus::Ok)) => Ok(()),
            Ok(Ok(AckStatus::Error)) => Err(PublishError::Rejected),
            Ok(Err(_)) => Err(PublishError::LinkClosed),
            Err(_) => {
                pending.lock().await.remove(&ack);
                warn!("No ack for chat event {} within {:?}", ack, self.inner.ack_timeout);
                Err(PublishError::AckTimeout(self.inner.ack_timeout))
            }
        }
    }

    /// Release the link. Publishers still waiting get `LinkClosed`, and an
    /// attempt still in progress is cancelled. A no-op when nothing is
    /// connected.
    pub async fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let taken = self.inner.link.lock().await.take();
        let Some(link) = taken else {
            self.inner.state_tx.send_if_modified(|state| {
                let changed = *state != ConnectionState::Disconnected;
                *state = ConnectionState::Disconnected;
                changed
            });
            return;
        };

        link.router.abort();
        link.pending.lock().await.clear();
        drop(link.outgoing);
        self.inner.state_tx.send_replace(ConnectionState::Disconnected);
        info!("Gateway link {} released", link.id);
    }
}

/// Per-link inbound loop: acks go to their publisher, notices to subscribers.
async fn route_inbound(
    inner: Weak<ConnectionInner>,
    link_id: Uuid,
    mut incoming: mpsc::UnboundedReceiver<GatewayEvent>,
    pending: PendingAcks,
    notices_tx: broadcast::Sender<Feed>,
) {
    while let Some(event) = incoming.recv().await {
        match event {
            GatewayEvent::Chat(notice) => {
                debug!("chat notice for room {:?}", notice.group);
                let _ = notices_tx.send(Feed::Notice(notice));
            }
            GatewayEvent::Ack { ack, status } => match pending.lock().await.remove(&ack) {
                Some(tx) => {
                    let _ = tx.send(status);
                }
                None => debug!("ack {} has no waiting publisher", ack),
            },
        }
    }

    pending.lock().await.clear();

    let Some(inner) = inner.upgrade() else {
        return;
    };

    // Only clear the slot if this link still owns it
    let mut slot = inner.link.lock().await;
    if slot.as_ref().is_some_and(|link| link.id == link_id) {
        *slot = None;
        inner.state_tx.send_replace(ConnectionState::Disconnected);
        warn!("Gateway link {} closed by peer", link_id);
        let _ = notices_tx.send(Feed::LinkLost);
    }
}

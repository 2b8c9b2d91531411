use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::{Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use guided_types::api::Handoff;
use guided_types::{Alignment, ChannelId, Message, RoomId, UserId};

use crate::config::SyncConfig;
use crate::connection::{ConnectionManager, ConnectionState, Inbound, Subscription};
use crate::error::{ConnectError, HistoryError, PublishError};
use crate::escalation::{EscalationMonitor, EscalationSignal};
use crate::history::HistoryLoader;
use crate::outgoing::{self, Outbox, SendOutcome};
use crate::reconciler::{Applied, FetchTicket, Reconciler};

/// Snapshot of everything a chat view draws.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatView {
    pub room: Option<RoomId>,
    pub channel: Option<ChannelId>,
    pub history: Vec<Message>,
    /// Text of the composer. Cleared once a send is acknowledged, kept when
    /// it fails.
    pub draft: String,
    pub sending: bool,
    pub loading: bool,
    pub connection: ConnectionState,
}

impl ChatView {
    /// History with each message's side of the conversation.
    pub fn entries<'a>(&'a self, me: &'a UserId) -> impl Iterator<Item = (Alignment, &'a Message)> + 'a {
        self.history.iter().map(move |m| (m.alignment_for(me), m))
    }
}

/// Things the front end reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The active room's history was replaced.
    HistoryUpdated { room: RoomId, count: usize },
    /// Recoverable failure the user should see.
    Notice(String),
    SendSucceeded { text: String },
    /// The text is still in the draft for a retry.
    SendFailed { text: String, error: PublishError },
    /// Idle escalation. Fired at most once per idle period.
    Escalated(EscalationSignal),
    /// User-requested hand-off to the AI view.
    Handoff(Handoff),
}

enum Command {
    SetRoom(Option<RoomId>),
    SetChannel(Option<ChannelId>),
    Send {
        text: String,
        reply: oneshot::Sender<SendOutcome>,
    },
    Refresh,
    HandOff(Option<String>),
}

enum Completion {
    Fetched {
        ticket: FetchTicket,
        result: Result<Vec<Message>, HistoryError>,
    },
    Sent {
        result: Result<(), PublishError>,
    },
    /// A connect attempt for the room visit `epoch` finished.
    Linked {
        epoch: u64,
        attempt: u32,
        result: Result<(), ConnectError>,
    },
}

/// Front-end side of a running session. Cheap to clone; the session ends
/// when every handle is dropped or [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<ChatView>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Select the active room, or none to tear the view down.
    pub fn set_active_room(&self, room: Option<RoomId>) {
        let _ = self.commands.send(Command::SetRoom(room));
    }

    pub fn set_channel(&self, channel: Option<ChannelId>) {
        let _ = self.commands.send(Command::SetChannel(channel));
    }

    /// Send `text` to the active room and channel. Resolves once the server
    /// acknowledges, or right away when the send is rejected.
    pub async fn send(&self, text: impl Into<String>) -> SendOutcome {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::Send {
            text: text.into(),
            reply,
        };
        if self.commands.send(cmd).is_err() {
            return SendOutcome::Failed(PublishError::LinkClosed);
        }
        rx.await
            .unwrap_or(SendOutcome::Failed(PublishError::LinkClosed))
    }

    /// Re-fetch the active room's history.
    pub fn refresh(&self) {
        let _ = self.commands.send(Command::Refresh);
    }

    /// Open the AI view, optionally seeded with a message.
    pub fn hand_off(&self, message: Option<String>) {
        let _ = self.commands.send(Command::HandOff(message));
    }

    pub fn view(&self) -> ChatView {
        self.view.borrow().clone()
    }

    pub fn watch_view(&self) -> watch::Receiver<ChatView> {
        self.view.clone()
    }

    /// Stop the session and release the connection.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// The sync core's event loop. All state lives in one task and every
/// input (commands, notices, fetch and send completions, idle ticks) is
/// handled to completion before the next one.
pub struct ChatSession {
    user: UserId,
    connection: ConnectionManager,
    history: HistoryLoader,
    config: SyncConfig,

    reconciler: Reconciler,
    outbox: Outbox,
    monitor: EscalationMonitor,
    channel: Option<ChannelId>,

    subscription: Option<Subscription>,
    /// Idle poll; only runs while a room is active
    ticker: Option<Interval>,
    tasks: JoinSet<Completion>,
    /// Connect attempt (or scheduled reconnect) for the current room
    connecting: Option<AbortHandle>,
    /// Bumped on every room switch
    link_epoch: u64,
    pending_reply: Option<oneshot::Sender<SendOutcome>>,

    events: mpsc::UnboundedSender<SessionEvent>,
    view: watch::Sender<ChatView>,
}

impl ChatSession {
    /// Start a session on the current tokio runtime.
    pub fn spawn(
        user: UserId,
        connection: ConnectionManager,
        history: HistoryLoader,
        config: &SyncConfig,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ChatView::default());
        let cancel = CancellationToken::new();

        let session = ChatSession {
            user,
            connection,
            history,
            config: config.clone(),
            reconciler: Reconciler::new(),
            outbox: Outbox::new(),
            monitor: EscalationMonitor::new(config.escalation),
            channel: None,
            subscription: None,
            ticker: None,
            tasks: JoinSet::new(),
            connecting: None,
            link_epoch: 0,
            pending_reply: None,
            events: events_tx,
            view: view_tx,
        };
        tokio::spawn(session.run(cmd_rx, cancel.clone()));

        let handle = SessionHandle {
            commands: cmd_tx,
            view: view_rx,
            cancel,
        };
        (handle, events_rx)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
        info!("chat session for {} started", self.user);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                inbound = next_inbound(&mut self.subscription) => self.handle_inbound(inbound),
                Some(joined) = self.tasks.join_next() => match joined {
                    Ok(done) => self.handle_completion(done),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => warn!("session task failed: {}", e),
                },
                _ = next_tick(&mut self.ticker) => self.check_idle(),
            }
            self.publish_view();
        }

        self.tasks.abort_all();
        self.connection.disconnect().await;
        info!("chat session for {} stopped", self.user);
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SetRoom(room) => self.switch_room(room).await,

            Command::SetChannel(channel) => {
                debug!("channel set to {:?}", channel);
                self.channel = channel;
            }

            Command::Send { text, reply } => {
                let prepared = self.outbox.prepare(
                    &text,
                    self.reconciler.active_room(),
                    self.channel.as_ref(),
                    &self.user,
                );
                match prepared {
                    Ok(payload) => {
                        self.pending_reply = Some(reply);
                        let connection = self.connection.clone();
                        self.tasks.spawn(async move {
                            let result = outgoing::deliver(&connection, payload).await;
                            Completion::Sent { result }
                        });
                    }
                    Err(rejected) => {
                        debug!("send rejected: {}", rejected);
                        let _ = reply.send(SendOutcome::Rejected(rejected));
                    }
                }
            }

            Command::Refresh => {
                if let Some(ticket) = self.reconciler.invalidate() {
                    self.spawn_fetch(ticket);
                }
            }

            Command::HandOff(message) => {
                info!("hand-off to AI requested");
                self.emit(SessionEvent::Handoff(Handoff { message }));
            }
        }
    }

    /// Tear down the old room's subscription and link, then bring up the
    /// new room's. History is requested right away; the link comes up in
    /// the background.
    async fn switch_room(&mut self, room: Option<RoomId>) {
        if room.as_ref() == self.reconciler.active_room() {
            return;
        }
        info!(
            "active room {:?} -> {:?}",
            self.reconciler.active_room().map(RoomId::as_str),
            room.as_ref().map(RoomId::as_str)
        );

        if let Some(attempt) = self.connecting.take() {
            attempt.abort();
        }
        self.link_epoch += 1;
        self.subscription = None;
        self.connection.disconnect().await;

        if let Some(ticket) = self.reconciler.set_active_room(room.clone()) {
            self.spawn_fetch(ticket);
        }

        match room {
            Some(room) => {
                self.subscription = Some(self.connection.subscribe(room));
                self.spawn_connect(0);
                if self.ticker.is_none() {
                    self.ticker = Some(self.monitor.ticker());
                }
            }
            None => {
                self.ticker = None;
                self.monitor.disarm();
            }
        }
    }

    fn handle_inbound(&mut self, inbound: Option<Inbound>) {
        let ticket = match inbound {
            Some(Inbound::Notice(notice)) => self.reconciler.accept(&notice),
            Some(Inbound::Missed(n)) => {
                warn!("missed {} room notices, re-fetching", n);
                self.reconciler.invalidate()
            }
            Some(Inbound::LinkLost) => {
                if self.reconciler.active_room().is_some() {
                    warn!("gateway link lost, reconnecting");
                    self.emit(SessionEvent::Notice("Error Connecting: connection lost".into()));
                    if let Some(attempt) = self.connecting.take() {
                        attempt.abort();
                    }
                    self.spawn_connect(1);
                }
                None
            }
            None => {
                self.subscription = None;
                None
            }
        };
        if let Some(ticket) = ticket {
            self.spawn_fetch(ticket);
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Fetched { ticket, result } => match self.reconciler.apply(&ticket, result) {
                Applied::Replaced => {
                    let count = self.reconciler.history().len();
                    self.emit(SessionEvent::HistoryUpdated {
                        room: ticket.room,
                        count,
                    });
                }
                Applied::Stale => {}
                Applied::Failed(e) => {
                    warn!("history fetch for {} failed: {}", ticket.room, e);
                    self.emit(SessionEvent::Notice(format!("Error Fetching Chats: {}", e)));
                }
            },

            Completion::Sent { result } => {
                let text = self.outbox.settle(&result).unwrap_or_default();
                let outcome = match result {
                    Ok(()) => {
                        self.monitor.record_send(Instant::now(), text.clone());
                        if let Some(ticket) = self.reconciler.invalidate() {
                            self.spawn_fetch(ticket);
                        }
                        self.emit(SessionEvent::SendSucceeded { text });
                        SendOutcome::Delivered
                    }
                    Err(error) => {
                        warn!("send failed: {}", error);
                        self.emit(SessionEvent::Notice(format!("Error Sending Message: {}", error)));
                        self.emit(SessionEvent::SendFailed {
                            text,
                            error: error.clone(),
                        });
                        SendOutcome::Failed(error)
                    }
                };
                if let Some(reply) = self.pending_reply.take() {
                    let _ = reply.send(outcome);
                }
            }

            Completion::Linked { epoch, attempt, result } => {
                if epoch != self.link_epoch {
                    return;
                }
                self.connecting = None;
                match result {
                    Ok(()) if attempt > 0 => {
                        info!("gateway link restored after {} attempt(s)", attempt);
                        // Notices sent while we were away are gone
                        if let Some(ticket) = self.reconciler.invalidate() {
                            self.spawn_fetch(ticket);
                        }
                    }
                    Ok(()) => {}
                    Err(e) => {
                        warn!("gateway connect attempt {} failed: {}", attempt, e);
                        if attempt == 0 {
                            self.emit(SessionEvent::Notice(format!("Error Connecting: {}", e)));
                        }
                        self.spawn_connect(attempt.saturating_add(1));
                    }
                }
            }
        }
    }

    fn check_idle(&mut self) {
        if let Some(signal) = self.monitor.check(Instant::now()) {
            info!("no activity for {:?}, escalating", self.monitor.config().idle_threshold());
            self.emit(SessionEvent::Escalated(signal));
        }
    }

    /// Connect in the background, after the backoff for `attempt`.
    fn spawn_connect(&mut self, attempt: u32) {
        let delay = self.config.reconnect_delay(attempt);
        let epoch = self.link_epoch;
        let connection = self.connection.clone();
        let handle = self.tasks.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = connection.connect().await;
            Completion::Linked { epoch, attempt, result }
        });
        self.connecting = Some(handle);
    }

    fn spawn_fetch(&mut self, ticket: FetchTicket) {
        let loader = self.history.clone();
        self.tasks.spawn(async move {
            let result = loader.fetch_history(Some(&ticket.room)).await;
            Completion::Fetched { ticket, result }
        });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn publish_view(&self) {
        let next = ChatView {
            room: self.reconciler.active_room().cloned(),
            channel: self.channel.clone(),
            history: self.reconciler.history().to_vec(),
            draft: self.outbox.draft().to_string(),
            sending: self.outbox.is_in_flight(),
            loading: self.reconciler.is_loading(),
            connection: self.connection.state(),
        };
        self.view.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

async fn next_inbound(subscription: &mut Option<Subscription>) -> Option<Inbound> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

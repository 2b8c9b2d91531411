//! Guided sync core.
//!
//! Keeps a chat view for one active room consistent with the backend:
//! - one shared gateway connection, lazily opened and released per room
//! - history re-fetched on every relevant event (invalidate-then-refetch)
//! - single-flight outgoing sends with explicit ack outcomes
//! - an idle monitor that escalates to the AI hand-off once per idle period

pub mod config;
pub mod connection;
pub mod error;
pub mod escalation;
pub mod history;
pub mod outgoing;
pub mod reconciler;
pub mod session;
pub mod transport;

pub use config::{EscalationConfig, SyncConfig};
pub use connection::{ConnectionManager, ConnectionState, Inbound, Subscription};
pub use error::{ConnectError, HistoryError, PublishError, SendRejected};
pub use escalation::{EscalationMonitor, EscalationSignal};
pub use history::{HistoryLoader, HistorySource, RestHistory};
pub use outgoing::{Outbox, SendOutcome};
pub use reconciler::{Applied, FetchTicket, Reconciler};
pub use session::{ChatSession, ChatView, SessionEvent, SessionHandle};
pub use transport::{Connector, Link, WsConnector};

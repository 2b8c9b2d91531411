use tracing::{debug, trace};

use guided_types::events::ChatNotice;
use guided_types::{Message, RoomId};

use crate::error::HistoryError;

/// A history fetch the reconciler asked for. The result is only applied if
/// the ticket is still current when it comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub room: RoomId,
    seq: u64,
}

impl FetchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// What happened to a fetch result.
#[derive(Debug)]
pub enum Applied {
    /// Displayed history was replaced wholesale.
    Replaced,
    /// The result belongs to another room or was overtaken by a newer one.
    Stale,
    /// The fetch failed; displayed history is untouched.
    Failed(HistoryError),
}

/// Holds the displayed history of the active room.
///
/// Inbound notices are never merged into the history. An accepted notice
/// only invalidates it, and the next fetch replaces it in full.
#[derive(Debug, Default)]
pub struct Reconciler {
    active: Option<RoomId>,
    history: Vec<Message>,
    next_seq: u64,
    /// First ticket issued for the current room
    room_floor: u64,
    /// Newest ticket whose result is on display
    applied: Option<u64>,
    /// Tickets for the current room not yet resolved
    outstanding: usize,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_room(&self) -> Option<&RoomId> {
        self.active.as_ref()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn is_loading(&self) -> bool {
        self.outstanding > 0
    }

    /// Switch rooms. Clears the display and asks for the new room's history.
    /// Re-selecting the current room changes nothing.
    pub fn set_active_room(&mut self, room: Option<RoomId>) -> Option<FetchTicket> {
        if room == self.active {
            return None;
        }

        self.active = room;
        self.history.clear();
        self.room_floor = self.next_seq;
        self.applied = None;
        self.outstanding = 0;
        self.issue()
    }

    /// Inbound notice. Only the active room's notices invalidate.
    pub fn accept(&mut self, notice: &ChatNotice) -> Option<FetchTicket> {
        match (&notice.group, &self.active) {
            (Some(group), Some(active)) if group == active => self.issue(),
            _ => {
                trace!("discarding notice for {:?} (active {:?})", notice.group, self.active);
                None
            }
        }
    }

    /// Local invalidation (own send acknowledged, manual refresh, missed
    /// notices).
    pub fn invalidate(&mut self) -> Option<FetchTicket> {
        self.issue()
    }

    /// Apply a fetch result under its ticket.
    pub fn apply(&mut self, ticket: &FetchTicket, result: Result<Vec<Message>, HistoryError>) -> Applied {
        let current = self.active.as_ref() == Some(&ticket.room) && ticket.seq >= self.room_floor;
        if !current {
            debug!("dropping history for {} (ticket {}): room no longer active", ticket.room, ticket.seq);
            return Applied::Stale;
        }

        self.outstanding = self.outstanding.saturating_sub(1);

        if self.applied.is_some_and(|seq| seq > ticket.seq) {
            debug!("dropping history ticket {}: newer result already shown", ticket.seq);
            return Applied::Stale;
        }

        match result {
            Ok(messages) => {
                self.history = messages;
                self.applied = Some(ticket.seq);
                Applied::Replaced
            }
            Err(e) => Applied::Failed(e),
        }
    }

    fn issue(&mut self) -> Option<FetchTicket> {
        let room = self.active.clone()?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.outstanding += 1;
        Some(FetchTicket { room, seq })
    }
}

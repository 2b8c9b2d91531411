//! Wire and domain types shared by the sync core and the terminal client.

pub mod api;
pub mod events;
pub mod models;

pub use models::{Alignment, ChannelId, Message, RoomId, UserId};

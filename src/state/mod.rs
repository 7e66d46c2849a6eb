//! Connection state: users, channels and memberships.

pub mod channel;
pub mod graph;
pub mod user;

pub use self::channel::{Channel, ListEntry, Membership, Topic, LIST_REQUEST_STALENESS};
pub use self::graph::EntityGraph;
pub use self::user::{AwayState, User, UserId};

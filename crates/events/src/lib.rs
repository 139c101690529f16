//! Event fabric: typed publish/subscribe with enumerated event kinds.
//!
//! # Invariants
//! - Subscribers are invoked in subscription order.
//! - Events carry complete values, never diffs; subscribers must tolerate replays.

mod bus;

pub use bus::{EventBus, Notification, Recorder, SubscriptionId};

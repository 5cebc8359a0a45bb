//! Resource change event infrastructure.
//!
//! A store emits a [`types::ResourceEvent`] through the [`broadcaster::EventBroadcaster`]
//! after every committed create/update/delete. The subscription engine is the
//! sole consumer: it subscribes to the broadcast channel and evaluates each
//! event against registered `Subscription` criteria.
//!
//! ```text
//! ┌────────────────────┐     commit()     ┌──────────────────────┐
//! │  EventedStorage /   │ ───────────────► │   EventBroadcaster    │
//! │  EventedTransaction │                  │ (broadcast channel)   │
//! └────────────────────┘                  └──────────┬────────────┘
//!                                                      │
//!                                                      ▼
//!                                          ┌────────────────────────┐
//!                                          │  subscription engine    │
//!                                          │  (one receiver per      │
//!                                          │   tenant)               │
//!                                          └────────────────────────┘
//! ```

pub mod broadcaster;
pub mod types;

pub use broadcaster::EventBroadcaster;
pub use types::{ResourceEvent, ResourceEventType};

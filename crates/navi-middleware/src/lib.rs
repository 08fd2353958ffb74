//! `navi-middleware` – event routing between sources, engine and display.
//!
//! Moves events around without caring what they mean.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};

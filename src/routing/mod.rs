//! Routing module
//!
//! The registry maps usernames to live connections; the router delivers
//! frames over it.
//!
//! # Delivery Rules
//!
//! - **Broadcast** goes to every registered user except the sender and any
//!   explicit exclusions. One recipient failing never stops the rest.
//! - **Unicast** goes to exactly one registered user, or reports that the
//!   recipient is not connected.
//!
//! # Example
//!
//! ```no_run
//! use chatrelay::protocol::Message;
//! use chatrelay::routing::{ConnectionRegistry, Router};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ConnectionRegistry::new());
//! let router = Router::new(registry);
//!
//! let frame = Message::InMessage {
//!     content: "hello".to_string(),
//!     sender: None,
//! }
//! .into_frame();
//! let report = router.broadcast(&frame, Some("alice"), &[]).unwrap();
//! assert!(report.is_complete());
//! ```

mod registry;
mod router;

pub use registry::ConnectionRegistry;
pub use router::{DeliveryReport, Router};

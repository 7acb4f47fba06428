//! Real-time Messaging Module
//!
//! The message bus every coordinator and spawner in the fleet shares.
//!
//! # Module Structure
//!
//! ```text
//! realtime/
//! ├── mod.rs          - Module exports and documentation
//! ├── broadcast.rs    - MessageBus trait and the in-process LocalBus
//! ├── subscription.rs - Subscription stream and teardown
//! └── subjects.rs     - Subject naming, validation and wildcard matching
//! ```
//!
//! # Channels
//!
//! Each document has two channels:
//! - `{prefix}.{doc}.requests` - clients publish Join/Leave/Update here.
//!   Coordinators consume it through the `coordinators` queue group; spawners
//!   watch `{prefix}.*.requests` in fan-out mode.
//! - `{prefix}.{doc}.responses` - coordinators publish counter-stamped
//!   messages here for every connected client.

/// MessageBus trait and in-process implementation
pub mod broadcast;

/// Subscription stream type
pub mod subscription;

/// Subject naming and matching
pub mod subjects;

pub use broadcast::{publish_message, LocalBus, MessageBus};
pub use subjects::Subjects;
pub use subscription::{BusMessage, Subscription};

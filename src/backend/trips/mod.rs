//! Trips Module
//!
//! The trip document model and everything the coordinator derives from it:
//! fractional place ordering, per-kind post-processing (routes, media URLs,
//! itinerary days) and the `DocumentHooks` implementation that wires them in.
//!
//! # Module Structure
//!
//! ```text
//! trips/
//! ├── mod.rs         - Module exports
//! ├── model.rs       - Trip, Lodging, ItineraryDay, Place, MediaItem
//! ├── fractional.rs  - Base-62 fractional indexing
//! ├── processors.rs  - One post-processor per OperationKind
//! └── hooks.rs       - TripHooks (DocumentHooks for trips)
//! ```

/// Trip document model
pub mod model;

/// Base-62 fractional indexing
pub mod fractional;

/// Operation-kind post-processors
pub mod processors;

/// Coordinator hooks for trip documents
pub mod hooks;

pub use hooks::TripHooks;
pub use model::{ItineraryDay, Lodging, MediaItem, Place, Trip};
pub use processors::PostProcessor;

//! Domain-specific message types for the rohrpost messaging layer.
//!
//! This module provides:
//! - **Event payloads** (`events`): Typed payloads carried by envelopes
//! - **Subject constants** (`subjects`): Canonical subject strings for routing

pub mod events;
pub mod subjects;

pub use events::*;

//! Shared types and models for the Warehouse Management Platform
//!
//! This crate contains the domain model shared between the backend and the
//! browser front end (via WASM): entities, lifecycle state machines, stock
//! arithmetic and the derived calculations the API exposes.

pub mod error;
pub mod models;
pub mod numbering;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use numbering::*;
pub use types::*;
pub use validation::*;

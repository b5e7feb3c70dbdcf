//! Request extractors shared by the handlers

pub mod actor;
pub mod body;

pub use actor::{Actor, ACTOR_HEADER};
pub use body::OptionalJson;

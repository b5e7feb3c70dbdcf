//! Domain models for the Warehouse Management Platform

#[macro_use]
mod lifecycle;

mod adjustment;
mod catalog;
mod customer;
mod invoice;
mod movement;
mod payment;
mod product;
mod sale;
mod sale_template;
mod transfer;
mod warehouse;

pub use adjustment::*;
pub use catalog::*;
pub use customer::*;
pub use invoice::*;
pub use lifecycle::Lifecycle;
pub use movement::*;
pub use payment::*;
pub use product::*;
pub use sale::*;
pub use sale_template::*;
pub use transfer::*;
pub use warehouse::*;

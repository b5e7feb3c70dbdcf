//! HTTP handlers, one module per resource

pub mod adjustment;
pub mod catalog;
pub mod customer;
pub mod health;
pub mod invoice;
pub mod payment;
pub mod product;
pub mod sale;
pub mod sale_template;
pub mod stock;
pub mod transfer;
pub mod warehouse;

pub use adjustment::*;
pub use catalog::*;
pub use customer::*;
pub use health::*;
pub use invoice::*;
pub use payment::*;
pub use product::*;
pub use sale::*;
pub use sale_template::*;
pub use stock::*;
pub use transfer::*;
pub use warehouse::*;

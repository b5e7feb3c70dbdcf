//! Business logic services for the Warehouse Management Platform

pub mod adjustment;
pub mod catalog;
pub mod customer;
pub mod invoice;
pub mod payment;
pub mod product;
pub mod sale;
pub mod sale_template;
pub mod sequence;
pub mod stock;
pub mod transfer;
pub mod warehouse;

pub use adjustment::AdjustmentService;
pub use catalog::{BrandService, CategoryService};
pub use customer::CustomerService;
pub use invoice::InvoiceService;
pub use payment::PaymentService;
pub use product::ProductService;
pub use sale::SaleService;
pub use sale_template::SaleTemplateService;
pub use stock::{StockLedger, StockService};
pub use transfer::TransferService;
pub use warehouse::{LocationService, WarehouseService};

/// `ILIKE` pattern for a free-text search, `None` when blank
pub(crate) fn search_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s))
}

//! Route definitions for the Warehouse Management Platform

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Master data
        .nest("/categories", category_routes())
        .nest("/brands", brand_routes())
        .nest("/warehouses", warehouse_routes())
        .nest("/locations", location_routes())
        .nest("/customers", customer_routes())
        .nest("/products", product_routes())
        // Stock ledger and documents
        .nest("/stock-movements", movement_routes())
        .nest("/stock-adjustments", adjustment_routes())
        .nest("/stock-transfers", transfer_routes())
        // Sales
        .nest("/sales", sale_routes())
        .nest("/sale-templates", sale_template_routes())
        .nest("/payments", payment_routes())
        .nest("/electronic-invoices", invoice_routes())
}

fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_categories).post(handlers::create_category))
        .route(
            "/:category_id",
            get(handlers::get_category)
                .put(handlers::update_category)
                .delete(handlers::delete_category),
        )
}

fn brand_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_brands).post(handlers::create_brand))
        .route(
            "/:brand_id",
            get(handlers::get_brand)
                .put(handlers::update_brand)
                .delete(handlers::delete_brand),
        )
}

fn warehouse_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_warehouses).post(handlers::create_warehouse))
        .route(
            "/:warehouse_id",
            get(handlers::get_warehouse)
                .put(handlers::update_warehouse)
                .delete(handlers::delete_warehouse),
        )
        .route("/:warehouse_id/set-main", post(handlers::set_main_warehouse))
}

fn location_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_locations).post(handlers::create_location))
        .route(
            "/:location_id",
            get(handlers::get_location)
                .put(handlers::update_location)
                .delete(handlers::delete_location),
        )
}

fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_customers).post(handlers::create_customer))
        .route(
            "/:customer_id",
            get(handlers::get_customer)
                .put(handlers::update_customer)
                .delete(handlers::delete_customer),
        )
}

fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_products).post(handlers::create_product))
        .route(
            "/:product_id",
            get(handlers::get_product)
                .put(handlers::update_product)
                .delete(handlers::delete_product),
        )
        .route("/:product_id/movements", get(handlers::list_product_movements))
        .route("/:product_id/stock", get(handlers::get_product_stock))
}

fn movement_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_movements).post(handlers::record_movement))
        .route("/:movement_id", get(handlers::get_movement))
}

fn adjustment_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_adjustments).post(handlers::create_adjustment))
        .route("/from-count", post(handlers::create_adjustment_from_count))
        .route("/current-stock", post(handlers::current_stock))
        .route(
            "/:adjustment_id",
            get(handlers::get_adjustment)
                .put(handlers::update_adjustment)
                .delete(handlers::delete_adjustment),
        )
        .route("/:adjustment_id/submit", post(handlers::submit_adjustment))
        .route("/:adjustment_id/approve", post(handlers::approve_adjustment))
        .route("/:adjustment_id/apply", post(handlers::apply_adjustment))
        .route("/:adjustment_id/cancel", post(handlers::cancel_adjustment))
}

fn transfer_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_transfers).post(handlers::create_transfer))
        .route(
            "/:transfer_id",
            get(handlers::get_transfer)
                .put(handlers::update_transfer)
                .delete(handlers::delete_transfer),
        )
        .route("/:transfer_id/approve", post(handlers::approve_transfer))
        .route("/:transfer_id/start", post(handlers::start_transfer))
        .route("/:transfer_id/complete", post(handlers::complete_transfer))
        .route("/:transfer_id/cancel", post(handlers::cancel_transfer))
}

fn sale_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_sales).post(handlers::create_sale))
        .route(
            "/:sale_id",
            get(handlers::get_sale)
                .put(handlers::update_sale)
                .delete(handlers::delete_sale),
        )
        .route("/:sale_id/complete", post(handlers::complete_sale))
        .route("/:sale_id/cancel", post(handlers::cancel_sale))
        .route("/:sale_id/payments", get(handlers::list_sale_payments))
        .route("/:sale_id/electronic-invoice", post(handlers::issue_invoice))
}

fn sale_template_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_sale_templates).post(handlers::create_sale_template),
        )
        .route("/most-used", get(handlers::most_used_sale_templates))
        .route(
            "/:template_id",
            get(handlers::get_sale_template)
                .put(handlers::update_sale_template)
                .delete(handlers::delete_sale_template),
        )
        .route("/:template_id/create-sale", post(handlers::create_sale_from_template))
        .route("/:template_id/toggle-active", post(handlers::toggle_sale_template))
        .route("/:template_id/duplicate", post(handlers::duplicate_sale_template))
}

fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_payments).post(handlers::create_payment))
        .route("/:payment_id", get(handlers::get_payment))
        .route("/:payment_id/complete", post(handlers::complete_payment))
        .route("/:payment_id/cancel", post(handlers::cancel_payment))
        .route("/:payment_id/fail", post(handlers::fail_payment))
}

fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_invoices))
        .route("/:invoice_id", get(handlers::get_invoice))
        .route("/:invoice_id/send", post(handlers::send_invoice))
        .route("/:invoice_id/accept", post(handlers::accept_invoice))
        .route("/:invoice_id/reject", post(handlers::reject_invoice))
        .route("/:invoice_id/cancel", post(handlers::cancel_invoice))
}

//! WebAssembly module for the Warehouse Management Platform
//!
//! Lets the browser front end compute the same figures the API stores:
//! - sale line amounts and payment status
//! - stock status against min/max levels
//! - adjustment deltas and document validation before submit

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    // Set up panic hook for better error messages in browser console
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    #[cfg(target_arch = "wasm32")]
    web_sys::console::log_1(&JsValue::from_str("warehouse-wasm initialized"));
}

fn decimal(field: &str, value: &str) -> Result<Decimal, JsValue> {
    Decimal::from_str(value.trim())
        .map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", field, e)))
}

fn date(field: &str, value: &str) -> Result<NaiveDate, JsValue> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", field, e)))
}

/// Amounts of a sale line as JSON (`subtotal`, `discount`, `tax`, `total`)
///
/// Money is passed as decimal strings so no precision is lost in JS numbers.
#[wasm_bindgen]
pub fn calculate_line_totals(
    quantity: i32,
    unit_price: &str,
    discount: &str,
    tax_rate: &str,
) -> Result<String, JsValue> {
    let totals = LineTotals::compute(
        quantity,
        decimal("unit_price", unit_price)?,
        decimal("discount", discount)?,
        decimal("tax_rate", tax_rate)?,
    )
    .map_err(|e| JsValue::from_str(&e.to_string()))?;
    serde_json::to_string(&totals).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Sale header amounts from a JSON array of line totals and an order discount
#[wasm_bindgen]
pub fn calculate_sale_totals(lines_json: &str, order_discount: &str) -> Result<String, JsValue> {
    let lines: Vec<LineTotals> = serde_json::from_str(lines_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid lines JSON: {}", e)))?;
    let totals = SaleTotals::compute(&lines, decimal("order_discount", order_discount)?);
    serde_json::to_string(&totals).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Payment status of a sale; `due_date` may be empty
#[wasm_bindgen]
pub fn classify_payment_status(
    total: &str,
    paid: &str,
    due_date: &str,
    today: &str,
) -> Result<String, JsValue> {
    let due = if due_date.trim().is_empty() {
        None
    } else {
        Some(date("due_date", due_date)?)
    };
    let status = PaymentStatus::classify(
        decimal("total", total)?,
        decimal("paid", paid)?,
        due,
        date("today", today)?,
    );
    Ok(status.to_string())
}

/// Stock status of a quantity; a negative `max_level` means no maximum
#[wasm_bindgen]
pub fn classify_stock_status(quantity: i32, min_level: i32, max_level: i32) -> String {
    let max = (max_level >= 0).then_some(max_level);
    StockStatus::classify(quantity, min_level, max).to_string()
}

/// Signed change an adjustment line will post
#[wasm_bindgen]
pub fn calculate_adjustment_delta(current: i32, counted: i32) -> i32 {
    adjustment_delta(current, counted)
}

/// One counted line of an adjustment being prepared in the browser
#[derive(Debug, Deserialize)]
struct CountedLine {
    current: i32,
    counted: i32,
    unit_cost: Decimal,
}

#[derive(Debug, Serialize)]
struct AdjustmentPreview {
    lines: Vec<LineAdjustment>,
    total_value_adjustment: Decimal,
}

fn preview_adjustment(lines_json: &str) -> Result<AdjustmentPreview, String> {
    let counted: Vec<CountedLine> =
        serde_json::from_str(lines_json).map_err(|e| format!("Invalid lines JSON: {}", e))?;
    let lines = counted
        .iter()
        .map(|l| LineAdjustment::compute(l.current, l.counted, l.unit_cost))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    let total_value_adjustment = lines.iter().map(|l| l.value_adjustment).sum();
    Ok(AdjustmentPreview {
        lines,
        total_value_adjustment,
    })
}

/// Quantity and value deltas of counted lines
/// (`[{"current":..,"counted":..,"unit_cost":".."}]`) plus their value total
#[wasm_bindgen]
pub fn calculate_adjustment_lines(lines_json: &str) -> Result<String, JsValue> {
    let preview = preview_adjustment(lines_json).map_err(|e| JsValue::from_str(&e))?;
    serde_json::to_string(&preview).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Codes of every stock movement type, for filter drop-downs
#[wasm_bindgen]
pub fn movement_type_codes() -> js_sys::Array {
    MovementType::ALL
        .iter()
        .map(|t| JsValue::from_str(t.as_str()))
        .collect()
}

/// Profit margin over cost, as a percentage string
#[wasm_bindgen]
pub fn calculate_profit_margin(unit_price: &str, cost_price: &str) -> Result<String, JsValue> {
    let margin = profit_margin(decimal("unit_price", unit_price)?, decimal("cost_price", cost_price)?);
    Ok(margin.to_string())
}

/// Validate a product SKU, returning the error message or an empty string
#[wasm_bindgen]
pub fn check_sku(sku: &str) -> String {
    validate_sku(sku).err().unwrap_or_default().to_string()
}

/// Validate a NIT including its check digit
#[wasm_bindgen]
pub fn check_nit(nit: &str) -> bool {
    validate_nit(nit).is_ok()
}

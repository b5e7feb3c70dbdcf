//! Human-readable document numbers
//!
//! Adjustments, sales and sale invoices are numbered per day
//! (`ADJ20240115` + 4-digit sequence), transfers per month
//! (`TR202401` + 4-digit sequence). The backend looks up the last number
//! issued for the current period and passes it to [`next_number`].

use chrono::NaiveDate;

use crate::error::{DomainError, DomainResult};

/// Kinds of numbered documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    StockAdjustment,
    StockTransfer,
    Sale,
    SaleInvoice,
}

impl DocumentKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::StockAdjustment => "ADJ",
            DocumentKind::StockTransfer => "TR",
            DocumentKind::Sale => "VTA",
            DocumentKind::SaleInvoice => "FAC",
        }
    }

    /// Prefix plus the period stamp shared by every number issued on `date`
    pub fn period_prefix(&self, date: NaiveDate) -> String {
        let stamp = match self {
            DocumentKind::StockTransfer => date.format("%Y%m"),
            _ => date.format("%Y%m%d"),
        };
        format!("{}{}", self.prefix(), stamp)
    }
}

/// Width of the trailing sequence in period-based numbers
const SEQUENCE_WIDTH: usize = 4;

/// Sequence that follows `last` (the highest number issued in the same period)
pub fn next_sequence(last: Option<&str>) -> u32 {
    last.and_then(|n| {
        let start = n.len().checked_sub(SEQUENCE_WIDTH)?;
        n.get(start..)?.parse::<u32>().ok()
    })
    .map(|seq| seq + 1)
    .unwrap_or(1)
}

/// Last sequence that still fits [`SEQUENCE_WIDTH`] digits
const MAX_SEQUENCE: u32 = 9999;

/// Build the number following `last` for a document issued on `date`
///
/// Numbers compare lexically within a period, so the sequence never grows
/// past its fixed width; the period is exhausted instead.
pub fn next_number(kind: DocumentKind, date: NaiveDate, last: Option<&str>) -> DomainResult<String> {
    let prefix = kind.period_prefix(date);
    let sequence = next_sequence(last);
    if sequence > MAX_SEQUENCE {
        return Err(DomainError::validation(
            "number",
            format!("No {} numbers left for period {}", kind.prefix(), prefix),
        ));
    }
    Ok(format!("{}{:0width$}", prefix, sequence, width = SEQUENCE_WIDTH))
}

/// Electronic invoice number: optional prefix plus an 8-digit consecutive
pub fn electronic_invoice_number(prefix: Option<&str>, consecutive: i64) -> String {
    format!("{}{:08}", prefix.unwrap_or(""), consecutive)
}

/// Warehouse code assigned when none is supplied (`WH001`, `WH002`, ...)
///
/// `highest` is the largest numeric suffix among existing `WH<digits>` codes.
pub fn warehouse_code(highest: Option<i64>) -> String {
    format!("WH{:03}", highest.unwrap_or(0) + 1)
}

//! Document number allocation
//!
//! Numbers are derived from the highest one already issued in the same
//! period. A transaction-scoped advisory lock on the period prefix keeps
//! two concurrent requests from reading the same maximum.

use chrono::NaiveDate;
use shared::DocumentKind;
use sqlx::PgConnection;

use crate::error::AppResult;

fn number_column(kind: DocumentKind) -> (&'static str, &'static str) {
    match kind {
        DocumentKind::StockAdjustment => ("stock_adjustments", "adjustment_number"),
        DocumentKind::StockTransfer => ("stock_transfers", "transfer_number"),
        DocumentKind::Sale => ("sales", "sale_number"),
        DocumentKind::SaleInvoice => ("sales", "invoice_number"),
    }
}

/// Allocate the next number of `kind` for `date`
///
/// Must run inside the transaction that inserts the document.
pub async fn next_number(
    conn: &mut PgConnection,
    kind: DocumentKind,
    date: NaiveDate,
) -> AppResult<String> {
    let prefix = kind.period_prefix(date);

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(&prefix)
        .execute(&mut *conn)
        .await?;

    let (table, column) = number_column(kind);
    let sql = format!(
        "SELECT MAX({column}) FROM {table} WHERE {column} LIKE $1 || '%'",
        column = column,
        table = table
    );
    let last: Option<String> = sqlx::query_scalar(&sql)
        .bind(&prefix)
        .fetch_one(&mut *conn)
        .await?;

    Ok(shared::next_number(kind, date, last.as_deref())?)
}

/// Next electronic invoice consecutive for `prefix`
pub async fn next_invoice_consecutive(
    conn: &mut PgConnection,
    prefix: Option<&str>,
) -> AppResult<i64> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext('electronic_invoice:' || COALESCE($1, '')))")
        .bind(prefix)
        .execute(&mut *conn)
        .await?;

    let last: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(MAX(consecutive_number), 0)::BIGINT
        FROM electronic_invoices
        WHERE prefix IS NOT DISTINCT FROM $1
        "#,
    )
    .bind(prefix)
    .fetch_one(&mut *conn)
    .await?;

    Ok(last + 1)
}

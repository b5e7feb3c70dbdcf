//! Electronic invoice service

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use shared::{
    DomainResult, ElectronicInvoice, InvoiceSettings, InvoiceStatus, PaginatedResponse,
    Pagination,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::customer::fetch_customer;
use super::sale::{load_sale, save_sale};
use super::sequence::next_invoice_consecutive;
use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub sale_id: Option<Uuid>,
}

/// Tax authority answer to a sent invoice
#[derive(Debug, Default, Deserialize)]
pub struct AuthorityResponse {
    pub response_code: Option<String>,
    pub response_message: Option<String>,
}

#[derive(Clone)]
pub struct InvoiceService {
    db: PgPool,
    config: Arc<Config>,
}

impl InvoiceService {
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    pub async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<ElectronicInvoice>> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM electronic_invoices
            WHERE ($1::invoice_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR sale_id = $2)
            "#,
        )
        .bind(filter.status)
        .bind(filter.sale_id)
        .fetch_one(&self.db)
        .await?;

        let invoices = sqlx::query_as::<_, ElectronicInvoice>(
            r#"
            SELECT * FROM electronic_invoices
            WHERE ($1::invoice_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR sale_id = $2)
            ORDER BY issue_date DESC, consecutive_number DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.status)
        .bind(filter.sale_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(invoices, pagination, total as u64))
    }

    pub async fn get_invoice(&self, invoice_id: Uuid) -> AppResult<ElectronicInvoice> {
        let mut conn = self.db.acquire().await?;
        load_invoice(&mut conn, invoice_id, false).await
    }

    /// Issue the electronic invoice of a completed sale
    ///
    /// Returns the sale's existing invoice when there is one; the flag is
    /// true only when a new invoice was created.
    pub async fn issue_invoice(&self, sale_id: Uuid) -> AppResult<(ElectronicInvoice, bool)> {
        let mut tx = self.db.begin().await?;
        let sale = load_sale(&mut tx, sale_id, true).await?;

        let existing = sqlx::query_as::<_, ElectronicInvoice>(
            "SELECT * FROM electronic_invoices WHERE sale_id = $1",
        )
        .bind(sale_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(invoice) = existing {
            return Ok((invoice, false));
        }

        let invoicing = &self.config.invoicing;
        if !sale.requires_electronic_invoice(invoicing.electronic_invoice_threshold) {
            return Err(AppError::validation(
                "sale_id",
                format!(
                    "Sale does not require an electronic invoice (threshold {})",
                    invoicing.electronic_invoice_threshold
                ),
            ));
        }

        let customer = match sale.customer_id {
            Some(customer_id) => Some(fetch_customer(&mut tx, customer_id).await?),
            None => None,
        };
        let consecutive = next_invoice_consecutive(&mut tx, invoicing.prefix.as_deref()).await?;
        let settings = InvoiceSettings {
            prefix: invoicing.prefix.as_deref(),
            technical_key: &invoicing.technical_key,
            environment: &invoicing.environment,
            currency: &self.config.sales.currency,
        };
        let draft = ElectronicInvoice::draft(
            &sale,
            customer.as_ref(),
            &invoicing.issuer,
            &settings,
            consecutive,
            Utc::now(),
        )?;

        let invoice = sqlx::query_as::<_, ElectronicInvoice>(
            r#"
            INSERT INTO electronic_invoices (
                id, sale_id, cufe, invoice_number, prefix, consecutive_number, issue_date,
                due_date, currency, issuer_nit, issuer_name, issuer_address, issuer_city,
                issuer_department, issuer_phone, issuer_email, customer_document_type,
                customer_document_number, customer_name, customer_address, customer_city,
                customer_phone, customer_email, subtotal, tax_amount, discount_amount,
                total_amount, status
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28
            )
            RETURNING *
            "#,
        )
        .bind(draft.id)
        .bind(draft.sale_id)
        .bind(&draft.cufe)
        .bind(&draft.invoice_number)
        .bind(&draft.prefix)
        .bind(draft.consecutive_number)
        .bind(draft.issue_date)
        .bind(draft.due_date)
        .bind(&draft.currency)
        .bind(&draft.issuer_nit)
        .bind(&draft.issuer_name)
        .bind(&draft.issuer_address)
        .bind(&draft.issuer_city)
        .bind(&draft.issuer_department)
        .bind(&draft.issuer_phone)
        .bind(&draft.issuer_email)
        .bind(&draft.customer_document_type)
        .bind(&draft.customer_document_number)
        .bind(&draft.customer_name)
        .bind(&draft.customer_address)
        .bind(&draft.customer_city)
        .bind(&draft.customer_phone)
        .bind(&draft.customer_email)
        .bind(draft.subtotal)
        .bind(draft.tax_amount)
        .bind(draft.discount_amount)
        .bind(draft.total_amount)
        .bind(draft.status)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let missing = invoice.missing_fields();
        if !missing.is_empty() {
            tracing::warn!(invoice_id = %invoice.id, missing = ?missing, "electronic invoice incomplete");
        }
        tracing::info!(
            invoice_id = %invoice.id,
            sale_id = %sale_id,
            invoice_number = %invoice.invoice_number,
            "electronic invoice issued"
        );
        Ok((invoice, true))
    }

    /// Mark the invoice sent and flag its sale
    pub async fn send_invoice(&self, invoice_id: Uuid) -> AppResult<ElectronicInvoice> {
        let mut tx = self.db.begin().await?;
        let sale_id = load_invoice(&mut tx, invoice_id, false).await?.sale_id;
        // sale before invoice, the order issue_invoice takes them in
        let mut sale = load_sale(&mut tx, sale_id, true).await?;
        let mut invoice = load_invoice(&mut tx, invoice_id, true).await?;

        let now = Utc::now();
        refuse_logged(invoice.send(now), invoice_id, "send")?;
        save_invoice(&mut tx, &invoice).await?;

        sale.electronic_invoice_sent = true;
        sale.electronic_invoice_sent_at = Some(now);
        save_sale(&mut tx, &sale).await?;
        tx.commit().await?;

        tracing::info!(invoice_id = %invoice_id, sale_id = %invoice.sale_id, "electronic invoice sent");
        Ok(invoice)
    }

    pub async fn accept_invoice(
        &self,
        invoice_id: Uuid,
        response: AuthorityResponse,
    ) -> AppResult<ElectronicInvoice> {
        self.change(invoice_id, "accept", |invoice| {
            invoice.accept(response.response_code, response.response_message, Utc::now())
        })
        .await
    }

    pub async fn reject_invoice(
        &self,
        invoice_id: Uuid,
        response: AuthorityResponse,
    ) -> AppResult<ElectronicInvoice> {
        self.change(invoice_id, "reject", |invoice| {
            invoice.reject(response.response_code, response.response_message)
        })
        .await
    }

    pub async fn cancel_invoice(&self, invoice_id: Uuid) -> AppResult<ElectronicInvoice> {
        self.change(invoice_id, "cancel", ElectronicInvoice::cancel).await
    }

    async fn change<F>(&self, invoice_id: Uuid, action: &str, apply: F) -> AppResult<ElectronicInvoice>
    where
        F: FnOnce(&mut ElectronicInvoice) -> DomainResult<()>,
    {
        let mut tx = self.db.begin().await?;
        let mut invoice = load_invoice(&mut tx, invoice_id, true).await?;
        refuse_logged(apply(&mut invoice), invoice_id, action)?;
        save_invoice(&mut tx, &invoice).await?;
        tx.commit().await?;

        tracing::info!(
            invoice_id = %invoice_id,
            status = %invoice.status,
            response_code = ?invoice.response_code,
            "electronic invoice {}",
            action
        );
        Ok(invoice)
    }
}

fn refuse_logged<T>(result: DomainResult<T>, invoice_id: Uuid, action: &str) -> AppResult<T> {
    result.map_err(|err| {
        tracing::warn!(invoice_id = %invoice_id, action, "electronic invoice transition refused: {}", err);
        AppError::from(err)
    })
}

async fn load_invoice(conn: &mut PgConnection, invoice_id: Uuid, lock: bool) -> AppResult<ElectronicInvoice> {
    let sql = if lock {
        "SELECT * FROM electronic_invoices WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM electronic_invoices WHERE id = $1"
    };
    sqlx::query_as::<_, ElectronicInvoice>(sql)
        .bind(invoice_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Electronic invoice".to_string()))
}

async fn save_invoice(conn: &mut PgConnection, invoice: &ElectronicInvoice) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE electronic_invoices
        SET status = $1, response_code = $2, response_message = $3,
            sent_at = $4, accepted_at = $5, updated_at = NOW()
        WHERE id = $6
        "#,
    )
    .bind(invoice.status)
    .bind(&invoice.response_code)
    .bind(&invoice.response_message)
    .bind(invoice.sent_at)
    .bind(invoice.accepted_at)
    .bind(invoice.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

//! Payment service
//!
//! Every payment change re-derives the owning sale's payment status from
//! the sum of its completed payments. The sale row is locked first so two
//! payments against the same sale cannot both pass the balance check.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    completed_total, ensure_payable, DomainError, DomainResult, Lifecycle, PaginatedResponse,
    Pagination, Payment, PaymentMethod, PaymentState, Sale, SaleStatus,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::sale::{fetch_payments, load_sale, save_sale};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default, Deserialize)]
pub struct PaymentFilter {
    pub sale_id: Option<Uuid>,
    pub status: Option<PaymentState>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentInput {
    pub sale_id: Uuid,
    /// Defaults to the sale's payment method
    pub payment_method: Option<PaymentMethod>,
    pub amount: Decimal,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    /// Record the payment as pending instead of completed
    #[serde(default)]
    pub pending: bool,
}

#[derive(Clone)]
pub struct PaymentService {
    db: PgPool,
}

impl PaymentService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_payments(
        &self,
        filter: &PaymentFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Payment>> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM payments
            WHERE ($1::uuid IS NULL OR sale_id = $1)
              AND ($2::payment_state IS NULL OR status = $2)
              AND ($3::payment_method IS NULL OR payment_method = $3)
            "#,
        )
        .bind(filter.sale_id)
        .bind(filter.status)
        .bind(filter.payment_method)
        .fetch_one(&self.db)
        .await?;

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE ($1::uuid IS NULL OR sale_id = $1)
              AND ($2::payment_state IS NULL OR status = $2)
              AND ($3::payment_method IS NULL OR payment_method = $3)
            ORDER BY payment_date DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.sale_id)
        .bind(filter.status)
        .bind(filter.payment_method)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(payments, pagination, total as u64))
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> AppResult<Payment> {
        let mut conn = self.db.acquire().await?;
        load_payment(&mut conn, payment_id, false).await
    }

    /// Record a payment against a sale that is not cancelled
    pub async fn create_payment(
        &self,
        input: CreatePaymentInput,
        actor: Option<Uuid>,
    ) -> AppResult<Payment> {
        let mut tx = self.db.begin().await?;
        let mut sale = load_sale(&mut tx, input.sale_id, true).await?;
        if sale.status == SaleStatus::Cancelled {
            return Err(DomainError::invalid_transition(SaleStatus::ENTITY, sale.status, "pay").into());
        }

        let payments = fetch_payments(&mut tx, sale.id).await?;
        let balance = sale.pending_balance(completed_total(&payments));
        if let Err(err) = ensure_payable(input.amount, balance) {
            tracing::warn!(sale_id = %sale.id, amount = %input.amount, "payment refused: {}", err);
            return Err(err.into());
        }

        let status = if input.pending {
            PaymentState::Pending
        } else {
            PaymentState::Completed
        };
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                sale_id, payment_method, amount, status, payment_date,
                reference_number, notes, created_by
            )
            VALUES ($1, $2, $3, $4, NOW(), $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(sale.id)
        .bind(input.payment_method.unwrap_or(sale.payment_method))
        .bind(input.amount)
        .bind(status)
        .bind(&input.reference_number)
        .bind(&input.notes)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await?;

        refresh_sale(&mut tx, &mut sale).await?;
        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            sale_id = %sale.id,
            amount = %payment.amount,
            status = %payment.status,
            payment_status = %sale.payment_status,
            "payment recorded"
        );
        Ok(payment)
    }

    /// Settle a pending payment
    pub async fn complete_payment(&self, payment_id: Uuid) -> AppResult<Payment> {
        self.change(payment_id, "complete", |payment, sale, payments| {
            payment.complete()?;
            ensure_payable(payment.amount, sale.pending_balance(completed_total(payments)))
        })
        .await
    }

    pub async fn cancel_payment(&self, payment_id: Uuid) -> AppResult<Payment> {
        self.change(payment_id, "cancel", |payment, _, _| payment.cancel()).await
    }

    pub async fn fail_payment(&self, payment_id: Uuid) -> AppResult<Payment> {
        self.change(payment_id, "fail", |payment, _, _| payment.fail()).await
    }

    /// Apply one status change under the sale and payment row locks
    async fn change<F>(&self, payment_id: Uuid, action: &str, apply: F) -> AppResult<Payment>
    where
        F: FnOnce(&mut Payment, &Sale, &[Payment]) -> DomainResult<()>,
    {
        let mut tx = self.db.begin().await?;
        let sale_id: Uuid = sqlx::query_scalar("SELECT sale_id FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment".to_string()))?;

        let mut sale = load_sale(&mut tx, sale_id, true).await?;
        let mut payment = load_payment(&mut tx, payment_id, true).await?;
        let payments = fetch_payments(&mut tx, sale_id).await?;

        if let Err(err) = apply(&mut payment, &sale, &payments) {
            tracing::warn!(payment_id = %payment_id, action, "payment transition refused: {}", err);
            return Err(err.into());
        }

        sqlx::query("UPDATE payments SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(payment.status)
            .bind(payment_id)
            .execute(&mut *tx)
            .await?;
        refresh_sale(&mut tx, &mut sale).await?;
        tx.commit().await?;

        tracing::info!(
            payment_id = %payment_id,
            sale_id = %sale_id,
            status = %payment.status,
            payment_status = %sale.payment_status,
            "payment {}",
            action
        );
        Ok(payment)
    }
}

async fn load_payment(conn: &mut PgConnection, payment_id: Uuid, lock: bool) -> AppResult<Payment> {
    let sql = if lock {
        "SELECT * FROM payments WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM payments WHERE id = $1"
    };
    sqlx::query_as::<_, Payment>(sql)
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))
}

/// Recompute and store the sale's payment status from its completed payments
async fn refresh_sale(conn: &mut PgConnection, sale: &mut Sale) -> AppResult<()> {
    let payments = fetch_payments(conn, sale.id).await?;
    sale.refresh_payment_status(completed_total(&payments), Utc::now().date_naive());
    save_sale(conn, sale).await?;
    sale.payments = payments;
    Ok(())
}

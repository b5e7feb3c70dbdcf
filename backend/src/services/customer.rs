//! Customer service

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    validate_document_type, validate_percentage, Customer, CustomerStats, CustomerType,
    PaginatedResponse, Pagination, PaymentTerms,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::search_pattern;
use crate::error::{AppError, AppResult};

/// Customer with purchase history and credit position
#[derive(Debug, Serialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: Customer,
    pub stats: CustomerStats,
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerFilter {
    pub search: Option<String>,
    pub customer_type: Option<CustomerType>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub tax_id: Option<String>,
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub customer_type: Option<CustomerType>,
    pub credit_limit: Option<Decimal>,
    pub payment_terms: Option<PaymentTerms>,
    pub discount_percentage: Option<Decimal>,
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCustomerInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub tax_id: Option<String>,
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub customer_type: Option<CustomerType>,
    pub credit_limit: Option<Decimal>,
    pub payment_terms: Option<PaymentTerms>,
    pub discount_percentage: Option<Decimal>,
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

fn check_commercial_terms(
    document_type: Option<&str>,
    credit_limit: Option<Decimal>,
    discount_percentage: Option<Decimal>,
) -> AppResult<()> {
    if let Some(code) = document_type {
        validate_document_type(code).map_err(|msg| AppError::validation("document_type", msg))?;
    }
    if let Some(limit) = credit_limit {
        if limit < Decimal::ZERO {
            return Err(AppError::validation("credit_limit", "Credit limit cannot be negative"));
        }
    }
    if let Some(discount) = discount_percentage {
        validate_percentage(discount).map_err(|msg| AppError::validation("discount_percentage", msg))?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct CustomerService {
    db: PgPool,
}

impl CustomerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_customers(
        &self,
        filter: &CustomerFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Customer>> {
        let pattern = search_pattern(filter.search.as_deref());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM customers
            WHERE ($1::text IS NULL OR name ILIKE $1 OR email ILIKE $1 OR document_number ILIKE $1 OR tax_id ILIKE $1)
              AND ($2::customer_type IS NULL OR customer_type = $2)
              AND ($3::boolean IS NULL OR is_active = $3)
            "#,
        )
        .bind(&pattern)
        .bind(filter.customer_type)
        .bind(filter.is_active)
        .fetch_one(&self.db)
        .await?;

        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT * FROM customers
            WHERE ($1::text IS NULL OR name ILIKE $1 OR email ILIKE $1 OR document_number ILIKE $1 OR tax_id ILIKE $1)
              AND ($2::customer_type IS NULL OR customer_type = $2)
              AND ($3::boolean IS NULL OR is_active = $3)
            ORDER BY name
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&pattern)
        .bind(filter.customer_type)
        .bind(filter.is_active)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(customers, pagination, total as u64))
    }

    /// Customer with sales count, totals, outstanding balance and available credit
    pub async fn get_customer(&self, customer_id: Uuid) -> AppResult<CustomerDetail> {
        let mut conn = self.db.acquire().await?;
        let customer = fetch_customer(&mut conn, customer_id).await?;

        let (sales_count, total_sales): (i64, Decimal) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(total_amount), 0)
            FROM sales WHERE customer_id = $1 AND status = 'completed'
            "#,
        )
        .bind(customer_id)
        .fetch_one(&mut *conn)
        .await?;
        let outstanding = outstanding_balance(&mut conn, customer_id).await?;

        let stats = CustomerStats::new(&customer, sales_count, total_sales, outstanding);
        Ok(CustomerDetail { customer, stats })
    }

    pub async fn create_customer(&self, input: CreateCustomerInput) -> AppResult<Customer> {
        input.validate()?;
        check_commercial_terms(
            input.document_type.as_deref(),
            input.credit_limit,
            input.discount_percentage,
        )?;

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (
                name, email, phone, address, city, state, postal_code, country, tax_id,
                document_type, document_number, customer_type, credit_limit, payment_terms,
                discount_percentage, is_active, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            "#,
        )
        .bind(input.name.trim())
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.postal_code)
        .bind(&input.country)
        .bind(&input.tax_id)
        .bind(&input.document_type)
        .bind(&input.document_number)
        .bind(input.customer_type.unwrap_or(CustomerType::Individual))
        .bind(input.credit_limit.unwrap_or(Decimal::ZERO))
        .bind(input.payment_terms.unwrap_or(PaymentTerms::Cash))
        .bind(input.discount_percentage.unwrap_or(Decimal::ZERO))
        .bind(input.is_active.unwrap_or(true))
        .bind(&input.notes)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(customer_id = %customer.id, "customer created");
        Ok(customer)
    }

    pub async fn update_customer(
        &self,
        customer_id: Uuid,
        input: UpdateCustomerInput,
    ) -> AppResult<Customer> {
        input.validate()?;
        check_commercial_terms(
            input.document_type.as_deref(),
            input.credit_limit,
            input.discount_percentage,
        )?;

        sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers
            SET name = COALESCE($1, name),
                email = COALESCE($2, email),
                phone = COALESCE($3, phone),
                address = COALESCE($4, address),
                city = COALESCE($5, city),
                state = COALESCE($6, state),
                postal_code = COALESCE($7, postal_code),
                country = COALESCE($8, country),
                tax_id = COALESCE($9, tax_id),
                document_type = COALESCE($10, document_type),
                document_number = COALESCE($11, document_number),
                customer_type = COALESCE($12, customer_type),
                credit_limit = COALESCE($13, credit_limit),
                payment_terms = COALESCE($14, payment_terms),
                discount_percentage = COALESCE($15, discount_percentage),
                is_active = COALESCE($16, is_active),
                notes = COALESCE($17, notes),
                updated_at = NOW()
            WHERE id = $18
            RETURNING *
            "#,
        )
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.postal_code)
        .bind(&input.country)
        .bind(&input.tax_id)
        .bind(&input.document_type)
        .bind(&input.document_number)
        .bind(input.customer_type)
        .bind(input.credit_limit)
        .bind(input.payment_terms)
        .bind(input.discount_percentage)
        .bind(input.is_active)
        .bind(&input.notes)
        .bind(customer_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Customer".to_string()))
    }

    /// Delete a customer with no sales
    pub async fn delete_customer(&self, customer_id: Uuid) -> AppResult<()> {
        let sales: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_one(&self.db)
            .await?;
        if sales > 0 {
            return Err(AppError::conflict(
                "customer",
                format!("Customer has {} sale(s)", sales),
            ));
        }

        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(customer_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Customer".to_string()));
        }

        tracing::info!(customer_id = %customer_id, "customer deleted");
        Ok(())
    }
}

pub(crate) async fn fetch_customer(conn: &mut PgConnection, customer_id: Uuid) -> AppResult<Customer> {
    sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Customer".to_string()))
}

/// Unpaid amount across a customer's completed sales
pub(crate) async fn outstanding_balance(conn: &mut PgConnection, customer_id: Uuid) -> AppResult<Decimal> {
    let outstanding: Decimal = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(GREATEST(s.total_amount - COALESCE(p.paid, 0), 0)), 0)
        FROM sales s
        LEFT JOIN (
            SELECT sale_id, SUM(amount) AS paid
            FROM payments WHERE status = 'completed'
            GROUP BY sale_id
        ) p ON p.sale_id = s.id
        WHERE s.customer_id = $1 AND s.status = 'completed'
        "#,
    )
    .bind(customer_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(outstanding)
}

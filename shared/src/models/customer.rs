//! Customer models

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customer that sales are billed to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub tax_id: Option<String>,
    /// Identity document type code (CC, NIT, CE, ...)
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub customer_type: CustomerType,
    pub credit_limit: Decimal,
    pub payment_terms: PaymentTerms,
    pub discount_percentage: Decimal,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Credit left after unpaid sales; cash customers get none
    pub fn available_credit(&self, outstanding: Decimal) -> Decimal {
        if self.payment_terms == PaymentTerms::Cash {
            return Decimal::ZERO;
        }
        (self.credit_limit - outstanding).max(Decimal::ZERO)
    }

    /// Whether a further `amount` fits within the credit limit
    pub fn has_available_credit(&self, outstanding: Decimal, amount: Decimal) -> bool {
        self.payment_terms == PaymentTerms::Cash || outstanding + amount <= self.credit_limit
    }

    /// Document number used on invoices, falling back to the tax id
    pub fn invoice_document(&self) -> Option<&str> {
        self.document_number
            .as_deref()
            .or(self.tax_id.as_deref())
            .filter(|d| !d.trim().is_empty())
    }
}

string_enum! {
    pub enum CustomerType as "customer_type" {
        Individual => "individual",
        Business => "business",
        Wholesale => "wholesale",
        Retail => "retail",
    }
}

string_enum! {
    /// Agreed payment terms, driving the due date of credit sales
    pub enum PaymentTerms as "payment_terms" {
        Cash => "cash",
        Credit => "credit",
        Net15 => "net_15",
        Net30 => "net_30",
        Net60 => "net_60",
    }
}

impl PaymentTerms {
    /// Days from invoice to due date; `credit` terms fall due on the invoice date
    pub fn due_days(&self) -> Option<i64> {
        match self {
            PaymentTerms::Net15 => Some(15),
            PaymentTerms::Net30 => Some(30),
            PaymentTerms::Net60 => Some(60),
            PaymentTerms::Credit => Some(0),
            PaymentTerms::Cash => None,
        }
    }

    pub fn due_date(&self, invoice_date: NaiveDate) -> Option<NaiveDate> {
        self.due_days().map(|days| invoice_date + Duration::days(days))
    }
}

/// Purchase history figures for a customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerStats {
    pub customer_id: Uuid,
    pub sales_count: i64,
    pub total_sales: Decimal,
    pub average_purchase: Decimal,
    pub outstanding: Decimal,
    pub available_credit: Decimal,
    pub is_frequent: bool,
    pub is_vip: bool,
}

/// Sales needed to count as a frequent customer
pub const FREQUENT_CUSTOMER_SALES: i64 = 10;

impl CustomerStats {
    pub fn new(customer: &Customer, sales_count: i64, total_sales: Decimal, outstanding: Decimal) -> Self {
        let average_purchase = if sales_count > 0 {
            (total_sales / Decimal::from(sales_count)).round_dp(2)
        } else {
            Decimal::ZERO
        };
        Self {
            customer_id: customer.id,
            sales_count,
            total_sales,
            average_purchase,
            outstanding,
            available_credit: customer.available_credit(outstanding),
            is_frequent: sales_count >= FREQUENT_CUSTOMER_SALES,
            is_vip: total_sales >= Decimal::from(10_000),
        }
    }
}

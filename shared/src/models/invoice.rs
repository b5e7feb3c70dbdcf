//! Electronic invoice models
//!
//! An electronic invoice snapshots a completed sale together with the
//! issuer and customer data required by the tax authority, and carries a
//! CUFE: the hex SHA-384 digest of the invoice's identifying fields.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha384};
use uuid::Uuid;

use super::customer::Customer;
use super::lifecycle::Lifecycle;
use super::sale::{Sale, SaleStatus};
use crate::error::{DomainError, DomainResult};
use crate::numbering::electronic_invoice_number;
use crate::validation::validate_document_type;

string_enum! {
    pub enum InvoiceStatus as "invoice_status" {
        Draft => "draft",
        Sent => "sent",
        Accepted => "accepted",
        Rejected => "rejected",
        Cancelled => "cancelled",
    }
}

impl Lifecycle for InvoiceStatus {
    const ENTITY: &'static str = "electronic invoice";

    fn successors(&self) -> &'static [Self] {
        use InvoiceStatus::*;
        match self {
            Draft => &[Sent, Cancelled],
            Sent => &[Accepted, Rejected],
            Rejected => &[Cancelled],
            Accepted | Cancelled => &[],
        }
    }
}

/// Issuing company data printed on every invoice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceIssuer {
    pub nit: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub department: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Numbering and CUFE parameters for one invoicing environment
#[derive(Debug, Clone)]
pub struct InvoiceSettings<'a> {
    pub prefix: Option<&'a str>,
    pub technical_key: &'a str,
    /// "1" production, "2" testing
    pub environment: &'a str,
    pub currency: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ElectronicInvoice {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub cufe: String,
    pub invoice_number: String,
    pub prefix: Option<String>,
    pub consecutive_number: i64,
    pub issue_date: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
    pub currency: String,
    pub issuer_nit: String,
    pub issuer_name: String,
    pub issuer_address: String,
    pub issuer_city: String,
    pub issuer_department: String,
    pub issuer_phone: Option<String>,
    pub issuer_email: Option<String>,
    pub customer_document_type: String,
    pub customer_document_number: String,
    pub customer_name: String,
    pub customer_address: Option<String>,
    pub customer_city: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub status: InvoiceStatus,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields hashed into the CUFE
#[derive(Debug, Clone)]
pub struct CufeInput<'a> {
    pub invoice_number: &'a str,
    pub issued_at: DateTime<Utc>,
    pub total: Decimal,
    pub tax: Decimal,
    pub customer_document: &'a str,
    pub technical_key: &'a str,
    pub environment: &'a str,
}

/// Hex SHA-384 over the concatenated invoice fields
///
/// VAT is tax code 01; the consumption (04) and municipal (03) taxes are
/// not charged and hash as 0.00.
pub fn cufe(input: &CufeInput<'_>) -> String {
    let fields = [
        input.invoice_number.to_string(),
        input.issued_at.format("%Y-%m-%d").to_string(),
        input.issued_at.format("%H:%M:%S").to_string(),
        format!("{:.2}", input.total),
        "01".to_string(),
        format!("{:.2}", input.tax),
        "04".to_string(),
        "0.00".to_string(),
        "03".to_string(),
        "0.00".to_string(),
        input.customer_document.to_string(),
        input.technical_key.to_string(),
        input.environment.to_string(),
    ];

    let mut hasher = Sha384::new();
    hasher.update(fields.concat().as_bytes());
    format!("{:x}", hasher.finalize())
}

impl ElectronicInvoice {
    /// Draft an invoice for a completed sale
    pub fn draft(
        sale: &Sale,
        customer: Option<&Customer>,
        issuer: &InvoiceIssuer,
        settings: &InvoiceSettings<'_>,
        consecutive_number: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if sale.status != SaleStatus::Completed {
            return Err(DomainError::validation(
                "sale_id",
                "Only completed sales can be invoiced",
            ));
        }

        let invoice_number = electronic_invoice_number(settings.prefix, consecutive_number);
        let issue_date = sale.sale_date.unwrap_or(now);
        let customer_document_number = customer
            .and_then(Customer::invoice_document)
            .unwrap_or_default()
            .to_string();

        let cufe = cufe(&CufeInput {
            invoice_number: &invoice_number,
            issued_at: issue_date,
            total: sale.total_amount,
            tax: sale.tax_amount,
            customer_document: &customer_document_number,
            technical_key: settings.technical_key,
            environment: settings.environment,
        });

        Ok(Self {
            id: Uuid::new_v4(),
            sale_id: sale.id,
            cufe,
            invoice_number,
            prefix: settings.prefix.map(str::to_string),
            consecutive_number,
            issue_date,
            due_date: sale.due_date,
            currency: settings.currency.to_string(),
            issuer_nit: issuer.nit.clone(),
            issuer_name: issuer.name.clone(),
            issuer_address: issuer.address.clone(),
            issuer_city: issuer.city.clone(),
            issuer_department: issuer.department.clone(),
            issuer_phone: issuer.phone.clone(),
            issuer_email: issuer.email.clone(),
            customer_document_type: customer
                .and_then(|c| c.document_type.clone())
                .unwrap_or_else(|| "CC".to_string()),
            customer_document_number,
            customer_name: customer.map(|c| c.name.clone()).unwrap_or_default(),
            customer_address: customer.and_then(|c| c.address.clone()),
            customer_city: customer.and_then(|c| c.city.clone()),
            customer_phone: customer.and_then(|c| c.phone.clone()),
            customer_email: customer.and_then(|c| c.email.clone()),
            subtotal: sale.subtotal,
            tax_amount: sale.tax_amount,
            discount_amount: sale.discount_amount,
            total_amount: sale.total_amount,
            status: InvoiceStatus::Draft,
            response_code: None,
            response_message: None,
            sent_at: None,
            accepted_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Every missing or invalid field required before sending
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut errors = Vec::new();
        let blank = |s: &str| s.trim().is_empty();

        if blank(&self.issuer_nit) {
            errors.push("issuer NIT is required");
        }
        if blank(&self.issuer_name) {
            errors.push("issuer name is required");
        }
        if blank(&self.issuer_address) {
            errors.push("issuer address is required");
        }
        if blank(&self.issuer_city) {
            errors.push("issuer city is required");
        }
        if blank(&self.issuer_department) {
            errors.push("issuer department is required");
        }
        if validate_document_type(&self.customer_document_type).is_err() {
            errors.push("customer document type is invalid");
        }
        if blank(&self.customer_document_number) {
            errors.push("customer document number is required");
        }
        if blank(&self.customer_name) {
            errors.push("customer name is required");
        }
        if self.subtotal <= Decimal::ZERO {
            errors.push("subtotal must be positive");
        }
        if self.total_amount <= Decimal::ZERO {
            errors.push("total must be positive");
        }
        errors
    }

    pub fn send(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        let next = self.status.transition(InvoiceStatus::Sent, "send")?;
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(DomainError::validation("invoice", missing.join("; ")));
        }
        self.status = next;
        self.sent_at = Some(now);
        Ok(())
    }

    pub fn accept(&mut self, code: Option<String>, message: Option<String>, now: DateTime<Utc>) -> DomainResult<()> {
        self.status = self.status.transition(InvoiceStatus::Accepted, "accept")?;
        self.accepted_at = Some(now);
        self.response_code = code;
        self.response_message = message;
        Ok(())
    }

    pub fn reject(&mut self, code: Option<String>, message: Option<String>) -> DomainResult<()> {
        self.status = self.status.transition(InvoiceStatus::Rejected, "reject")?;
        self.response_code = code;
        self.response_message = message;
        Ok(())
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        self.status = self.status.transition(InvoiceStatus::Cancelled, "cancel")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentMethod, PaymentStatus};
    use chrono::TimeZone;

    fn issuer() -> InvoiceIssuer {
        InvoiceIssuer {
            nit: "800197268-4".into(),
            name: "Distribuciones Andinas SAS".into(),
            address: "Carrera 7 # 71-21".into(),
            city: "Bogotá".into(),
            department: "Cundinamarca".into(),
            phone: None,
            email: None,
        }
    }

    fn settings() -> InvoiceSettings<'static> {
        InvoiceSettings {
            prefix: Some("SETP"),
            technical_key: "fc8eac422eba16e22ffd8c6f94b3f40a6e38162c",
            environment: "2",
            currency: "COP",
        }
    }

    fn completed_sale() -> Sale {
        Sale {
            id: Uuid::new_v4(),
            sale_number: "VTA202403010001".into(),
            customer_id: None,
            warehouse_id: Uuid::new_v4(),
            location_id: None,
            seller_id: None,
            status: SaleStatus::Completed,
            sale_date: Some(Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap()),
            payment_method: PaymentMethod::Cash,
            payment_status: PaymentStatus::Paid,
            subtotal: Decimal::from(1000),
            tax_amount: Decimal::from(190),
            order_discount: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            total_amount: Decimal::from(1190),
            invoice_number: None,
            invoice_date: None,
            due_date: None,
            requires_electronic_invoice: true,
            electronic_invoice_sent: false,
            electronic_invoice_sent_at: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            items: Vec::new(),
            payments: Vec::new(),
        }
    }

    #[test]
    fn test_cufe_is_sha384_hex() {
        let input = CufeInput {
            invoice_number: "SETP00000001",
            issued_at: Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap(),
            total: Decimal::from(1190),
            tax: Decimal::from(190),
            customer_document: "900373115",
            technical_key: "key",
            environment: "2",
        };
        let a = cufe(&input);
        assert_eq!(a.len(), 96);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, cufe(&input));

        let changed = CufeInput { total: Decimal::from(1191), ..input };
        assert_ne!(a, cufe(&changed));
    }

    #[test]
    fn test_draft_without_customer_cannot_be_sent() {
        let sale = completed_sale();
        let mut invoice =
            ElectronicInvoice::draft(&sale, None, &issuer(), &settings(), 42, Utc::now()).unwrap();
        assert_eq!(invoice.invoice_number, "SETP00000042");
        assert_eq!(invoice.status, InvoiceStatus::Draft);

        let err = invoice.send(Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
        assert_eq!(invoice.status, InvoiceStatus::Draft);
    }

    #[test]
    fn test_draft_requires_completed_sale() {
        let mut sale = completed_sale();
        sale.status = SaleStatus::Draft;
        assert!(ElectronicInvoice::draft(&sale, None, &issuer(), &settings(), 1, Utc::now()).is_err());
    }

    #[test]
    fn test_status_flow() {
        let mut invoice =
            ElectronicInvoice::draft(&completed_sale(), None, &issuer(), &settings(), 1, Utc::now()).unwrap();
        invoice.customer_document_number = "900373115".into();
        invoice.customer_name = "Ferretería La 14".into();

        invoice.send(Utc::now()).unwrap();
        assert!(invoice.cancel().is_err());
        invoice.reject(Some("99".into()), None).unwrap();
        invoice.cancel().unwrap();
        assert!(invoice.status.is_terminal());
    }
}

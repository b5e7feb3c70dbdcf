//! Electronic invoice and document numbering tests

use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    cufe, electronic_invoice_number, next_number, next_sequence, warehouse_code, CufeInput,
    Customer, CustomerType, DocumentKind, DomainError, ElectronicInvoice, InvoiceIssuer,
    InvoiceSettings, InvoiceStatus, PaymentMethod, PaymentStatus, PaymentTerms, Sale, SaleStatus,
};
use uuid::Uuid;

fn issuer() -> InvoiceIssuer {
    InvoiceIssuer {
        nit: "900123456-7".into(),
        name: "Distribuidora Central SAS".into(),
        address: "Calle 10 # 20-30".into(),
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

fn customer(document_number: Option<&str>) -> Customer {
    let now = Utc::now();
    Customer {
        id: Uuid::new_v4(),
        name: "Ana Gómez".into(),
        email: None,
        phone: None,
        address: None,
        city: None,
        state: None,
        postal_code: None,
        country: None,
        tax_id: None,
        document_type: Some("CC".into()),
        document_number: document_number.map(str::to_string),
        customer_type: CustomerType::Individual,
        credit_limit: Decimal::ZERO,
        payment_terms: PaymentTerms::Cash,
        discount_percentage: Decimal::ZERO,
        is_active: true,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

fn completed_sale(total: i64) -> Sale {
    let now = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
    Sale {
        id: Uuid::new_v4(),
        sale_number: "VTA202401150001".into(),
        customer_id: None,
        warehouse_id: Uuid::new_v4(),
        location_id: None,
        seller_id: None,
        status: SaleStatus::Completed,
        sale_date: Some(now),
        payment_method: PaymentMethod::Cash,
        payment_status: PaymentStatus::Pending,
        subtotal: Decimal::from(total),
        tax_amount: Decimal::ZERO,
        order_discount: Decimal::ZERO,
        discount_amount: Decimal::ZERO,
        total_amount: Decimal::from(total),
        invoice_number: None,
        invoice_date: None,
        due_date: None,
        requires_electronic_invoice: false,
        electronic_invoice_sent: false,
        electronic_invoice_sent_at: None,
        notes: None,
        created_at: now,
        updated_at: now,
        items: Vec::new(),
        payments: Vec::new(),
    }
}

fn draft(customer: Option<&Customer>) -> ElectronicInvoice {
    ElectronicInvoice::draft(&completed_sale(1_000_000), customer, &issuer(), &settings(), 1, Utc::now()).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_draft_snapshots_sale() {
        let c = customer(Some("1020304050"));
        let invoice = draft(Some(&c));
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.invoice_number, "SETP00000001");
        assert_eq!(invoice.total_amount, Decimal::from(1_000_000));
        assert_eq!(invoice.customer_document_number, "1020304050");
        assert_eq!(invoice.currency, "COP");
        assert!(invoice.missing_fields().is_empty());
    }

    #[test]
    fn test_cufe_is_sha384_hex() {
        let invoice = draft(Some(&customer(Some("1020304050"))));
        assert_eq!(invoice.cufe.len(), 96);
        assert!(invoice.cufe.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_cufe_depends_on_fields() {
        let issued_at = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        let input = CufeInput {
            invoice_number: "SETP00000001",
            issued_at,
            total: Decimal::new(11900, 2),
            tax: Decimal::new(1900, 2),
            customer_document: "1020304050",
            technical_key: "key",
            environment: "2",
        };
        let first = cufe(&input);
        assert_eq!(first, cufe(&input));

        let other = CufeInput {
            total: Decimal::new(11901, 2),
            ..input
        };
        assert_ne!(first, cufe(&other));
    }

    #[test]
    fn test_draft_requires_completed_sale() {
        let mut sale = completed_sale(100);
        sale.status = SaleStatus::Draft;
        assert!(ElectronicInvoice::draft(&sale, None, &issuer(), &settings(), 1, Utc::now()).is_err());
    }

    #[test]
    fn test_missing_fields_block_send() {
        let mut invoice = draft(None);
        let missing = invoice.missing_fields();
        assert!(missing.contains(&"customer document number is required"));
        assert!(missing.contains(&"customer name is required"));

        assert!(matches!(invoice.send(Utc::now()), Err(DomainError::Validation { .. })));
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert!(invoice.sent_at.is_none());
    }

    #[test]
    fn test_invalid_document_type_reported() {
        let mut invoice = draft(Some(&customer(Some("1020304050"))));
        invoice.customer_document_type = "XX".into();
        assert_eq!(invoice.missing_fields(), vec!["customer document type is invalid"]);
    }

    #[test]
    fn test_send_then_accept() {
        let mut invoice = draft(Some(&customer(Some("1020304050"))));
        invoice.send(Utc::now()).unwrap();
        assert!(invoice.sent_at.is_some());

        invoice.accept(Some("00".into()), Some("Procesado".into()), Utc::now()).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Accepted);
        assert_eq!(invoice.response_code.as_deref(), Some("00"));
        assert!(invoice.cancel().is_err());
    }

    #[test]
    fn test_rejected_invoice_can_be_cancelled() {
        let mut invoice = draft(Some(&customer(Some("1020304050"))));
        assert!(invoice.accept(None, None, Utc::now()).is_err());
        invoice.send(Utc::now()).unwrap();
        invoice.reject(Some("99".into()), None).unwrap();
        invoice.cancel().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Cancelled);
    }

    #[test]
    fn test_document_numbers() {
        let day = date(2024, 1, 15);
        assert_eq!(
            next_number(DocumentKind::StockAdjustment, day, None).unwrap(),
            "ADJ202401150001"
        );
        assert_eq!(
            next_number(DocumentKind::Sale, day, Some("VTA202401150041")).unwrap(),
            "VTA202401150042"
        );
        assert_eq!(
            next_number(DocumentKind::SaleInvoice, day, None).unwrap(),
            "FAC202401150001"
        );
        assert_eq!(
            next_number(DocumentKind::StockTransfer, day, Some("TR2024010009")).unwrap(),
            "TR2024010010"
        );
    }

    /// A five-digit sequence would sort below `…9999` and repeat forever
    #[test]
    fn test_day_refuses_a_ten_thousandth_number() {
        let day = date(2024, 1, 15);
        let err = next_number(DocumentKind::Sale, day, Some("VTA202401159999")).unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
        assert!(next_number(DocumentKind::StockTransfer, day, Some("TR2024019999")).is_err());
    }

    #[test]
    fn test_invoice_and_warehouse_codes() {
        assert_eq!(electronic_invoice_number(None, 42), "00000042");
        assert_eq!(electronic_invoice_number(Some("FE"), 7), "FE00000007");
        assert_eq!(warehouse_code(None), "WH001");
        assert_eq!(warehouse_code(Some(11)), "WH012");
    }

    /// Codes follow the highest existing suffix, not the row count, so a
    /// deleted warehouse never frees a code that is still taken
    #[test]
    fn test_warehouse_code_after_deletion() {
        // WH001 deleted, WH002 remains: one row, highest suffix 2
        assert_eq!(warehouse_code(Some(2)), "WH003");
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The sequence after `last` is always one more than its suffix
        #[test]
        fn prop_sequence_increments(seq in 1..9_999u32) {
            let last = format!("ADJ20240115{:04}", seq);
            prop_assert_eq!(next_sequence(Some(&last)), seq + 1);
        }

        /// Numbers of one period share the prefix and keep their order
        #[test]
        fn prop_numbers_sort_in_issue_order(seq in 1..9_998u32) {
            let day = date(2024, 1, 15);
            let last = format!("VTA20240115{:04}", seq);
            let next = next_number(DocumentKind::Sale, day, Some(&last)).unwrap();
            prop_assert!(next.starts_with("VTA20240115"));
            prop_assert!(next > last);
        }

        #[test]
        fn prop_cufe_always_96_hex(total in 0..100_000_000i64, doc in "[0-9]{6,10}") {
            let digest = cufe(&CufeInput {
                invoice_number: "SETP00000001",
                issued_at: Utc::now(),
                total: Decimal::new(total, 2),
                tax: Decimal::ZERO,
                customer_document: &doc,
                technical_key: "key",
                environment: "1",
            });
            prop_assert_eq!(digest.len(), 96);
            prop_assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}

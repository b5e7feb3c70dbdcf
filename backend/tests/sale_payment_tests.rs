//! Sale and payment tests
//!
//! - line and header totals, rounded to cents
//! - completion posts one negative `sale` movement per line, cancellation
//!   of a completed sale returns the stock
//! - payment status is derived from completed payments and the due date

use std::collections::HashMap;

use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    check_availability, completed_total, ensure_payable, validate_non_negative_amount, DomainError,
    LineTotals, MovementType, Payment, PaymentMethod, PaymentState, PaymentStatus, PaymentTerms,
    Sale, SaleItem, SaleStatus, SaleTotals,
};
use uuid::Uuid;

fn sale_item(sale_id: Uuid, product_id: Uuid, quantity: i32, price: Decimal) -> SaleItem {
    let rate = Decimal::from(19);
    let line = LineTotals::compute(quantity, price, Decimal::ZERO, rate).unwrap();
    SaleItem {
        id: Uuid::new_v4(),
        sale_id,
        product_id,
        quantity,
        unit_price: price,
        discount_amount: line.discount,
        tax_rate: rate,
        subtotal: line.subtotal,
        tax_amount: line.tax,
        total_amount: line.total,
    }
}

fn sale(method: PaymentMethod, lines: &[(Uuid, i32, Decimal)]) -> Sale {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let mut sale = Sale {
        id,
        sale_number: "VTA202401150001".into(),
        customer_id: Some(Uuid::new_v4()),
        warehouse_id: Uuid::new_v4(),
        location_id: None,
        seller_id: None,
        status: SaleStatus::Draft,
        sale_date: None,
        payment_method: method,
        payment_status: PaymentStatus::Pending,
        subtotal: Decimal::ZERO,
        tax_amount: Decimal::ZERO,
        order_discount: Decimal::ZERO,
        discount_amount: Decimal::ZERO,
        total_amount: Decimal::ZERO,
        invoice_number: None,
        invoice_date: None,
        due_date: None,
        requires_electronic_invoice: false,
        electronic_invoice_sent: false,
        electronic_invoice_sent_at: None,
        notes: None,
        created_at: now,
        updated_at: now,
        items: lines
            .iter()
            .map(|(product, qty, price)| sale_item(id, *product, *qty, *price))
            .collect(),
        payments: Vec::new(),
    };
    sale.recalculate();
    sale
}

fn payment(sale_id: Uuid, amount: Decimal, status: PaymentState) -> Payment {
    let now = Utc::now();
    Payment {
        id: Uuid::new_v4(),
        sale_id,
        payment_method: PaymentMethod::Cash,
        amount,
        status,
        payment_date: now,
        reference_number: None,
        notes: None,
        created_by: None,
        created_at: now,
        updated_at: now,
    }
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
    fn test_line_totals() {
        // 3 × 12.50 = 37.50, minus 2.50 discount, 19% tax on 35.00
        let line =
            LineTotals::compute(3, Decimal::new(1250, 2), Decimal::new(250, 2), Decimal::from(19)).unwrap();
        assert_eq!(line.subtotal, Decimal::new(3750, 2));
        assert_eq!(line.discount, Decimal::new(250, 2));
        assert_eq!(line.tax, Decimal::new(665, 2));
        assert_eq!(line.total, Decimal::new(4165, 2));
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        // 0.25 × 10% = 0.025 → 0.03
        let line = LineTotals::compute(1, Decimal::new(25, 2), Decimal::ZERO, Decimal::from(10)).unwrap();
        assert_eq!(line.tax, Decimal::new(3, 2));
    }

    #[test]
    fn test_header_totals_with_order_discount() {
        let a = LineTotals::compute(2, Decimal::from(100), Decimal::ZERO, Decimal::from(19)).unwrap();
        let b = LineTotals::compute(1, Decimal::from(50), Decimal::from(10), Decimal::ZERO).unwrap();
        let totals = SaleTotals::compute(&[a, b], Decimal::from(5));

        assert_eq!(totals.subtotal, Decimal::from(250));
        assert_eq!(totals.discount, Decimal::from(15));
        assert_eq!(totals.tax, Decimal::from(38));
        assert_eq!(totals.total, Decimal::from(273));
    }

    #[test]
    fn test_price_beyond_money_column_is_refused() {
        let price = Decimal::from_i128_with_scale(79_228_162_514_264_337_593_543_950, 0);
        let err = LineTotals::compute(3, price, Decimal::ZERO, Decimal::from(19)).unwrap_err();
        assert!(matches!(err, DomainError::Validation { ref field, .. } if field == "unit_price"));
        assert!(validate_non_negative_amount(price).is_err());
    }

    #[test]
    fn test_complete_posts_one_sale_movement_per_line() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut s = sale(PaymentMethod::Cash, &[(a, 2, Decimal::from(10)), (b, 5, Decimal::from(3))]);

        let plan = s.complete(None, None, None, Utc::now()).unwrap();
        assert_eq!(s.status, SaleStatus::Completed);
        assert!(s.sale_date.is_some());
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|m| m.movement_type == MovementType::Sale));
        assert_eq!(plan[0].quantity_delta, -2);
        assert_eq!(plan[1].quantity_delta, -5);
        // cash sales carry no invoice number or due date
        assert!(s.invoice_number.is_none());
        assert!(s.due_date.is_none());
    }

    #[test]
    fn test_credit_sale_gets_invoice_and_due_date() {
        let mut s = sale(PaymentMethod::Credit, &[(Uuid::new_v4(), 1, Decimal::from(100))]);
        assert!(s.needs_invoice_number());

        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        s.complete(Some("FAC202401150001".into()), Some(PaymentTerms::Net30), None, now)
            .unwrap();
        assert_eq!(s.invoice_number.as_deref(), Some("FAC202401150001"));
        assert_eq!(s.invoice_date, Some(date(2024, 1, 15)));
        assert_eq!(s.due_date, Some(date(2024, 2, 14)));
    }

    #[test]
    fn test_due_dates_from_terms() {
        let invoiced = date(2024, 1, 31);
        assert_eq!(PaymentTerms::Net15.due_date(invoiced), Some(date(2024, 2, 15)));
        assert_eq!(PaymentTerms::Net60.due_date(invoiced), Some(date(2024, 3, 31)));
        assert_eq!(PaymentTerms::Cash.due_date(invoiced), None);
        assert_eq!(PaymentTerms::Credit.due_date(invoiced), Some(invoiced));
    }

    /// Credit terms make the sale due on its invoice date, so it turns
    /// overdue the next day
    #[test]
    fn test_credit_terms_sale_becomes_overdue() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let mut s = sale(PaymentMethod::Credit, &[(Uuid::new_v4(), 1, Decimal::from(100))]);
        s.complete(Some("FAC202403010001".into()), Some(PaymentTerms::Credit), None, now)
            .unwrap();
        assert_eq!(s.due_date, Some(date(2024, 3, 1)));
        assert_eq!(s.payment_status_on(date(2024, 3, 1)), PaymentStatus::Pending);
        assert_eq!(s.payment_status_on(date(2024, 3, 2)), PaymentStatus::Overdue);
    }

    /// The stored status is never rewritten after the due date passes;
    /// reads report the sale as overdue anyway
    #[test]
    fn test_untouched_sale_reads_as_overdue() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let mut s = sale(PaymentMethod::Credit, &[(Uuid::new_v4(), 2, Decimal::from(50))]);
        s.complete(Some("FAC202401150001".into()), Some(PaymentTerms::Net30), None, now)
            .unwrap();
        assert_eq!(s.payment_status, PaymentStatus::Pending);

        assert_eq!(s.payment_status_on(date(2024, 2, 14)), PaymentStatus::Pending);
        assert_eq!(s.payment_status_on(date(2024, 2, 15)), PaymentStatus::Overdue);

        s.payment_status = PaymentStatus::Partial;
        assert_eq!(s.payment_status_on(date(2024, 3, 1)), PaymentStatus::Overdue);
        s.payment_status = PaymentStatus::Paid;
        assert_eq!(s.payment_status_on(date(2024, 3, 1)), PaymentStatus::Paid);

        // A cancelled sale keeps its stored status
        s.payment_status = PaymentStatus::Pending;
        s.cancel(None).unwrap();
        assert_eq!(s.payment_status_on(date(2024, 3, 1)), PaymentStatus::Pending);
    }

    #[test]
    fn test_empty_sale_cannot_complete() {
        let mut s = sale(PaymentMethod::Cash, &[]);
        assert!(matches!(
            s.complete(None, None, None, Utc::now()),
            Err(DomainError::Validation { .. })
        ));
        assert_eq!(s.status, SaleStatus::Draft);
    }

    /// A line exceeding warehouse stock blocks completion before any posting
    #[test]
    fn test_sale_exceeding_stock_is_refused() {
        let product = Uuid::new_v4();
        let s = sale(PaymentMethod::Cash, &[(product, 4, Decimal::ONE), (product, 3, Decimal::ONE)]);
        let levels: HashMap<Uuid, i32> = [(product, 6)].into_iter().collect();

        let err = check_availability(&s.stock_requirements(), &levels).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                product_id: product,
                available: 6,
                requested: 7,
            }
        );
    }

    #[test]
    fn test_cancel_completed_sale_returns_stock() {
        let product = Uuid::new_v4();
        let mut s = sale(PaymentMethod::Cash, &[(product, 3, Decimal::ONE)]);
        s.complete(None, None, None, Utc::now()).unwrap();

        let plan = s.cancel(None).unwrap();
        assert_eq!(s.status, SaleStatus::Cancelled);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].movement_type, MovementType::Return);
        assert_eq!(plan[0].quantity_delta, 3);
    }

    #[test]
    fn test_cancel_draft_posts_nothing() {
        let mut s = sale(PaymentMethod::Cash, &[(Uuid::new_v4(), 3, Decimal::ONE)]);
        assert!(s.cancel(None).unwrap().is_empty());
        assert!(s.cancel(None).is_err());
    }

    #[test]
    fn test_only_drafts_are_editable() {
        let mut s = sale(PaymentMethod::Cash, &[(Uuid::new_v4(), 1, Decimal::ONE)]);
        assert!(s.ensure_editable().is_ok());
        s.complete(None, None, None, Utc::now()).unwrap();
        assert!(s.ensure_editable().is_err());
    }

    #[test]
    fn test_payment_status_flow() {
        let mut s = sale(PaymentMethod::Cash, &[(Uuid::new_v4(), 1, Decimal::from(100))]);
        let today = date(2024, 1, 15);
        assert_eq!(s.total_amount, Decimal::from(119));

        let mut payments = vec![payment(s.id, Decimal::from(50), PaymentState::Completed)];
        payments.push(payment(s.id, Decimal::from(69), PaymentState::Pending));
        s.refresh_payment_status(completed_total(&payments), today);
        assert_eq!(s.payment_status, PaymentStatus::Partial);
        assert_eq!(s.pending_balance(completed_total(&payments)), Decimal::from(69));

        payments[1].complete().unwrap();
        s.refresh_payment_status(completed_total(&payments), today);
        assert_eq!(s.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn test_overdue_when_unpaid_past_due() {
        let today = date(2024, 3, 1);
        let due = Some(date(2024, 2, 14));
        let total = Decimal::from(100);
        assert_eq!(PaymentStatus::classify(total, Decimal::ZERO, due, today), PaymentStatus::Overdue);
        assert_eq!(PaymentStatus::classify(total, Decimal::from(40), due, today), PaymentStatus::Overdue);
        assert_eq!(PaymentStatus::classify(total, total, due, today), PaymentStatus::Paid);
    }

    #[test]
    fn test_payment_bounds() {
        let balance = Decimal::from(69);
        assert!(ensure_payable(Decimal::from(69), balance).is_ok());
        assert!(ensure_payable(Decimal::from(70), balance).is_err());
        assert!(ensure_payable(Decimal::ZERO, balance).is_err());
        assert!(ensure_payable(Decimal::from(-5), balance).is_err());
    }

    #[test]
    fn test_payment_lifecycle() {
        let mut p = payment(Uuid::new_v4(), Decimal::ONE, PaymentState::Pending);
        p.fail().unwrap();
        assert!(p.complete().is_err());
        p.cancel().unwrap();
        assert_eq!(p.status, PaymentState::Cancelled);

        let mut done = payment(Uuid::new_v4(), Decimal::ONE, PaymentState::Completed);
        assert!(done.cancel().is_err());
    }

    #[test]
    fn test_electronic_invoice_threshold() {
        let mut s = sale(PaymentMethod::Cash, &[(Uuid::new_v4(), 1, Decimal::from(100))]);
        assert!(!s.requires_electronic_invoice(Decimal::from(500)));
        assert!(s.requires_electronic_invoice(Decimal::from(119)));
        s.requires_electronic_invoice = true;
        assert!(s.requires_electronic_invoice(Decimal::from(500)));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn cents() -> impl Strategy<Value = Decimal> {
        (0..1_000_000i64).prop_map(|c| Decimal::new(c, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The header total equals the sum of line totals minus the order discount
        #[test]
        fn prop_header_matches_lines(
            lines in prop::collection::vec((1..50i32, cents(), 0..=19u32), 1..8),
            order_discount in (0..1_000i64).prop_map(|c| Decimal::new(c, 2)),
        ) {
            let computed: Vec<LineTotals> = lines
                .iter()
                .map(|(qty, price, rate)| {
                    LineTotals::compute(*qty, *price, Decimal::ZERO, Decimal::from(*rate)).unwrap()
                })
                .collect();
            let totals = SaleTotals::compute(&computed, order_discount);
            let sum: Decimal = computed.iter().map(|l| l.total).sum();

            prop_assert_eq!(totals.total, sum - order_discount);
            prop_assert!(totals.total.scale() <= 2);
        }

        /// paid ≥ total is always paid; no payment is never partial
        #[test]
        fn prop_payment_status_classification(
            total in cents(),
            paid in cents(),
            days in -30..30i64,
        ) {
            let today = date(2024, 6, 15);
            let due = Some(today + chrono::Duration::days(days));
            let status = PaymentStatus::classify(total, paid, due, today);

            if paid >= total && paid > Decimal::ZERO {
                prop_assert_eq!(status, PaymentStatus::Paid);
            } else if days < 0 {
                prop_assert_eq!(status, PaymentStatus::Overdue);
            } else if paid.is_zero() {
                prop_assert_eq!(status, PaymentStatus::Pending);
            } else {
                prop_assert_eq!(status, PaymentStatus::Partial);
            }
        }

        /// A completed sale's postings undo exactly under cancellation
        #[test]
        fn prop_cancel_reverses_completion(quantities in prop::collection::vec(1..100i32, 1..6)) {
            let lines: Vec<(Uuid, i32, Decimal)> = quantities
                .iter()
                .map(|q| (Uuid::new_v4(), *q, Decimal::ONE))
                .collect();
            let mut s = sale(PaymentMethod::Card, &lines);
            let out = s.complete(Some("FAC202406150001".into()), None, None, Utc::now()).unwrap();
            let back = s.cancel(None).unwrap();

            prop_assert_eq!(out.len(), back.len());
            for (o, b) in out.iter().zip(back.iter()) {
                prop_assert_eq!(o.product_id, b.product_id);
                prop_assert_eq!(o.quantity_delta, -b.quantity_delta);
            }
        }
    }
}

//! Sale models, line arithmetic and the sale lifecycle

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::customer::PaymentTerms;
use super::lifecycle::Lifecycle;
use super::movement::{aggregate_requests, DocumentRef, MovementRequest, MovementType, ReferenceType};
use super::payment::{Payment, PaymentMethod, PaymentStatus};
use crate::error::{DomainError, DomainResult};
use crate::validation::line_amount;

string_enum! {
    pub enum SaleStatus as "sale_status" {
        Draft => "draft",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl Lifecycle for SaleStatus {
    const ENTITY: &'static str = "sale";

    fn successors(&self) -> &'static [Self] {
        use SaleStatus::*;
        match self {
            Draft => &[Completed, Cancelled],
            Completed => &[Cancelled],
            Cancelled => &[],
        }
    }
}

/// Round a money amount to cents, halves away from zero
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Amounts of one sale line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl LineTotals {
    /// `subtotal = qty × price`, tax on the discounted amount
    pub fn compute(
        quantity: i32,
        unit_price: Decimal,
        discount: Decimal,
        tax_rate: Decimal,
    ) -> DomainResult<Self> {
        let subtotal = round_money(line_amount("unit_price", quantity, unit_price)?);
        let discount = round_money(discount);
        let out_of_range = || DomainError::validation("tax_rate", "Line tax exceeds the supported range");
        let taxable = subtotal.checked_sub(discount).ok_or_else(out_of_range)?;
        let tax = taxable
            .checked_mul(tax_rate)
            .map(|amount| round_money(amount / Decimal::from(100)))
            .ok_or_else(out_of_range)?;
        Ok(Self {
            subtotal,
            discount,
            tax,
            total: taxable.checked_add(tax).ok_or_else(out_of_range)?,
        })
    }
}

/// Header amounts of a sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl SaleTotals {
    /// Sum the lines and subtract the order-level discount
    pub fn compute(lines: &[LineTotals], order_discount: Decimal) -> Self {
        let subtotal: Decimal = lines.iter().map(|l| l.subtotal).sum();
        let line_discount: Decimal = lines.iter().map(|l| l.discount).sum();
        let tax: Decimal = lines.iter().map(|l| l.tax).sum();
        let discount = line_discount + round_money(order_discount);
        Self {
            subtotal,
            discount,
            tax,
            total: subtotal - discount + tax,
        }
    }
}

/// A sale (order) drawn from one warehouse
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: Uuid,
    pub sale_number: String,
    pub customer_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub status: SaleStatus,
    pub sale_date: Option<DateTime<Utc>>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    /// Order-level discount on top of line discounts
    pub order_discount: Decimal,
    /// Line discounts plus the order discount
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub requires_electronic_invoice: bool,
    pub electronic_invoice_sent: bool,
    pub electronic_invoice_sent_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<SaleItem>,
    #[serde(default)]
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItem {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_amount: Decimal,
    pub tax_rate: Decimal,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

impl SaleItem {
    pub fn totals(&self) -> LineTotals {
        LineTotals {
            subtotal: self.subtotal,
            discount: self.discount_amount,
            tax: self.tax_amount,
            total: self.total_amount,
        }
    }

    pub fn discount_percentage(&self) -> Decimal {
        if self.subtotal.is_zero() {
            Decimal::ZERO
        } else {
            (self.discount_amount / self.subtotal * Decimal::from(100)).round_dp(2)
        }
    }

    /// Gross profit of the line at `cost_price`
    pub fn profit(&self, cost_price: Decimal) -> Decimal {
        (self.unit_price - cost_price) * Decimal::from(self.quantity)
    }
}

impl Sale {
    /// Recompute header amounts from the current items
    pub fn recalculate(&mut self) {
        let lines: Vec<LineTotals> = self.items.iter().map(SaleItem::totals).collect();
        let totals = SaleTotals::compute(&lines, self.order_discount);
        self.subtotal = totals.subtotal;
        self.discount_amount = totals.discount;
        self.tax_amount = totals.tax;
        self.total_amount = totals.total;
    }

    /// Quantities the sale draws, summed per product
    pub fn stock_requirements(&self) -> Vec<(Uuid, i32)> {
        aggregate_requests(self.items.iter().map(|i| (i.product_id, i.quantity)))
    }

    /// Non-cash sales get an invoice number on completion
    pub fn needs_invoice_number(&self) -> bool {
        self.payment_method != PaymentMethod::Cash && self.invoice_number.is_none()
    }

    /// Complete the sale and return one `sale` posting per line
    ///
    /// `invoice_number` is used when [`Sale::needs_invoice_number`] holds;
    /// the due date follows the customer's payment terms.
    pub fn complete(
        &mut self,
        invoice_number: Option<String>,
        terms: Option<PaymentTerms>,
        actor: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<MovementRequest>> {
        let next = self.status.transition(SaleStatus::Completed, "complete")?;
        if self.items.is_empty() {
            return Err(DomainError::validation("items", "A sale needs at least one item"));
        }

        let plan = self.postings(MovementType::Sale, actor, |qty| -qty);

        self.status = next;
        self.sale_date = Some(now);
        if self.payment_method != PaymentMethod::Cash {
            let today = now.date_naive();
            if self.invoice_number.is_none() {
                self.invoice_number = invoice_number;
            }
            self.invoice_date = Some(today);
            self.due_date = terms.and_then(|t| t.due_date(today));
        }
        Ok(plan)
    }

    /// Cancel the sale; a completed sale returns its stock
    pub fn cancel(&mut self, actor: Option<Uuid>) -> DomainResult<Vec<MovementRequest>> {
        let was_completed = self.status == SaleStatus::Completed;
        self.status = self.status.transition(SaleStatus::Cancelled, "cancel")?;
        if was_completed {
            Ok(self.postings(MovementType::Return, actor, |qty| qty))
        } else {
            Ok(Vec::new())
        }
    }

    fn postings(
        &self,
        movement_type: MovementType,
        actor: Option<Uuid>,
        sign: impl Fn(i32) -> i32,
    ) -> Vec<MovementRequest> {
        let reference = DocumentRef::new(ReferenceType::Sale, self.id);
        self.items
            .iter()
            .map(|item| MovementRequest {
                product_id: item.product_id,
                warehouse_id: self.warehouse_id,
                location_id: self.location_id,
                movement_type,
                quantity_delta: sign(item.quantity),
                reference: Some(reference),
                notes: Some(format!("Sale {}", self.sale_number)),
                actor,
            })
            .collect()
    }

    pub fn ensure_editable(&self) -> DomainResult<()> {
        match self.status {
            SaleStatus::Draft => Ok(()),
            other => Err(DomainError::invalid_transition(SaleStatus::ENTITY, other, "update")),
        }
    }

    pub fn pending_balance(&self, paid: Decimal) -> Decimal {
        (self.total_amount - paid).max(Decimal::ZERO)
    }

    pub fn refresh_payment_status(&mut self, paid: Decimal, today: NaiveDate) {
        self.payment_status = PaymentStatus::classify(self.total_amount, paid, self.due_date, today);
    }

    /// Stored payment status as seen on `today`.
    ///
    /// The stored value is only rewritten when a payment or completion
    /// touches the sale, so an open balance that has since passed its due
    /// date is reported as overdue here.
    pub fn payment_status_on(&self, today: NaiveDate) -> PaymentStatus {
        match (self.status, self.payment_status, self.due_date) {
            (SaleStatus::Completed, PaymentStatus::Pending | PaymentStatus::Partial, Some(due))
                if due < today =>
            {
                PaymentStatus::Overdue
            }
            (_, status, _) => status,
        }
    }

    /// Flagged explicitly or at or above the configured threshold
    pub fn requires_electronic_invoice(&self, threshold: Decimal) -> bool {
        self.requires_electronic_invoice || self.total_amount >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(sale_id: Uuid, quantity: i32, price: i64) -> SaleItem {
        let line = LineTotals::compute(quantity, Decimal::from(price), Decimal::ZERO, Decimal::from(19)).unwrap();
        SaleItem {
            id: Uuid::new_v4(),
            sale_id,
            product_id: Uuid::new_v4(),
            quantity,
            unit_price: Decimal::from(price),
            discount_amount: line.discount,
            tax_rate: Decimal::from(19),
            subtotal: line.subtotal,
            tax_amount: line.tax,
            total_amount: line.total,
        }
    }

    fn sale(method: PaymentMethod) -> Sale {
        let id = Uuid::new_v4();
        let mut sale = Sale {
            id,
            sale_number: "VTA202403010001".into(),
            customer_id: None,
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
            items: vec![item(id, 2, 100), item(id, 1, 50)],
            payments: Vec::new(),
        };
        sale.recalculate();
        sale
    }

    #[test]
    fn test_line_totals() {
        let line = LineTotals::compute(3, Decimal::new(1000, 2), Decimal::from(5), Decimal::from(19)).unwrap();
        assert_eq!(line.subtotal, Decimal::from(30));
        assert_eq!(line.tax, Decimal::new(475, 2));
        assert_eq!(line.total, Decimal::new(2975, 2));
    }

    #[test]
    fn test_line_totals_refuse_unrepresentable_price() {
        let price = Decimal::from_i128_with_scale(79_228_162_514_264_337_593_543_950, 0);
        assert!(LineTotals::compute(2, price, Decimal::ZERO, Decimal::from(19)).is_err());
        assert!(LineTotals::compute(1, Decimal::from(10), Decimal::ZERO, Decimal::MAX).is_err());
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        assert_eq!(round_money(Decimal::new(1005, 3)), Decimal::new(101, 2));
        assert_eq!(round_money(Decimal::new(-1005, 3)), Decimal::new(-101, 2));
    }

    #[test]
    fn test_sale_totals_with_order_discount() {
        let mut s = sale(PaymentMethod::Cash);
        s.order_discount = Decimal::from(10);
        s.recalculate();
        assert_eq!(s.subtotal, Decimal::from(250));
        assert_eq!(s.tax_amount, Decimal::new(4750, 2));
        assert_eq!(s.discount_amount, Decimal::from(10));
        assert_eq!(s.total_amount, Decimal::new(28750, 2));
    }

    #[test]
    fn test_complete_credit_sale_sets_invoice_and_due_date() {
        let mut s = sale(PaymentMethod::Credit);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let plan = s
            .complete(Some("FAC202403010001".into()), Some(PaymentTerms::Net30), None, now)
            .unwrap();

        assert_eq!(s.status, SaleStatus::Completed);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].quantity_delta, -2);
        assert!(plan.iter().all(|m| m.movement_type == MovementType::Sale));
        assert_eq!(s.invoice_number.as_deref(), Some("FAC202403010001"));
        assert_eq!(s.due_date, NaiveDate::from_ymd_opt(2024, 3, 31));
    }

    #[test]
    fn test_cash_sale_has_no_invoice_number() {
        let mut s = sale(PaymentMethod::Cash);
        assert!(!s.needs_invoice_number());
        s.complete(None, Some(PaymentTerms::Net30), None, Utc::now()).unwrap();
        assert!(s.invoice_number.is_none());
        assert!(s.due_date.is_none());
    }

    #[test]
    fn test_cancel_completed_sale_returns_stock() {
        let mut s = sale(PaymentMethod::Cash);
        s.complete(None, None, None, Utc::now()).unwrap();
        let plan = s.cancel(None).unwrap();
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|m| m.movement_type == MovementType::Return && m.quantity_delta > 0));
        assert!(s.cancel(None).is_err());
    }

    #[test]
    fn test_cancel_draft_moves_no_stock() {
        let mut s = sale(PaymentMethod::Cash);
        assert!(s.cancel(None).unwrap().is_empty());
    }

    #[test]
    fn test_electronic_invoice_threshold() {
        let mut s = sale(PaymentMethod::Cash);
        assert!(!s.requires_electronic_invoice(Decimal::from(1_000_000)));
        assert!(s.requires_electronic_invoice(Decimal::from(297)));
        s.requires_electronic_invoice = true;
        assert!(s.requires_electronic_invoice(Decimal::from(1_000_000)));
    }
}

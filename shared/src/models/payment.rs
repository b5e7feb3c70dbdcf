//! Payment models and the sale payment-status rule

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lifecycle::Lifecycle;
use crate::error::{DomainError, DomainResult};

string_enum! {
    pub enum PaymentMethod as "payment_method" {
        Cash => "cash",
        Card => "card",
        Transfer => "transfer",
        Check => "check",
        Credit => "credit",
    }
}

string_enum! {
    /// How much of a sale has been paid
    pub enum PaymentStatus as "payment_status" {
        Pending => "pending",
        Partial => "partial",
        Paid => "paid",
        Overdue => "overdue",
    }
}

impl PaymentStatus {
    /// Classify a sale from its total and the sum of completed payments
    ///
    /// A sale that is not fully paid and whose due date is before `today`
    /// is overdue.
    pub fn classify(
        total: Decimal,
        paid: Decimal,
        due_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Self {
        let status = if paid <= Decimal::ZERO {
            PaymentStatus::Pending
        } else if paid < total {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Paid
        };
        match (status, due_date) {
            (PaymentStatus::Paid, _) => PaymentStatus::Paid,
            (_, Some(due)) if due < today => PaymentStatus::Overdue,
            (status, _) => status,
        }
    }
}

string_enum! {
    /// Lifecycle of a single payment
    pub enum PaymentState as "payment_state" {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl Lifecycle for PaymentState {
    const ENTITY: &'static str = "payment";

    fn successors(&self) -> &'static [Self] {
        use PaymentState::*;
        match self {
            Pending => &[Completed, Failed, Cancelled],
            Failed => &[Cancelled],
            Completed | Cancelled => &[],
        }
    }
}

/// A payment recorded against a sale
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub status: PaymentState,
    pub payment_date: DateTime<Utc>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn complete(&mut self) -> DomainResult<()> {
        self.status = self.status.transition(PaymentState::Completed, "complete")?;
        Ok(())
    }

    pub fn fail(&mut self) -> DomainResult<()> {
        self.status = self.status.transition(PaymentState::Failed, "fail")?;
        Ok(())
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        self.status = self.status.transition(PaymentState::Cancelled, "cancel")?;
        Ok(())
    }
}

/// Sum of completed payments
pub fn completed_total(payments: &[Payment]) -> Decimal {
    payments
        .iter()
        .filter(|p| p.status == PaymentState::Completed)
        .map(|p| p.amount)
        .sum()
}

/// Check a new payment of `amount` against the outstanding `balance`
pub fn ensure_payable(amount: Decimal, balance: Decimal) -> DomainResult<()> {
    if amount <= Decimal::ZERO {
        return Err(DomainError::validation("amount", "Amount must be positive"));
    }
    if amount > balance {
        return Err(DomainError::validation(
            "amount",
            format!("Amount exceeds the pending balance of {}", balance),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_classify() {
        let total = Decimal::from(100);
        assert_eq!(PaymentStatus::classify(total, Decimal::ZERO, None, day(1)), PaymentStatus::Pending);
        assert_eq!(PaymentStatus::classify(total, Decimal::from(40), None, day(1)), PaymentStatus::Partial);
        assert_eq!(PaymentStatus::classify(total, total, None, day(1)), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::classify(total, Decimal::from(120), None, day(1)), PaymentStatus::Paid);
    }

    #[test]
    fn test_classify_overdue() {
        let total = Decimal::from(100);
        assert_eq!(
            PaymentStatus::classify(total, Decimal::from(40), Some(day(10)), day(11)),
            PaymentStatus::Overdue
        );
        assert_eq!(
            PaymentStatus::classify(total, Decimal::ZERO, Some(day(10)), day(10)),
            PaymentStatus::Pending
        );
        assert_eq!(
            PaymentStatus::classify(total, total, Some(day(10)), day(20)),
            PaymentStatus::Paid
        );
    }

    #[test]
    fn test_payment_lifecycle() {
        assert!(PaymentState::Pending.can_transition_to(PaymentState::Failed));
        assert!(PaymentState::Failed.can_transition_to(PaymentState::Cancelled));
        assert!(!PaymentState::Completed.can_transition_to(PaymentState::Cancelled));
        assert!(!PaymentState::Failed.can_transition_to(PaymentState::Completed));
    }

    #[test]
    fn test_ensure_payable() {
        let balance = Decimal::from(50);
        assert!(ensure_payable(Decimal::from(50), balance).is_ok());
        assert!(ensure_payable(Decimal::ZERO, balance).is_err());
        assert!(ensure_payable(Decimal::from(51), balance).is_err());
    }
}

//! Stock adjustment models
//!
//! An adjustment reconciles the system quantity of one or more products
//! at a warehouse/location with a counted quantity. It moves through
//! draft → pending → approved → applied, and only `apply` touches stock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lifecycle::Lifecycle;
use super::movement::{DocumentRef, MovementRequest, MovementType, ReferenceType};
use crate::error::{DomainError, DomainResult};
use crate::validation::line_amount;

string_enum! {
    pub enum AdjustmentType as "adjustment_type" {
        Increase => "increase",
        Decrease => "decrease",
        Recount => "recount",
        Damage => "damage",
        Expiry => "expiry",
        Theft => "theft",
        Correction => "correction",
    }
}

string_enum! {
    pub enum AdjustmentReason as "adjustment_reason" {
        PhysicalCount => "physical_count",
        DamagedGoods => "damaged_goods",
        ExpiredGoods => "expired_goods",
        TheftLoss => "theft_loss",
        SystemError => "system_error",
        SupplierError => "supplier_error",
        FoundGoods => "found_goods",
        Other => "other",
    }
}

string_enum! {
    pub enum AdjustmentStatus as "adjustment_status" {
        Draft => "draft",
        Pending => "pending",
        Approved => "approved",
        Applied => "applied",
        Cancelled => "cancelled",
    }
}

impl Lifecycle for AdjustmentStatus {
    const ENTITY: &'static str = "stock adjustment";

    fn successors(&self) -> &'static [Self] {
        use AdjustmentStatus::*;
        match self {
            Draft => &[Pending, Cancelled],
            Pending => &[Approved, Cancelled],
            Approved => &[Applied, Cancelled],
            Applied | Cancelled => &[],
        }
    }
}

/// A stock adjustment document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockAdjustment {
    pub id: Uuid,
    pub adjustment_number: String,
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub adjustment_type: AdjustmentType,
    pub reason: AdjustmentReason,
    pub status: AdjustmentStatus,
    pub adjustment_date: DateTime<Utc>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
    pub total_items: i32,
    pub total_value_adjustment: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<StockAdjustmentItem>,
}

/// One product line of an adjustment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockAdjustmentItem {
    pub id: Uuid,
    pub stock_adjustment_id: Uuid,
    pub product_id: Uuid,
    /// System quantity when the line was saved
    pub current_quantity: i32,
    /// Counted quantity
    pub adjusted_quantity: i32,
    pub quantity_adjustment: i32,
    pub unit_cost: Decimal,
    pub value_adjustment: Decimal,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Signed change needed to bring `current` to `adjusted`
pub fn adjustment_delta(current: i32, adjusted: i32) -> i32 {
    adjusted - current
}

/// Quantity and value deltas of a line, computed at save time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdjustment {
    pub quantity_adjustment: i32,
    pub value_adjustment: Decimal,
}

impl LineAdjustment {
    pub fn compute(current: i32, adjusted: i32, unit_cost: Decimal) -> DomainResult<Self> {
        let quantity_adjustment = adjustment_delta(current, adjusted);
        let value = line_amount("unit_cost", quantity_adjustment, unit_cost)?;
        Ok(Self {
            quantity_adjustment,
            value_adjustment: value.round_dp(2),
        })
    }
}

/// Header totals over the adjustment's lines
pub fn adjustment_totals(items: &[StockAdjustmentItem]) -> (i32, Decimal) {
    let total_value = items.iter().map(|i| i.value_adjustment).sum();
    (items.len() as i32, total_value)
}

impl StockAdjustment {
    pub fn submit(&mut self) -> DomainResult<()> {
        self.status = self.status.transition(AdjustmentStatus::Pending, "submit")?;
        Ok(())
    }

    /// Approve as `approver`, who must not be the creator
    pub fn approve(&mut self, approver: Uuid, now: DateTime<Utc>) -> DomainResult<()> {
        let next = self.status.transition(AdjustmentStatus::Approved, "approve")?;
        if approver == self.created_by {
            return Err(DomainError::SameActor {
                entity: AdjustmentStatus::ENTITY,
            });
        }
        self.status = next;
        self.approved_by = Some(approver);
        self.approved_at = Some(now);
        Ok(())
    }

    /// Mark applied and return the ledger postings, one per non-zero line
    pub fn apply(&mut self, actor: Option<Uuid>, now: DateTime<Utc>) -> DomainResult<Vec<MovementRequest>> {
        let next = self.status.transition(AdjustmentStatus::Applied, "apply")?;
        let reference = DocumentRef::new(ReferenceType::StockAdjustment, self.id);
        let plan = self
            .items
            .iter()
            .filter(|item| item.quantity_adjustment != 0)
            .map(|item| MovementRequest {
                product_id: item.product_id,
                warehouse_id: self.warehouse_id,
                location_id: self.location_id,
                movement_type: MovementType::Adjustment,
                quantity_delta: item.quantity_adjustment,
                reference: Some(reference),
                notes: Some(format!("Adjustment {}", self.adjustment_number)),
                actor,
            })
            .collect();
        self.status = next;
        self.applied_at = Some(now);
        Ok(plan)
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        self.status = self.status.transition(AdjustmentStatus::Cancelled, "cancel")?;
        Ok(())
    }

    /// Items and header fields may change only before approval
    pub fn ensure_editable(&self) -> DomainResult<()> {
        match self.status {
            AdjustmentStatus::Draft | AdjustmentStatus::Pending => Ok(()),
            other => Err(DomainError::invalid_transition(AdjustmentStatus::ENTITY, other, "update")),
        }
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        match self.status {
            AdjustmentStatus::Draft => Ok(()),
            other => Err(DomainError::invalid_transition(AdjustmentStatus::ENTITY, other, "delete")),
        }
    }
}

/// A counted product whose count disagrees with the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDifference {
    pub product_id: Uuid,
    pub current_quantity: i32,
    pub counted_quantity: i32,
}

/// Compare physical counts with system levels, keeping only differences
///
/// Products absent from `levels` have a system quantity of 0. Fails
/// when every count matches.
pub fn count_differences(
    counts: &[(Uuid, i32)],
    levels: &HashMap<Uuid, i32>,
) -> DomainResult<Vec<CountDifference>> {
    let differences: Vec<CountDifference> = counts
        .iter()
        .map(|(product_id, counted)| CountDifference {
            product_id: *product_id,
            current_quantity: levels.get(product_id).copied().unwrap_or(0),
            counted_quantity: *counted,
        })
        .filter(|d| d.current_quantity != d.counted_quantity)
        .collect();

    if differences.is_empty() {
        return Err(DomainError::validation(
            "counts",
            "No differences between the physical count and system stock",
        ));
    }
    Ok(differences)
}

//! Stock transfer models

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lifecycle::Lifecycle;
use super::movement::{aggregate_requests, DocumentRef, MovementRequest, MovementType, ReferenceType};
use crate::error::{DomainError, DomainResult};
use crate::validation::{line_amount, max_amount};

string_enum! {
    pub enum TransferStatus as "transfer_status" {
        Draft => "draft",
        Pending => "pending",
        InTransit => "in_transit",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl Lifecycle for TransferStatus {
    const ENTITY: &'static str = "stock transfer";

    fn successors(&self) -> &'static [Self] {
        use TransferStatus::*;
        match self {
            Draft => &[Pending, Cancelled],
            Pending => &[InTransit, Cancelled],
            InTransit => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }
}

string_enum! {
    pub enum TransferPriority as "transfer_priority" {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

string_enum! {
    pub enum TransferType as "transfer_type" {
        Internal => "internal",
        External => "external",
        Emergency => "emergency",
        Rebalance => "rebalance",
    }
}

/// Movement of stock between two warehouse/location sites
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockTransfer {
    pub id: Uuid,
    pub transfer_number: String,
    pub from_warehouse_id: Uuid,
    pub from_location_id: Option<Uuid>,
    pub to_warehouse_id: Uuid,
    pub to_location_id: Option<Uuid>,
    pub status: TransferStatus,
    pub transfer_type: TransferType,
    pub priority: TransferPriority,
    pub transfer_date: DateTime<Utc>,
    pub expected_date: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub shipping_cost: Decimal,
    pub requested_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_by: Option<Uuid>,
    pub receiving_notes: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub total_items: i32,
    pub total_quantity: i32,
    pub total_value: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<StockTransferItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockTransferItem {
    pub id: Uuid,
    pub stock_transfer_id: Uuid,
    pub product_id: Uuid,
    /// Shipped quantity
    pub quantity: i32,
    pub quantity_received: Option<i32>,
    pub unit_cost: Decimal,
    pub notes: Option<String>,
}

impl StockTransferItem {
    /// Shipped minus received, once received
    pub fn discrepancy(&self) -> Option<i32> {
        self.quantity_received.map(|r| self.quantity - r)
    }
}

/// Refuse a transfer whose source and destination are the same site
pub fn ensure_distinct_sites(
    from: (Uuid, Option<Uuid>),
    to: (Uuid, Option<Uuid>),
) -> DomainResult<()> {
    if from == to {
        return Err(DomainError::validation(
            "to_warehouse_id",
            "Destination must differ from the source",
        ));
    }
    Ok(())
}

/// Header totals over transfer lines: (items, quantity, value)
pub fn transfer_totals(items: &[StockTransferItem]) -> DomainResult<(i32, i32, Decimal)> {
    let count = i32::try_from(items.len()).map_err(|_| DomainError::QuantityOverflow)?;
    let quantity = items.iter().try_fold(0i32, |acc, i| {
        acc.checked_add(i.quantity).ok_or(DomainError::QuantityOverflow)
    })?;
    let value = items.iter().try_fold(Decimal::ZERO, |acc, i| {
        let line = line_amount("unit_cost", i.quantity, i.unit_cost)?;
        acc.checked_add(line)
            .filter(|total| *total <= max_amount())
            .ok_or_else(|| DomainError::validation("unit_cost", "Transfer value exceeds 999999999999.99"))
    })?;
    Ok((count, quantity, value.round_dp(2)))
}

impl StockTransfer {
    pub fn approve(&mut self, approver: Uuid, now: DateTime<Utc>) -> DomainResult<()> {
        self.status = self.status.transition(TransferStatus::Pending, "approve")?;
        self.approved_by = Some(approver);
        self.approved_at = Some(now);
        Ok(())
    }

    /// Quantities the source site must hold, summed per product
    pub fn shipping_requirements(&self) -> Vec<(Uuid, i32)> {
        aggregate_requests(self.items.iter().map(|i| (i.product_id, i.quantity)))
    }

    /// Put the transfer in transit; availability is checked by the caller
    pub fn start(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.status = self.status.transition(TransferStatus::InTransit, "start")?;
        self.shipped_at = Some(now);
        Ok(())
    }

    /// Record receipt and return the ledger postings
    ///
    /// `received` maps item ids to received quantities; unlisted items
    /// are received in full. Each item yields a `transfer_out` at the
    /// source and a `transfer_in` at the destination, both of the shipped
    /// quantity.
    pub fn complete(
        &mut self,
        receiver: Uuid,
        received: &HashMap<Uuid, i32>,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<MovementRequest>> {
        let next = self.status.transition(TransferStatus::Completed, "complete")?;

        for (item_id, quantity) in received {
            let item = self
                .items
                .iter()
                .find(|i| i.id == *item_id)
                .ok_or_else(|| DomainError::validation("items", format!("item {} is not part of this transfer", item_id)))?;
            if *quantity < 0 || *quantity > item.quantity {
                return Err(DomainError::validation(
                    "quantity_received",
                    format!("must be between 0 and {}", item.quantity),
                ));
            }
        }

        let reference = DocumentRef::new(ReferenceType::StockTransfer, self.id);
        let mut plan = Vec::with_capacity(self.items.len() * 2);
        for item in &mut self.items {
            item.quantity_received = Some(received.get(&item.id).copied().unwrap_or(item.quantity));
            plan.push(MovementRequest {
                product_id: item.product_id,
                warehouse_id: self.from_warehouse_id,
                location_id: self.from_location_id,
                movement_type: MovementType::TransferOut,
                quantity_delta: -item.quantity,
                reference: Some(reference),
                notes: Some(format!("Transfer {} out", self.transfer_number)),
                actor: Some(receiver),
            });
            plan.push(MovementRequest {
                product_id: item.product_id,
                warehouse_id: self.to_warehouse_id,
                location_id: self.to_location_id,
                movement_type: MovementType::TransferIn,
                quantity_delta: item.quantity,
                reference: Some(reference),
                notes: Some(format!("Transfer {} in", self.transfer_number)),
                actor: Some(receiver),
            });
        }

        self.status = next;
        self.completed_by = Some(receiver);
        self.received_at = Some(now);
        Ok(plan)
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        self.status = self.status.transition(TransferStatus::Cancelled, "cancel")?;
        Ok(())
    }

    pub fn ensure_editable(&self) -> DomainResult<()> {
        match self.status {
            TransferStatus::Draft | TransferStatus::Pending => Ok(()),
            other => Err(DomainError::invalid_transition(TransferStatus::ENTITY, other, "update")),
        }
    }

    /// Past its expected date and still open
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.expected_date.map_or(false, |d| d < now) && !self.status.is_terminal()
    }
}

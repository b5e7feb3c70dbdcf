//! Stock ledger models and quantity arithmetic
//!
//! Every change to a stock quantity is expressed as a [`MovementRequest`]
//! and recorded as exactly one [`StockMovement`]. The arithmetic here is
//! the only place deltas are applied; the backend runs it on rows it has
//! locked inside a transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

string_enum! {
    /// Kind of ledger entry
    pub enum MovementType as "movement_type" {
        Sale => "sale",
        Purchase => "purchase",
        Adjustment => "adjustment",
        TransferIn => "transfer_in",
        TransferOut => "transfer_out",
        Return => "return",
        Damage => "damage",
        Loss => "loss",
    }
}

/// Sign a movement type's delta must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
    Either,
}

impl MovementType {
    pub fn direction(&self) -> Direction {
        match self {
            MovementType::Purchase | MovementType::TransferIn | MovementType::Return => {
                Direction::Inbound
            }
            MovementType::Sale
            | MovementType::TransferOut
            | MovementType::Damage
            | MovementType::Loss => Direction::Outbound,
            MovementType::Adjustment => Direction::Either,
        }
    }

    /// Whether `delta` has the sign this type requires
    pub fn admits(&self, delta: i32) -> bool {
        match self.direction() {
            Direction::Inbound => delta > 0,
            Direction::Outbound => delta < 0,
            Direction::Either => delta != 0,
        }
    }
}

string_enum! {
    /// Document a movement was posted for
    pub enum ReferenceType as "movement_reference_type" {
        StockAdjustment => "stock_adjustment",
        StockTransfer => "stock_transfer",
        Sale => "sale",
    }
}

/// Link from a ledger entry back to its source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub reference_type: ReferenceType,
    pub reference_id: Uuid,
}

impl DocumentRef {
    pub fn new(reference_type: ReferenceType, reference_id: Uuid) -> Self {
        Self {
            reference_type,
            reference_id,
        }
    }
}

/// An immutable ledger row
///
/// `previous_quantity` and `new_quantity` are the balance at the
/// (warehouse, location) site the movement was posted to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub movement_type: MovementType,
    pub quantity_delta: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A quantity change to be posted to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub movement_type: MovementType,
    pub quantity_delta: i32,
    pub reference: Option<DocumentRef>,
    pub notes: Option<String>,
    pub actor: Option<Uuid>,
}

impl MovementRequest {
    /// Reject zero deltas and deltas whose sign contradicts the type
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity_delta == 0 {
            return Err(DomainError::ZeroQuantity);
        }
        if !self.movement_type.admits(self.quantity_delta) {
            return Err(DomainError::validation(
                "quantity_delta",
                format!(
                    "a {} movement cannot carry a delta of {}",
                    self.movement_type, self.quantity_delta
                ),
            ));
        }
        Ok(())
    }
}

/// Before/after snapshot of one balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub previous: i32,
    pub delta: i32,
    pub new: i32,
}

/// Apply `delta` to `current`, refusing to go below zero
pub fn apply_delta(product_id: Uuid, current: i32, delta: i32) -> DomainResult<StockChange> {
    if delta == 0 {
        return Err(DomainError::ZeroQuantity);
    }
    let new = current
        .checked_add(delta)
        .ok_or(DomainError::QuantityOverflow)?;
    if new < 0 {
        return Err(DomainError::InsufficientStock {
            product_id,
            available: current,
            requested: delta.saturating_neg(),
        });
    }
    Ok(StockChange {
        previous: current,
        delta,
        new,
    })
}

/// Result of posting one delta to a site balance and the product total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub site: StockChange,
    pub product: StockChange,
}

/// Post `delta` to both the site balance and the product's total
pub fn posting(
    product_id: Uuid,
    site_quantity: i32,
    product_quantity: i32,
    delta: i32,
) -> DomainResult<Posting> {
    let site = apply_delta(product_id, site_quantity, delta)?;
    let product = apply_delta(product_id, product_quantity, delta)?;
    Ok(Posting { site, product })
}

/// Sum requested quantities per product, keeping first-seen order
pub fn aggregate_requests<I>(lines: I) -> Vec<(Uuid, i32)>
where
    I: IntoIterator<Item = (Uuid, i32)>,
{
    let mut totals: Vec<(Uuid, i32)> = Vec::new();
    for (product_id, quantity) in lines {
        match totals.iter_mut().find(|(id, _)| *id == product_id) {
            Some((_, total)) => *total = total.saturating_add(quantity),
            None => totals.push((product_id, quantity)),
        }
    }
    totals
}

/// Check each aggregated request against what is available
///
/// Fails on the first product whose request exceeds its balance.
/// Products missing from `available` have none.
pub fn check_availability(
    requested: &[(Uuid, i32)],
    available: &HashMap<Uuid, i32>,
) -> DomainResult<()> {
    for (product_id, quantity) in requested {
        let on_hand = available.get(product_id).copied().unwrap_or(0);
        if *quantity > on_hand {
            return Err(DomainError::InsufficientStock {
                product_id: *product_id,
                available: on_hand,
                requested: *quantity,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_delta() {
        let id = Uuid::new_v4();
        let change = apply_delta(id, 10, -3).unwrap();
        assert_eq!(change, StockChange { previous: 10, delta: -3, new: 7 });
        assert_eq!(apply_delta(id, 0, 5).unwrap().new, 5);
    }

    #[test]
    fn test_apply_delta_refuses_negative_result() {
        let id = Uuid::new_v4();
        assert_eq!(
            apply_delta(id, 2, -3),
            Err(DomainError::InsufficientStock {
                product_id: id,
                available: 2,
                requested: 3
            })
        );
    }

    #[test]
    fn test_apply_delta_refuses_zero_and_overflow() {
        let id = Uuid::new_v4();
        assert_eq!(apply_delta(id, 5, 0), Err(DomainError::ZeroQuantity));
        assert_eq!(apply_delta(id, i32::MAX, 1), Err(DomainError::QuantityOverflow));
    }

    #[test]
    fn test_posting_checks_site_balance() {
        let id = Uuid::new_v4();
        // plenty in total but not at this site
        assert!(posting(id, 1, 50, -2).is_err());
        let p = posting(id, 5, 50, -2).unwrap();
        assert_eq!(p.site.new, 3);
        assert_eq!(p.product.new, 48);
    }

    #[test]
    fn test_movement_direction() {
        assert!(MovementType::Sale.admits(-1));
        assert!(!MovementType::Sale.admits(1));
        assert!(MovementType::TransferIn.admits(4));
        assert!(MovementType::Adjustment.admits(-4));
        assert!(MovementType::Adjustment.admits(4));
        assert!(!MovementType::Adjustment.admits(0));
    }

    #[test]
    fn test_request_validation() {
        let mut req = MovementRequest {
            product_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            location_id: None,
            movement_type: MovementType::Damage,
            quantity_delta: 2,
            reference: None,
            notes: None,
            actor: None,
        };
        assert!(req.validate().is_err());
        req.quantity_delta = -2;
        assert!(req.validate().is_ok());
        req.quantity_delta = 0;
        assert_eq!(req.validate(), Err(DomainError::ZeroQuantity));
    }

    #[test]
    fn test_aggregate_and_check() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let totals = aggregate_requests(vec![(a, 3), (b, 1), (a, 4)]);
        assert_eq!(totals, vec![(a, 7), (b, 1)]);

        let mut available = HashMap::new();
        available.insert(a, 7);
        assert_eq!(
            check_availability(&totals, &available),
            Err(DomainError::InsufficientStock {
                product_id: b,
                available: 0,
                requested: 1
            })
        );
        available.insert(b, 1);
        assert!(check_availability(&totals, &available).is_ok());
    }
}

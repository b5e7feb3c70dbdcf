//! Stock transfer tests
//!
//! - completion posts exactly one transfer_out and one transfer_in per item
//! - the source loses and the destination gains the shipped quantity
//! - completed transfers cannot be cancelled

use std::collections::HashMap;

use chrono::{Duration, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    check_availability, ensure_distinct_sites, posting, transfer_totals, DomainError, Lifecycle,
    MovementType, StockTransfer, StockTransferItem, TransferPriority, TransferStatus, TransferType,
};
use uuid::Uuid;

/// A (warehouse, location, product) stock key
type SiteKey = (Uuid, Option<Uuid>, Uuid);

fn transfer(lines: &[(Uuid, i32)]) -> StockTransfer {
    let id = Uuid::new_v4();
    let items: Vec<StockTransferItem> = lines
        .iter()
        .map(|(product_id, quantity)| StockTransferItem {
            id: Uuid::new_v4(),
            stock_transfer_id: id,
            product_id: *product_id,
            quantity: *quantity,
            quantity_received: None,
            unit_cost: Decimal::new(1050, 2),
            notes: None,
        })
        .collect();
    let (total_items, total_quantity, total_value) = transfer_totals(&items).unwrap();
    let now = Utc::now();
    StockTransfer {
        id,
        transfer_number: "TR2024010001".into(),
        from_warehouse_id: Uuid::new_v4(),
        from_location_id: None,
        to_warehouse_id: Uuid::new_v4(),
        to_location_id: Some(Uuid::new_v4()),
        status: TransferStatus::Draft,
        transfer_type: TransferType::Internal,
        priority: TransferPriority::Normal,
        transfer_date: now,
        expected_date: None,
        shipped_at: None,
        received_at: None,
        carrier: None,
        tracking_number: None,
        shipping_cost: Decimal::ZERO,
        requested_by: Uuid::new_v4(),
        approved_by: None,
        approved_at: None,
        completed_by: None,
        receiving_notes: None,
        reason: None,
        notes: None,
        total_items,
        total_quantity,
        total_value,
        created_at: now,
        updated_at: now,
        items,
    }
}

fn in_transit(lines: &[(Uuid, i32)]) -> StockTransfer {
    let mut tr = transfer(lines);
    tr.approve(Uuid::new_v4(), Utc::now()).unwrap();
    tr.start(Utc::now()).unwrap();
    tr
}

/// Post a plan against per-site and per-product balances
fn replay(
    sites: &mut HashMap<SiteKey, i32>,
    products: &mut HashMap<Uuid, i32>,
    plan: &[shared::MovementRequest],
) -> Result<(), DomainError> {
    for req in plan {
        req.validate()?;
        let key = (req.warehouse_id, req.location_id, req.product_id);
        let site = sites.get(&key).copied().unwrap_or(0);
        let product = products.get(&req.product_id).copied().unwrap_or(0);
        let post = posting(req.product_id, site, product, req.quantity_delta)?;
        sites.insert(key, post.site.new);
        products.insert(req.product_id, post.product.new);
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_complete_moves_stock_between_sites() {
        let product = Uuid::new_v4();
        let mut tr = in_transit(&[(product, 4)]);
        let source = (tr.from_warehouse_id, tr.from_location_id, product);
        let destination = (tr.to_warehouse_id, tr.to_location_id, product);

        let mut sites: HashMap<SiteKey, i32> = [(source, 10)].into_iter().collect();
        let mut products: HashMap<Uuid, i32> = [(product, 10)].into_iter().collect();

        let plan = tr.complete(Uuid::new_v4(), &HashMap::new(), Utc::now()).unwrap();
        replay(&mut sites, &mut products, &plan).unwrap();

        assert_eq!(sites[&source], 6);
        assert_eq!(sites[&destination], 4);
        // a transfer never changes the product total
        assert_eq!(products[&product], 10);
        assert_eq!(tr.status, TransferStatus::Completed);
        assert!(tr.received_at.is_some());
    }

    #[test]
    fn test_movement_types_and_signs() {
        let mut tr = in_transit(&[(Uuid::new_v4(), 3)]);
        let plan = tr.complete(Uuid::new_v4(), &HashMap::new(), Utc::now()).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].movement_type, MovementType::TransferOut);
        assert_eq!(plan[0].quantity_delta, -3);
        assert_eq!(plan[0].warehouse_id, tr.from_warehouse_id);
        assert_eq!(plan[1].movement_type, MovementType::TransferIn);
        assert_eq!(plan[1].quantity_delta, 3);
        assert_eq!(plan[1].location_id, tr.to_location_id);
    }

    #[test]
    fn test_received_quantities() {
        let mut tr = in_transit(&[(Uuid::new_v4(), 5), (Uuid::new_v4(), 2)]);
        let short = tr.items[0].id;
        let received: HashMap<Uuid, i32> = [(short, 4)].into_iter().collect();

        tr.complete(Uuid::new_v4(), &received, Utc::now()).unwrap();
        assert_eq!(tr.items[0].quantity_received, Some(4));
        assert_eq!(tr.items[0].discrepancy(), Some(1));
        // unlisted items are received in full
        assert_eq!(tr.items[1].quantity_received, Some(2));
        assert_eq!(tr.items[1].discrepancy(), Some(0));
    }

    #[test]
    fn test_received_quantity_bounds() {
        let mut tr = in_transit(&[(Uuid::new_v4(), 5)]);
        let item = tr.items[0].id;

        let over: HashMap<Uuid, i32> = [(item, 6)].into_iter().collect();
        assert!(matches!(
            tr.complete(Uuid::new_v4(), &over, Utc::now()),
            Err(DomainError::Validation { .. })
        ));

        let unknown: HashMap<Uuid, i32> = [(Uuid::new_v4(), 1)].into_iter().collect();
        assert!(tr.complete(Uuid::new_v4(), &unknown, Utc::now()).is_err());
        assert_eq!(tr.status, TransferStatus::InTransit);
    }

    #[test]
    fn test_start_requires_approval() {
        let mut tr = transfer(&[(Uuid::new_v4(), 1)]);
        assert!(tr.start(Utc::now()).is_err());
        assert!(tr.complete(Uuid::new_v4(), &HashMap::new(), Utc::now()).is_err());
    }

    #[test]
    fn test_start_checks_source_availability() {
        let product = Uuid::new_v4();
        let tr = transfer(&[(product, 3), (product, 4)]);
        let levels: HashMap<Uuid, i32> = [(product, 6)].into_iter().collect();

        let err = check_availability(&tr.shipping_requirements(), &levels).unwrap_err();
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
    fn test_no_cancel_after_completion() {
        let mut tr = in_transit(&[(Uuid::new_v4(), 1)]);
        tr.complete(Uuid::new_v4(), &HashMap::new(), Utc::now()).unwrap();
        assert!(tr.cancel().is_err());
        assert!(tr.ensure_editable().is_err());
    }

    #[test]
    fn test_cancel_in_transit() {
        let mut tr = in_transit(&[(Uuid::new_v4(), 1)]);
        tr.cancel().unwrap();
        assert_eq!(tr.status, TransferStatus::Cancelled);
    }

    #[test]
    fn test_distinct_sites() {
        let warehouse = Uuid::new_v4();
        let location = Uuid::new_v4();
        assert!(ensure_distinct_sites((warehouse, None), (warehouse, None)).is_err());
        assert!(ensure_distinct_sites((warehouse, None), (warehouse, Some(location))).is_ok());
        assert!(ensure_distinct_sites((warehouse, None), (Uuid::new_v4(), None)).is_ok());
    }

    #[test]
    fn test_totals() {
        let tr = transfer(&[(Uuid::new_v4(), 2), (Uuid::new_v4(), 3)]);
        assert_eq!(tr.total_items, 2);
        assert_eq!(tr.total_quantity, 5);
        assert_eq!(tr.total_value, Decimal::new(5250, 2));
    }

    #[test]
    fn test_totals_refuse_quantity_overflow() {
        let tr = transfer(&[(Uuid::new_v4(), 1), (Uuid::new_v4(), 1)]);
        let mut items = tr.items.clone();
        for item in &mut items {
            item.quantity = 1_500_000_000;
            item.unit_cost = Decimal::ONE;
        }
        assert_eq!(transfer_totals(&items), Err(DomainError::QuantityOverflow));
    }

    #[test]
    fn test_overdue() {
        let now = Utc::now();
        let mut tr = transfer(&[(Uuid::new_v4(), 1)]);
        assert!(!tr.is_overdue(now));
        tr.expected_date = Some(now - Duration::days(1));
        assert!(tr.is_overdue(now));
        tr.status = TransferStatus::Completed;
        assert!(!tr.is_overdue(now));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn status_strategy() -> impl Strategy<Value = TransferStatus> {
        prop::sample::select(TransferStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Each item produces one out and one in of equal magnitude
        #[test]
        fn prop_two_matching_movements_per_item(
            quantities in prop::collection::vec(1..1_000i32, 1..8)
        ) {
            let lines: Vec<(Uuid, i32)> =
                quantities.iter().map(|q| (Uuid::new_v4(), *q)).collect();
            let mut tr = in_transit(&lines);
            let plan = tr.complete(Uuid::new_v4(), &HashMap::new(), Utc::now()).unwrap();

            prop_assert_eq!(plan.len(), lines.len() * 2);
            for (product_id, quantity) in &lines {
                let moves: Vec<_> = plan.iter().filter(|m| m.product_id == *product_id).collect();
                prop_assert_eq!(moves.len(), 2);
                let out = moves.iter().find(|m| m.movement_type == MovementType::TransferOut).unwrap();
                let inn = moves.iter().find(|m| m.movement_type == MovementType::TransferIn).unwrap();
                prop_assert_eq!(out.quantity_delta, -quantity);
                prop_assert_eq!(inn.quantity_delta, *quantity);
            }
        }

        /// Posting a completed transfer preserves every product total
        #[test]
        fn prop_product_totals_preserved(
            quantities in prop::collection::vec(1..500i32, 1..6),
            surplus in 0..100i32,
        ) {
            let lines: Vec<(Uuid, i32)> =
                quantities.iter().map(|q| (Uuid::new_v4(), *q)).collect();
            let mut tr = in_transit(&lines);

            let mut sites = HashMap::new();
            let mut products = HashMap::new();
            for (product_id, quantity) in &lines {
                sites.insert((tr.from_warehouse_id, tr.from_location_id, *product_id), quantity + surplus);
                products.insert(*product_id, quantity + surplus);
            }
            let before = products.clone();

            let plan = tr.complete(Uuid::new_v4(), &HashMap::new(), Utc::now()).unwrap();
            replay(&mut sites, &mut products, &plan).unwrap();
            prop_assert_eq!(products, before);
        }

        #[test]
        fn prop_transitions_follow_adjacency(from in status_strategy(), to in status_strategy()) {
            let allowed = matches!(
                (from, to),
                (TransferStatus::Draft, TransferStatus::Pending)
                    | (TransferStatus::Draft, TransferStatus::Cancelled)
                    | (TransferStatus::Pending, TransferStatus::InTransit)
                    | (TransferStatus::Pending, TransferStatus::Cancelled)
                    | (TransferStatus::InTransit, TransferStatus::Completed)
                    | (TransferStatus::InTransit, TransferStatus::Cancelled)
            );
            prop_assert_eq!(from.can_transition_to(to), allowed);
        }
    }
}

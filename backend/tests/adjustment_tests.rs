//! Stock adjustment tests
//!
//! - adjustment delta law: `quantity_adjustment == adjusted - current`
//! - applying moves each product by exactly its delta
//! - the workflow rejects transitions outside draft → pending → approved → applied

use std::collections::HashMap;

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    adjustment_delta, adjustment_totals, apply_delta, count_differences, AdjustmentReason,
    AdjustmentStatus, AdjustmentType, DomainError, LineAdjustment, Lifecycle, MovementType,
    ReferenceType, StockAdjustment, StockAdjustmentItem,
};
use uuid::Uuid;

/// Build an adjustment with one line per `(product, current, counted)`
fn adjustment(lines: &[(Uuid, i32, i32)]) -> StockAdjustment {
    let id = Uuid::new_v4();
    let items = lines
        .iter()
        .map(|(product_id, current, adjusted)| {
            let change = LineAdjustment::compute(*current, *adjusted, Decimal::from(2500)).unwrap();
            StockAdjustmentItem {
                id: Uuid::new_v4(),
                stock_adjustment_id: id,
                product_id: *product_id,
                current_quantity: *current,
                adjusted_quantity: *adjusted,
                quantity_adjustment: change.quantity_adjustment,
                unit_cost: Decimal::from(2500),
                value_adjustment: change.value_adjustment,
                reason: None,
                notes: None,
            }
        })
        .collect::<Vec<_>>();
    let (total_items, total_value_adjustment) = adjustment_totals(&items);
    let now = Utc::now();
    StockAdjustment {
        id,
        adjustment_number: "ADJ202401150001".into(),
        warehouse_id: Uuid::new_v4(),
        location_id: None,
        adjustment_type: AdjustmentType::Recount,
        reason: AdjustmentReason::PhysicalCount,
        status: AdjustmentStatus::Draft,
        adjustment_date: now,
        description: None,
        notes: None,
        created_by: Uuid::new_v4(),
        approved_by: None,
        approved_at: None,
        applied_at: None,
        total_items,
        total_value_adjustment,
        created_at: now,
        updated_at: now,
        items,
    }
}

/// Submit and approve with a second user
fn approved(mut adj: StockAdjustment) -> StockAdjustment {
    adj.submit().unwrap();
    adj.approve(Uuid::new_v4(), Utc::now()).unwrap();
    adj
}

/// Post a plan against in-memory product balances the way the ledger does
fn replay(
    balances: &mut HashMap<Uuid, i32>,
    plan: &[shared::MovementRequest],
) -> Result<(), DomainError> {
    for req in plan {
        req.validate()?;
        let current = balances.get(&req.product_id).copied().unwrap_or(0);
        let change = apply_delta(req.product_id, current, req.quantity_delta)?;
        balances.insert(req.product_id, change.new);
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Product at 10 counted at 7: one movement of -3 and the product ends at 7
    #[test]
    fn test_recount_example() {
        let product = Uuid::new_v4();
        let mut adj = approved(adjustment(&[(product, 10, 7)]));
        let mut balances: HashMap<Uuid, i32> = [(product, 10)].into_iter().collect();

        let plan = adj.apply(None, Utc::now()).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].quantity_delta, -3);
        assert_eq!(plan[0].movement_type, MovementType::Adjustment);
        assert_eq!(
            plan[0].reference.map(|r| r.reference_type),
            Some(ReferenceType::StockAdjustment)
        );

        replay(&mut balances, &plan).unwrap();
        assert_eq!(balances[&product], 7);
        assert_eq!(adj.status, AdjustmentStatus::Applied);
        assert!(adj.applied_at.is_some());
    }

    #[test]
    fn test_unchanged_lines_post_nothing() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut adj = approved(adjustment(&[(a, 5, 5), (b, 2, 4)]));
        let plan = adj.apply(None, Utc::now()).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].product_id, b);
    }

    #[test]
    fn test_value_adjustment() {
        let line = LineAdjustment::compute(10, 7, Decimal::new(1250, 2)).unwrap();
        assert_eq!(line.quantity_adjustment, -3);
        assert_eq!(line.value_adjustment, Decimal::new(-3750, 2));
    }

    #[test]
    fn test_apply_draft_fails() {
        let mut adj = adjustment(&[(Uuid::new_v4(), 1, 2)]);
        assert!(matches!(
            adj.apply(None, Utc::now()),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(adj.status, AdjustmentStatus::Draft);
    }

    #[test]
    fn test_double_apply_fails() {
        let mut adj = approved(adjustment(&[(Uuid::new_v4(), 1, 2)]));
        adj.apply(None, Utc::now()).unwrap();
        assert!(adj.apply(None, Utc::now()).is_err());
    }

    #[test]
    fn test_creator_cannot_approve() {
        let mut adj = adjustment(&[(Uuid::new_v4(), 1, 2)]);
        adj.submit().unwrap();
        let creator = adj.created_by;
        assert!(matches!(
            adj.approve(creator, Utc::now()),
            Err(DomainError::SameActor { .. })
        ));
        assert_eq!(adj.status, AdjustmentStatus::Pending);
    }

    #[test]
    fn test_cancel_blocked_after_apply() {
        let mut adj = approved(adjustment(&[(Uuid::new_v4(), 1, 2)]));
        adj.apply(None, Utc::now()).unwrap();
        assert!(adj.cancel().is_err());
    }

    #[test]
    fn test_edit_and_delete_windows() {
        let mut adj = adjustment(&[(Uuid::new_v4(), 1, 2)]);
        assert!(adj.ensure_editable().is_ok());
        assert!(adj.ensure_deletable().is_ok());

        adj.submit().unwrap();
        assert!(adj.ensure_editable().is_ok());
        assert!(adj.ensure_deletable().is_err());

        adj.approve(Uuid::new_v4(), Utc::now()).unwrap();
        assert!(adj.ensure_editable().is_err());
    }

    /// A failing line leaves every balance as it was once the batch is discarded
    #[test]
    fn test_failed_apply_rolls_back() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        // b's system quantity was recorded as 5 but only 1 is on hand now
        let mut adj = approved(adjustment(&[(a, 3, 8), (b, 5, 0)]));
        let original: HashMap<Uuid, i32> = [(a, 3), (b, 1)].into_iter().collect();

        let plan = adj.apply(None, Utc::now()).unwrap();
        let mut working = original.clone();
        assert!(replay(&mut working, &plan).is_err());
        // the transaction is dropped, so the committed state is the original
        assert_eq!(original[&a], 3);
        assert_eq!(original[&b], 1);
    }

    #[test]
    fn test_count_differences() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let levels: HashMap<Uuid, i32> = [(a, 10), (b, 4)].into_iter().collect();

        let diffs = count_differences(&[(a, 10), (b, 6), (c, 2)], &levels).unwrap();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].product_id, b);
        assert_eq!(diffs[1].current_quantity, 0);

        assert!(count_differences(&[(a, 10)], &levels).is_err());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn status_strategy() -> impl Strategy<Value = AdjustmentStatus> {
        prop::sample::select(AdjustmentStatus::ALL.to_vec())
    }

    fn lines_strategy() -> impl Strategy<Value = Vec<(i32, i32)>> {
        prop::collection::vec((0..500i32, 0..500i32), 1..10)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// quantity_adjustment == adjusted_quantity - current_quantity
        #[test]
        fn prop_adjustment_delta_law(current in 0..10_000i32, adjusted in 0..10_000i32) {
            prop_assert_eq!(adjustment_delta(current, adjusted), adjusted - current);
            let line = LineAdjustment::compute(current, adjusted, Decimal::ONE).unwrap();
            prop_assert_eq!(line.quantity_adjustment, adjusted - current);
            prop_assert_eq!(line.value_adjustment, Decimal::from(adjusted - current));
        }

        /// After apply every product moves by exactly its line's delta
        #[test]
        fn prop_apply_moves_each_product_by_its_delta(lines in lines_strategy()) {
            let products: Vec<(Uuid, i32, i32)> = lines
                .iter()
                .map(|(current, adjusted)| (Uuid::new_v4(), *current, *adjusted))
                .collect();
            let mut balances: HashMap<Uuid, i32> =
                products.iter().map(|(id, current, _)| (*id, *current)).collect();

            let mut adj = approved(adjustment(&products));
            let plan = adj.apply(Some(Uuid::new_v4()), Utc::now()).unwrap();
            replay(&mut balances, &plan).unwrap();

            for (id, current, adjusted) in &products {
                prop_assert_eq!(balances[id] - current, adjusted - current);
            }
            prop_assert_eq!(
                plan.len(),
                products.iter().filter(|(_, c, a)| c != a).count()
            );
        }

        /// Only the declared successors are reachable
        #[test]
        fn prop_transitions_follow_adjacency(from in status_strategy(), to in status_strategy()) {
            let allowed = matches!(
                (from, to),
                (AdjustmentStatus::Draft, AdjustmentStatus::Pending)
                    | (AdjustmentStatus::Draft, AdjustmentStatus::Cancelled)
                    | (AdjustmentStatus::Pending, AdjustmentStatus::Approved)
                    | (AdjustmentStatus::Pending, AdjustmentStatus::Cancelled)
                    | (AdjustmentStatus::Approved, AdjustmentStatus::Applied)
                    | (AdjustmentStatus::Approved, AdjustmentStatus::Cancelled)
            );
            prop_assert_eq!(from.can_transition_to(to), allowed);
            prop_assert_eq!(from.transition(to, "test").is_ok(), allowed);
        }
    }
}

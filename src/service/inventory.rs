use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::model::stock::{MovementType, StockTakeItem, TransferStatus};
use crate::service::round2;

/// Checks the location rules for a movement and returns the per-location
/// stock deltas it implies.
///
/// * `stock_in`, `return`: into `to`
/// * `stock_out`, `sale`: out of `from`
/// * `transfer`: out of `from`, into `to`, which must differ
/// * `adjustment`: exactly one side, `to` adds and `from` removes
pub fn movement_deltas(
    movement_type: MovementType,
    from: Option<u64>,
    to: Option<u64>,
    quantity: i64,
) -> ApiResult<Vec<(u64, i64)>> {
    if quantity <= 0 {
        return Err(ApiError::validation("Quantity must be greater than zero"));
    }

    match movement_type {
        MovementType::StockIn | MovementType::Return => {
            let to = to.ok_or_else(|| {
                ApiError::validation(format!("{movement_type} requires a destination location"))
            })?;
            Ok(vec![(to, quantity)])
        }
        MovementType::StockOut | MovementType::Sale => {
            let from = from.ok_or_else(|| {
                ApiError::validation(format!("{movement_type} requires a source location"))
            })?;
            Ok(vec![(from, -quantity)])
        }
        MovementType::Transfer => match (from, to) {
            (Some(f), Some(t)) if f == t => Err(ApiError::validation(
                "Source and destination locations must differ",
            )),
            (Some(f), Some(t)) => Ok(vec![(f, -quantity), (t, quantity)]),
            _ => Err(ApiError::validation(
                "transfer requires both source and destination locations",
            )),
        },
        MovementType::Adjustment => match (from, to) {
            (None, Some(t)) => Ok(vec![(t, quantity)]),
            (Some(f), None) => Ok(vec![(f, -quantity)]),
            _ => Err(ApiError::validation(
                "adjustment requires exactly one of source or destination",
            )),
        },
    }
}

/// Actions a caller can take on a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransferAction {
    Submit,
    Dispatch,
    Receive,
    Cancel,
}

pub fn next_transfer_status(
    current: TransferStatus,
    action: TransferAction,
) -> ApiResult<TransferStatus> {
    use TransferAction as A;
    use TransferStatus as S;

    match (current, action) {
        (S::Draft, A::Submit) => Ok(S::Pending),
        (S::Pending, A::Dispatch) => Ok(S::InTransit),
        (S::InTransit, A::Receive) => Ok(S::Completed),
        (S::Draft | S::Pending | S::InTransit, A::Cancel) => Ok(S::Cancelled),
        _ => Err(ApiError::validation(format!(
            "Cannot {action:?} a transfer that is {current}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransferLine {
    pub product_id: u64,
    pub quantity: i64,
    #[serde(default)]
    pub unit_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct ValuedTransferLine {
    pub product_id: u64,
    pub quantity: i64,
    pub unit_cost: f64,
    pub total_value: f64,
}

/// Validates transfer lines, merges repeated products and values them.
pub fn prepare_transfer_lines(
    from: u64,
    to: u64,
    lines: &[TransferLine],
) -> ApiResult<Vec<ValuedTransferLine>> {
    if from == to {
        return Err(ApiError::validation(
            "Source and destination locations must differ",
        ));
    }
    if lines.is_empty() {
        return Err(ApiError::validation("A transfer needs at least one item"));
    }

    let mut merged: BTreeMap<u64, (i64, f64)> = BTreeMap::new();
    for line in lines {
        if line.quantity < 1 {
            return Err(ApiError::validation(format!(
                "Quantity for product {} must be at least 1",
                line.product_id
            )));
        }
        if line.unit_cost < 0.0 {
            return Err(ApiError::validation("Unit cost cannot be negative"));
        }
        let entry = merged.entry(line.product_id).or_insert((0, line.unit_cost));
        entry.0 += line.quantity;
    }

    Ok(merged
        .into_iter()
        .map(|(product_id, (quantity, unit_cost))| ValuedTransferLine {
            product_id,
            quantity,
            unit_cost,
            total_value: round2(quantity as f64 * unit_cost),
        })
        .collect())
}

/// (difference, adjustment value) for one counted item.
pub fn count_difference(system: i64, physical: i64, unit_cost: f64) -> ApiResult<(i64, f64)> {
    if physical < 0 {
        return Err(ApiError::validation("Physical count cannot be negative"));
    }
    let difference = physical - system;
    Ok((difference, round2(difference as f64 * unit_cost)))
}

/// Folds repeated products into one count by summing their physical
/// quantities (a product counted on two shelves). Ordered by product id.
pub fn merge_counts(counts: &[(u64, i64)]) -> ApiResult<Vec<(u64, i64)>> {
    let mut merged: BTreeMap<u64, i64> = BTreeMap::new();
    for &(product_id, physical) in counts {
        if physical < 0 {
            return Err(ApiError::validation("Physical count cannot be negative"));
        }
        let entry = merged.entry(product_id).or_default();
        *entry = entry.saturating_add(physical);
    }
    Ok(merged.into_iter().collect())
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, ToSchema)]
pub struct StockTakeSummary {
    pub item_count: i64,
    pub changed_items: i64,
    pub items_over: i64,
    pub items_under: i64,
    pub total_difference: i64,
    pub total_adjustment_value: f64,
}

pub fn stock_take_summary(items: &[StockTakeItem]) -> StockTakeSummary {
    StockTakeSummary {
        item_count: items.len() as i64,
        changed_items: items.iter().filter(|i| i.difference != 0).count() as i64,
        items_over: items.iter().filter(|i| i.difference > 0).count() as i64,
        items_under: items.iter().filter(|i| i.difference < 0).count() as i64,
        total_difference: items.iter().map(|i| i.difference).sum(),
        total_adjustment_value: round2(items.iter().map(|i| i.adjustment_value).sum()),
    }
}

/// The adjustment movement that reconciles one counted item, if any.
///
/// Positive differences add stock into the location, negative ones remove
/// it. Quantity and value are absolute.
pub fn adjustment_for(item: &StockTakeItem, location_id: u64) -> Option<AdjustmentMovement> {
    if item.difference == 0 {
        return None;
    }
    let (from, to) = if item.difference > 0 {
        (None, Some(location_id))
    } else {
        (Some(location_id), None)
    };
    Some(AdjustmentMovement {
        product_id: item.product_id,
        from_location_id: from,
        to_location_id: to,
        quantity: item.difference.abs(),
        unit_cost: item.unit_cost,
        total_value: item.adjustment_value.abs(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentMovement {
    pub product_id: u64,
    pub from_location_id: Option<u64>,
    pub to_location_id: Option<u64>,
    pub quantity: i64,
    pub unit_cost: f64,
    pub total_value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_counts_are_summed_once() {
        let merged = merge_counts(&[(7, 3), (2, 1), (7, 4)]).unwrap();
        assert_eq!(merged, vec![(2, 1), (7, 7)]);
        assert!(merge_counts(&[(7, 3), (7, -1)]).is_err());
        assert!(merge_counts(&[]).unwrap().is_empty());
    }

    fn item(system: i64, physical: i64, cost: f64) -> StockTakeItem {
        let (difference, adjustment_value) = count_difference(system, physical, cost).unwrap();
        StockTakeItem {
            id: 1,
            stock_take_id: 1,
            product_id: 5,
            system_quantity: system,
            physical_quantity: physical,
            difference,
            unit_cost: cost,
            adjustment_value,
        }
    }

    #[test]
    fn movement_location_rules() {
        assert_eq!(
            movement_deltas(MovementType::StockIn, None, Some(2), 5).unwrap(),
            vec![(2, 5)]
        );
        assert!(movement_deltas(MovementType::StockIn, Some(1), None, 5).is_err());
        assert_eq!(
            movement_deltas(MovementType::StockOut, Some(1), None, 3).unwrap(),
            vec![(1, -3)]
        );
        assert!(movement_deltas(MovementType::StockOut, None, Some(1), 3).is_err());
        assert_eq!(
            movement_deltas(MovementType::Transfer, Some(1), Some(2), 4).unwrap(),
            vec![(1, -4), (2, 4)]
        );
        assert!(movement_deltas(MovementType::Transfer, Some(1), Some(1), 4).is_err());
        assert!(movement_deltas(MovementType::Transfer, Some(1), None, 4).is_err());
        assert!(movement_deltas(MovementType::Adjustment, Some(1), Some(2), 1).is_err());
        assert!(movement_deltas(MovementType::Adjustment, None, None, 1).is_err());
        assert_eq!(
            movement_deltas(MovementType::Adjustment, Some(3), None, 2).unwrap(),
            vec![(3, -2)]
        );
        assert!(movement_deltas(MovementType::StockIn, None, Some(2), 0).is_err());
    }

    #[test]
    fn transfer_state_machine() {
        use TransferAction as A;
        use TransferStatus as S;

        assert_eq!(next_transfer_status(S::Draft, A::Submit).unwrap(), S::Pending);
        assert_eq!(next_transfer_status(S::Pending, A::Dispatch).unwrap(), S::InTransit);
        assert_eq!(next_transfer_status(S::InTransit, A::Receive).unwrap(), S::Completed);
        assert_eq!(next_transfer_status(S::InTransit, A::Cancel).unwrap(), S::Cancelled);
        assert_eq!(next_transfer_status(S::Draft, A::Cancel).unwrap(), S::Cancelled);

        assert!(next_transfer_status(S::Draft, A::Dispatch).is_err());
        assert!(next_transfer_status(S::Pending, A::Receive).is_err());
        assert!(next_transfer_status(S::Completed, A::Cancel).is_err());
        assert!(next_transfer_status(S::Cancelled, A::Submit).is_err());
    }

    #[test]
    fn transfer_lines_merge_and_value() {
        let lines = vec![
            TransferLine { product_id: 9, quantity: 2, unit_cost: 10.0 },
            TransferLine { product_id: 4, quantity: 1, unit_cost: 2.5 },
            TransferLine { product_id: 9, quantity: 3, unit_cost: 10.0 },
        ];
        let prepared = prepare_transfer_lines(1, 2, &lines).unwrap();
        assert_eq!(prepared.len(), 2);
        assert_eq!(prepared[1].product_id, 9);
        assert_eq!(prepared[1].quantity, 5);
        assert_eq!(prepared[1].total_value, 50.0);

        assert!(prepare_transfer_lines(1, 1, &lines).is_err());
        assert!(prepare_transfer_lines(1, 2, &[]).is_err());
        assert!(
            prepare_transfer_lines(1, 2, &[TransferLine { product_id: 1, quantity: 0, unit_cost: 1.0 }])
                .is_err()
        );
    }

    #[test]
    fn difference_is_physical_minus_system() {
        assert_eq!(count_difference(10, 7, 2.5).unwrap(), (-3, -7.5));
        assert_eq!(count_difference(10, 12, 4.0).unwrap(), (2, 8.0));
        assert!(count_difference(10, -1, 4.0).is_err());
    }

    #[test]
    fn summary_and_adjustments() {
        let items = vec![item(10, 7, 2.5), item(5, 5, 1.0), item(3, 6, 4.0)];
        let summary = stock_take_summary(&items);
        assert_eq!(summary.changed_items, 2);
        assert_eq!(summary.items_over, 1);
        assert_eq!(summary.items_under, 1);
        assert_eq!(summary.total_difference, 0);
        assert_eq!(summary.total_adjustment_value, 4.5);

        let shrink = adjustment_for(&items[0], 7).unwrap();
        assert_eq!(shrink.from_location_id, Some(7));
        assert_eq!(shrink.quantity, 3);
        assert_eq!(shrink.total_value, 7.5);
        assert!(adjustment_for(&items[1], 7).is_none());
        assert_eq!(adjustment_for(&items[2], 7).unwrap().to_location_id, Some(7));
    }
}

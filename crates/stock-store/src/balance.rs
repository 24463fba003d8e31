use chrono::{DateTime, Utc};
use common::{LocationId, Lot, MaterialId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// Decimal places a persisted quantity keeps (`NUMERIC(20, 6)`).
pub const QUANTITY_SCALE: u32 = 6;

/// Largest quantity a movement or a balance may carry.
pub fn max_quantity() -> Decimal {
    Decimal::from_i128_with_scale(99_999_999_999_999_999_999, QUANTITY_SCALE)
}

/// Identifies one materialized balance.
///
/// The derived ordering (material, location, lot) is the global lock order:
/// every transaction locks balances in ascending key order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    pub material_id: MaterialId,
    pub location_id: LocationId,
    pub lot: Lot,
}

impl BalanceKey {
    pub fn new(material_id: MaterialId, location_id: LocationId, lot: Lot) -> Self {
        Self {
            material_id,
            location_id,
            lot,
        }
    }
}

impl std::fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}/{}", self.material_id, self.location_id, self.lot)
    }
}

/// How [`BalanceEntry::apply`] treats a delta that would take the balance
/// below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaPolicy {
    /// Reject the delta. Used by every stock-consuming movement.
    Reject,
    /// Truncate the result at zero. Used only by adjustments.
    ClampAtZero,
}

/// Outcome of applying a delta to a balance.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedDelta {
    /// The balance after the delta.
    pub entry: BalanceEntry,
    /// The delta the caller asked for.
    pub requested: Decimal,
    /// The delta that was actually applied after clamping.
    pub applied: Decimal,
}

impl AppliedDelta {
    /// Returns true if the requested delta was truncated.
    pub fn was_clamped(&self) -> bool {
        self.applied != self.requested
    }
}

/// Current on-hand and reserved quantities for a (material, location, lot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub key: BalanceKey,
    pub on_hand: Decimal,
    pub reserved: Decimal,
    pub last_movement_at: Option<DateTime<Utc>>,
}

impl BalanceEntry {
    /// An empty balance for a key that has never been moved.
    pub fn empty(key: BalanceKey) -> Self {
        Self {
            key,
            on_hand: Decimal::ZERO,
            reserved: Decimal::ZERO,
            last_movement_at: None,
        }
    }

    /// Quantity eligible for new outbound movements.
    pub fn available(&self) -> Decimal {
        self.on_hand - self.reserved
    }

    /// Computes the balance after applying a signed delta.
    ///
    /// With [`DeltaPolicy::Reject`] the delta fails if the result would drop
    /// below zero or below the reserved quantity. With
    /// [`DeltaPolicy::ClampAtZero`] the result is truncated at zero and the
    /// reserved quantity is trimmed so that `available` stays non-negative.
    /// Either way a result above [`max_quantity`] is a
    /// [`StoreError::QuantityOverflow`].
    pub fn apply(
        &self,
        delta: Decimal,
        policy: DeltaPolicy,
        at: DateTime<Utc>,
    ) -> Result<AppliedDelta> {
        let proposed = self
            .on_hand
            .checked_add(delta)
            .filter(|proposed| *proposed <= max_quantity())
            .ok_or_else(|| StoreError::QuantityOverflow {
                key: self.key.clone(),
                on_hand: self.on_hand,
                delta,
            })?;

        let on_hand = match policy {
            DeltaPolicy::Reject => {
                if proposed < Decimal::ZERO || proposed < self.reserved {
                    return Err(StoreError::InsufficientBalance {
                        key: self.key.clone(),
                        on_hand: self.on_hand,
                        reserved: self.reserved,
                        delta,
                    });
                }
                proposed
            }
            DeltaPolicy::ClampAtZero => proposed.max(Decimal::ZERO),
        };

        Ok(AppliedDelta {
            entry: BalanceEntry {
                key: self.key.clone(),
                on_hand,
                reserved: self.reserved.min(on_hand),
                last_movement_at: Some(at),
            },
            requested: delta,
            applied: on_hand - self.on_hand,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(on_hand: Decimal, reserved: Decimal) -> BalanceEntry {
        BalanceEntry {
            key: BalanceKey::new(MaterialId::new("M1"), LocationId::new("L1"), Lot::unlotted()),
            on_hand,
            reserved,
            last_movement_at: None,
        }
    }

    #[test]
    fn keys_order_by_material_then_location_then_lot() {
        let a = BalanceKey::new(MaterialId::new("M1"), LocationId::new("L2"), Lot::new("A"));
        let b = BalanceKey::new(MaterialId::new("M1"), LocationId::new("L10"), Lot::new("Z"));
        let c = BalanceKey::new(MaterialId::new("M2"), LocationId::new("L0"), Lot::new("A"));
        let mut keys = vec![c.clone(), a.clone(), b.clone()];
        keys.sort();
        assert_eq!(keys, vec![b, a, c]);
    }

    #[test]
    fn reject_policy_applies_positive_and_covered_deltas() {
        let applied = entry(dec!(100), dec!(0))
            .apply(dec!(-30), DeltaPolicy::Reject, Utc::now())
            .unwrap();
        assert_eq!(applied.entry.on_hand, dec!(70));
        assert_eq!(applied.applied, dec!(-30));
        assert!(!applied.was_clamped());
        assert!(applied.entry.last_movement_at.is_some());
    }

    #[test]
    fn reject_policy_refuses_negative_result() {
        let result = entry(dec!(70), dec!(0)).apply(dec!(-80), DeltaPolicy::Reject, Utc::now());
        assert!(matches!(
            result,
            Err(StoreError::InsufficientBalance { on_hand, .. }) if on_hand == dec!(70)
        ));
    }

    #[test]
    fn reject_policy_protects_reserved_quantity() {
        let balance = entry(dec!(10), dec!(4));
        assert_eq!(balance.available(), dec!(6));
        assert!(balance.apply(dec!(-7), DeltaPolicy::Reject, Utc::now()).is_err());
        assert!(balance.apply(dec!(-6), DeltaPolicy::Reject, Utc::now()).is_ok());
    }

    #[test]
    fn clamp_policy_truncates_at_zero() {
        let applied = entry(dec!(20), dec!(0))
            .apply(dec!(-50), DeltaPolicy::ClampAtZero, Utc::now())
            .unwrap();
        assert_eq!(applied.entry.on_hand, dec!(0));
        assert_eq!(applied.requested, dec!(-50));
        assert_eq!(applied.applied, dec!(-20));
        assert!(applied.was_clamped());
    }

    #[test]
    fn clamp_policy_trims_reserved() {
        let applied = entry(dec!(10), dec!(8))
            .apply(dec!(-5), DeltaPolicy::ClampAtZero, Utc::now())
            .unwrap();
        assert_eq!(applied.entry.on_hand, dec!(5));
        assert_eq!(applied.entry.reserved, dec!(5));
        assert_eq!(applied.entry.available(), dec!(0));
    }

    #[test]
    fn decimal_overflow_is_an_error() {
        let result = entry(Decimal::MAX, dec!(0)).apply(dec!(1), DeltaPolicy::Reject, Utc::now());
        assert!(matches!(
            result,
            Err(StoreError::QuantityOverflow { on_hand, delta, .. })
                if on_hand == Decimal::MAX && delta == dec!(1)
        ));

        let result =
            entry(Decimal::MAX, dec!(0)).apply(dec!(1), DeltaPolicy::ClampAtZero, Utc::now());
        assert!(matches!(result, Err(StoreError::QuantityOverflow { .. })));
    }

    #[test]
    fn balance_is_capped_at_storable_maximum() {
        let full = entry(max_quantity(), dec!(0));
        assert!(matches!(
            full.apply(dec!(0.000001), DeltaPolicy::Reject, Utc::now()),
            Err(StoreError::QuantityOverflow { .. })
        ));

        let applied = full
            .apply(dec!(-1), DeltaPolicy::Reject, Utc::now())
            .unwrap();
        assert_eq!(applied.entry.on_hand, max_quantity() - dec!(1));
        assert_eq!(max_quantity().scale(), QUANTITY_SCALE);
    }
}

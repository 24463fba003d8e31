//! Per-kind movement rules.

use stock_store::{DeltaPolicy, MovementKind};

/// Which location legs a movement kind takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegRequirement {
    /// Destination required, origin forbidden.
    DestinationOnly,
    /// Origin required, destination forbidden.
    OriginOnly,
    /// Both legs required.
    Both,
    /// Exactly one of the two legs.
    ExactlyOne,
}

/// How a movement kind changes the balances it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    /// Adds the quantity to the destination.
    Credit,
    /// Removes the quantity from the origin.
    Debit,
    /// Removes from the origin and adds the same quantity to the destination.
    Move,
    /// Applies a signed delta to the single leg, clamped at zero.
    Adjust,
}

/// Rules for one movement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPolicy {
    pub legs: LegRequirement,
    pub effect: BalanceEffect,
}

impl KindPolicy {
    /// Returns true if the quantity is a signed delta rather than a positive
    /// magnitude.
    pub const fn signed_quantity(&self) -> bool {
        matches!(self.effect, BalanceEffect::Adjust)
    }

    /// Policy used when applying this kind's deltas.
    pub const fn delta_policy(&self) -> DeltaPolicy {
        match self.effect {
            BalanceEffect::Adjust => DeltaPolicy::ClampAtZero,
            BalanceEffect::Credit | BalanceEffect::Debit | BalanceEffect::Move => {
                DeltaPolicy::Reject
            }
        }
    }

    /// Returns true if the origin leg loses stock and must be checked
    /// against the available quantity.
    pub const fn debits_origin(&self) -> bool {
        matches!(self.effect, BalanceEffect::Debit | BalanceEffect::Move)
    }
}

/// Looks up the rules for a movement kind.
pub const fn policy(kind: MovementKind) -> KindPolicy {
    use BalanceEffect::*;
    use LegRequirement::*;

    match kind {
        MovementKind::Receive => KindPolicy {
            legs: DestinationOnly,
            effect: Credit,
        },
        MovementKind::Dispatch => KindPolicy {
            legs: OriginOnly,
            effect: Debit,
        },
        MovementKind::Transfer => KindPolicy {
            legs: Both,
            effect: Move,
        },
        MovementKind::Consume => KindPolicy {
            legs: OriginOnly,
            effect: Debit,
        },
        MovementKind::Adjust => KindPolicy {
            legs: ExactlyOne,
            effect: Adjust,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_adjust_is_signed_and_clamped() {
        for kind in MovementKind::ALL {
            let rules = policy(kind);
            let is_adjust = kind == MovementKind::Adjust;
            assert_eq!(rules.signed_quantity(), is_adjust);
            assert_eq!(
                rules.delta_policy() == DeltaPolicy::ClampAtZero,
                is_adjust,
                "{kind}"
            );
        }
    }

    #[test]
    fn stock_consuming_kinds_debit_origin() {
        assert!(policy(MovementKind::Dispatch).debits_origin());
        assert!(policy(MovementKind::Consume).debits_origin());
        assert!(policy(MovementKind::Transfer).debits_origin());
        assert!(!policy(MovementKind::Receive).debits_origin());
        assert!(!policy(MovementKind::Adjust).debits_origin());
    }

    #[test]
    fn leg_requirements() {
        assert_eq!(policy(MovementKind::Receive).legs, LegRequirement::DestinationOnly);
        assert_eq!(policy(MovementKind::Transfer).legs, LegRequirement::Both);
        assert_eq!(policy(MovementKind::Adjust).legs, LegRequirement::ExactlyOne);
    }
}

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use common::{ActorId, LocationId, Lot, MaterialId, Plant};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::BalanceKey;

/// The closed set of movement kinds the ledger accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Receive,
    Dispatch,
    Transfer,
    Consume,
    Adjust,
}

impl MovementKind {
    /// Every kind, in declaration order.
    pub const ALL: [MovementKind; 5] = [
        MovementKind::Receive,
        MovementKind::Dispatch,
        MovementKind::Transfer,
        MovementKind::Consume,
        MovementKind::Adjust,
    ];

    /// Returns the stable upper-case name used in movement ids and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Receive => "RECEIVE",
            MovementKind::Dispatch => "DISPATCH",
            MovementKind::Transfer => "TRANSFER",
            MovementKind::Consume => "CONSUME",
            MovementKind::Adjust => "ADJUST",
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown movement kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMovementKind(pub String);

impl std::fmt::Display for UnknownMovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown movement kind: {}", self.0)
    }
}

impl std::error::Error for UnknownMovementKind {}

impl FromStr for MovementKind {
    type Err = UnknownMovementKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownMovementKind(s.to_string()))
    }
}

/// Human-readable, globally unique movement identifier:
/// `{plant}_{kind}_{yyyymmdd}_{seq}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(String);

impl MovementId {
    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MovementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MovementId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The (plant, kind, day) scope under which movement numbers are issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceScope {
    pub plant: Plant,
    pub kind: MovementKind,
    pub day: NaiveDate,
}

impl SequenceScope {
    /// Creates a scope for the UTC day containing `at`.
    pub fn new(plant: Plant, kind: MovementKind, at: DateTime<Utc>) -> Self {
        Self {
            plant,
            kind,
            day: at.date_naive(),
        }
    }

    /// Formats the movement id for the given sequence number in this scope.
    pub fn movement_id(&self, seq: u32) -> MovementId {
        MovementId(format!(
            "{}_{}_{}_{:04}",
            self.plant,
            self.kind,
            self.day.format("%Y%m%d"),
            seq
        ))
    }
}

/// An immutable ledger entry describing one accepted movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub movement_id: MovementId,
    pub kind: MovementKind,
    pub plant: Plant,
    pub material_id: MaterialId,
    pub lot: Lot,

    /// Requested quantity. A positive magnitude for every kind except
    /// ADJUST, where it is the caller's signed delta.
    pub quantity: Decimal,

    /// Signed change actually applied to the adjusted balance. Equal to
    /// `quantity` unless an ADJUST was clamped at zero.
    pub applied_quantity: Decimal,

    pub origin_location_id: Option<LocationId>,
    pub destination_location_id: Option<LocationId>,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub actor_id: ActorId,

    /// On-hand quantity of the origin balance right after this movement.
    pub origin_balance_after: Option<Decimal>,

    /// On-hand quantity of the destination balance right after this movement.
    pub destination_balance_after: Option<Decimal>,
}

impl MovementRecord {
    /// Balance key of the origin leg, if any.
    pub fn origin_key(&self) -> Option<BalanceKey> {
        self.origin_location_id.as_ref().map(|location| {
            BalanceKey::new(self.material_id.clone(), location.clone(), self.lot.clone())
        })
    }

    /// Balance key of the destination leg, if any.
    pub fn destination_key(&self) -> Option<BalanceKey> {
        self.destination_location_id.as_ref().map(|location| {
            BalanceKey::new(self.material_id.clone(), location.clone(), self.lot.clone())
        })
    }

    /// Every balance key this movement touched.
    pub fn touched_keys(&self) -> Vec<BalanceKey> {
        self.origin_key()
            .into_iter()
            .chain(self.destination_key())
            .collect()
    }

    /// Returns true if this movement references the given balance key.
    pub fn touches(&self, key: &BalanceKey) -> bool {
        self.material_id == key.material_id
            && self.lot == key.lot
            && (self.origin_location_id.as_ref() == Some(&key.location_id)
                || self.destination_location_id.as_ref() == Some(&key.location_id))
    }

    /// Signed quantity this movement contributed to the given balance.
    pub fn contribution(&self, key: &BalanceKey) -> Decimal {
        if !self.touches(key) {
            return Decimal::ZERO;
        }
        if self.kind == MovementKind::Adjust {
            return self.applied_quantity;
        }
        if self.destination_location_id.as_ref() == Some(&key.location_id) {
            self.quantity
        } else {
            -self.quantity
        }
    }

    /// On-hand snapshot recorded for the given balance, if it was touched.
    pub fn balance_after(&self, key: &BalanceKey) -> Option<Decimal> {
        if !self.touches(key) {
            return None;
        }
        if self.destination_location_id.as_ref() == Some(&key.location_id) {
            self.destination_balance_after
        } else {
            self.origin_balance_after
        }
    }

    /// Returns true if an ADJUST was truncated to keep the balance at zero.
    pub fn is_clamped(&self) -> bool {
        self.applied_quantity != self.quantity
    }
}

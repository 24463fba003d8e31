//! Movement requests, their validation and the receipt returned to callers.

use chrono::{DateTime, Utc};
use common::{ActorId, LocationId, Lot, MaterialId, Plant};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stock_store::{
    BalanceKey, MovementId, MovementKind, MovementRecord, QUANTITY_SCALE, max_quantity,
};

use crate::{
    error::{MovementError, Result},
    kind::{KindPolicy, LegRequirement, policy},
};

/// A caller's request to record one movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMovement {
    pub plant: Plant,
    pub kind: MovementKind,
    pub material_id: MaterialId,
    #[serde(default)]
    pub lot: Option<String>,
    /// Positive magnitude, or the signed delta for ADJUST.
    pub quantity: Decimal,
    #[serde(default)]
    pub origin_location_id: Option<LocationId>,
    #[serde(default)]
    pub destination_location_id: Option<LocationId>,
    pub actor_id: ActorId,
    /// When the physical movement happened. Defaults to the recording time.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl RecordMovement {
    fn base(
        kind: MovementKind,
        plant: impl Into<Plant>,
        material_id: impl Into<MaterialId>,
        quantity: Decimal,
        actor_id: impl Into<ActorId>,
    ) -> Self {
        Self {
            plant: plant.into(),
            kind,
            material_id: material_id.into(),
            lot: None,
            quantity,
            origin_location_id: None,
            destination_location_id: None,
            actor_id: actor_id.into(),
            occurred_at: None,
        }
    }

    /// Goods arriving at `destination`.
    pub fn receive(
        plant: impl Into<Plant>,
        material_id: impl Into<MaterialId>,
        destination: impl Into<LocationId>,
        quantity: Decimal,
        actor_id: impl Into<ActorId>,
    ) -> Self {
        Self {
            destination_location_id: Some(destination.into()),
            ..Self::base(MovementKind::Receive, plant, material_id, quantity, actor_id)
        }
    }

    /// Goods leaving the plant from `origin`.
    pub fn dispatch(
        plant: impl Into<Plant>,
        material_id: impl Into<MaterialId>,
        origin: impl Into<LocationId>,
        quantity: Decimal,
        actor_id: impl Into<ActorId>,
    ) -> Self {
        Self {
            origin_location_id: Some(origin.into()),
            ..Self::base(MovementKind::Dispatch, plant, material_id, quantity, actor_id)
        }
    }

    /// Goods used up in production at `origin`.
    pub fn consume(
        plant: impl Into<Plant>,
        material_id: impl Into<MaterialId>,
        origin: impl Into<LocationId>,
        quantity: Decimal,
        actor_id: impl Into<ActorId>,
    ) -> Self {
        Self {
            origin_location_id: Some(origin.into()),
            ..Self::base(MovementKind::Consume, plant, material_id, quantity, actor_id)
        }
    }

    /// Goods moved from `origin` to `destination`.
    pub fn transfer(
        plant: impl Into<Plant>,
        material_id: impl Into<MaterialId>,
        origin: impl Into<LocationId>,
        destination: impl Into<LocationId>,
        quantity: Decimal,
        actor_id: impl Into<ActorId>,
    ) -> Self {
        Self {
            origin_location_id: Some(origin.into()),
            destination_location_id: Some(destination.into()),
            ..Self::base(MovementKind::Transfer, plant, material_id, quantity, actor_id)
        }
    }

    /// A signed correction of the balance at `location`.
    pub fn adjust(
        plant: impl Into<Plant>,
        material_id: impl Into<MaterialId>,
        location: impl Into<LocationId>,
        delta: Decimal,
        actor_id: impl Into<ActorId>,
    ) -> Self {
        Self {
            destination_location_id: Some(location.into()),
            ..Self::base(MovementKind::Adjust, plant, material_id, delta, actor_id)
        }
    }

    /// Sets the lot.
    pub fn with_lot(mut self, lot: impl Into<String>) -> Self {
        self.lot = Some(lot.into());
        self
    }

    /// Sets when the physical movement happened.
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Checks the request shape against the kind's rules.
    ///
    /// Catalog existence and stock levels are not checked here.
    pub fn validate(&self) -> Result<MovementPlan> {
        let rules = policy(self.kind);

        if self.plant.is_blank() {
            return Err(invalid("plant is required"));
        }
        if self.material_id.is_blank() {
            return Err(invalid("material id is required"));
        }
        if self.actor_id.is_blank() {
            return Err(invalid("actor id is required"));
        }

        if rules.signed_quantity() {
            if self.quantity.is_zero() {
                return Err(invalid("adjustment delta must be non-zero"));
            }
        } else if self.quantity <= Decimal::ZERO {
            return Err(invalid(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }

        // Stored quantities keep six decimal places; finer digits would be
        // rounded away on insert.
        if self.quantity.normalize().scale() > QUANTITY_SCALE {
            return Err(invalid(format!(
                "quantity {} has more than {QUANTITY_SCALE} decimal places",
                self.quantity
            )));
        }
        if self.quantity.abs() > max_quantity() {
            return Err(invalid(format!(
                "quantity {} exceeds the maximum of {}",
                self.quantity,
                max_quantity()
            )));
        }

        let origin = leg(&self.origin_location_id, "origin")?;
        let destination = leg(&self.destination_location_id, "destination")?;

        match (rules.legs, &origin, &destination) {
            (LegRequirement::DestinationOnly, None, Some(_))
            | (LegRequirement::OriginOnly, Some(_), None)
            | (LegRequirement::Both, Some(_), Some(_))
            | (LegRequirement::ExactlyOne, Some(_), None)
            | (LegRequirement::ExactlyOne, None, Some(_)) => {}
            (LegRequirement::DestinationOnly, _, _) => {
                return Err(invalid(format!(
                    "{} requires a destination and no origin",
                    self.kind
                )));
            }
            (LegRequirement::OriginOnly, _, _) => {
                return Err(invalid(format!(
                    "{} requires an origin and no destination",
                    self.kind
                )));
            }
            (LegRequirement::Both, _, _) => {
                return Err(invalid(format!(
                    "{} requires both an origin and a destination",
                    self.kind
                )));
            }
            (LegRequirement::ExactlyOne, _, _) => {
                return Err(invalid(format!(
                    "{} requires exactly one of origin or destination",
                    self.kind
                )));
            }
        }

        if let (Some(o), Some(d)) = (&origin, &destination)
            && o == d
        {
            return Err(invalid("origin and destination must differ"));
        }

        Ok(MovementPlan {
            kind: self.kind,
            rules,
            plant: self.plant.clone(),
            material_id: self.material_id.clone(),
            lot: Lot::from_option(self.lot.clone()),
            quantity: self.quantity,
            origin,
            destination,
            actor_id: self.actor_id.clone(),
            occurred_at: self.occurred_at,
        })
    }
}

fn invalid(message: impl Into<String>) -> MovementError {
    MovementError::InvalidRequest(message.into())
}

fn leg(location: &Option<LocationId>, name: &str) -> Result<Option<LocationId>> {
    match location {
        Some(id) if id.is_blank() => Err(invalid(format!("{name} location id is empty"))),
        other => Ok(other.clone()),
    }
}

/// Which side of a movement a balance sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegRole {
    Origin,
    Destination,
}

/// One balance a movement changes, with the signed delta to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub role: LegRole,
    pub key: BalanceKey,
    pub delta: Decimal,
}

/// A validated request, ready to run against the store.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementPlan {
    pub kind: MovementKind,
    pub rules: KindPolicy,
    pub plant: Plant,
    pub material_id: MaterialId,
    pub lot: Lot,
    pub quantity: Decimal,
    pub origin: Option<LocationId>,
    pub destination: Option<LocationId>,
    pub actor_id: ActorId,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl MovementPlan {
    /// Every location the movement references.
    pub fn locations(&self) -> impl Iterator<Item = &LocationId> {
        self.origin.iter().chain(self.destination.iter())
    }

    fn key(&self, location: &LocationId) -> BalanceKey {
        BalanceKey::new(self.material_id.clone(), location.clone(), self.lot.clone())
    }

    /// The balances to change, in ascending key order.
    ///
    /// Locks must be taken in this order.
    pub fn legs(&self) -> Vec<Leg> {
        // An ADJUST carries its signed delta on whichever leg it names.
        let (origin_delta, destination_delta) = if self.rules.signed_quantity() {
            (self.quantity, self.quantity)
        } else {
            (-self.quantity, self.quantity)
        };

        let mut legs: Vec<Leg> = self
            .origin
            .iter()
            .map(|location| Leg {
                role: LegRole::Origin,
                key: self.key(location),
                delta: origin_delta,
            })
            .chain(self.destination.iter().map(|location| Leg {
                role: LegRole::Destination,
                key: self.key(location),
                delta: destination_delta,
            }))
            .collect();
        legs.sort_by(|a, b| a.key.cmp(&b.key));
        legs
    }
}

/// What a caller gets back for an accepted movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementReceipt {
    pub movement_id: MovementId,
    pub kind: MovementKind,
    pub applied_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_balance_after: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_balance_after: Option<Decimal>,
}

impl From<&MovementRecord> for MovementReceipt {
    fn from(record: &MovementRecord) -> Self {
        Self {
            movement_id: record.movement_id.clone(),
            kind: record.kind,
            applied_at: record.recorded_at,
            origin_balance_after: record.origin_balance_after,
            destination_balance_after: record.destination_balance_after,
        }
    }
}

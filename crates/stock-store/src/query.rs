use chrono::{DateTime, Utc};
use common::{LocationId, MaterialId, Plant};

use crate::{BalanceEntry, MovementKind, MovementRecord};

/// Builder for filtering ledger entries.
///
/// Results are always returned in ledger (insertion) order.
#[derive(Debug, Clone, Default)]
pub struct MovementQuery {
    /// Filter by material.
    pub material_id: Option<MaterialId>,

    /// Filter by location, matching either the origin or the destination leg.
    pub location_id: Option<LocationId>,

    /// Filter by plant.
    pub plant: Option<Plant>,

    /// Filter by kinds (any of these kinds).
    pub kinds: Option<Vec<MovementKind>>,

    /// Filter by movements recorded at or after this timestamp.
    pub from_recorded_at: Option<DateTime<Utc>>,

    /// Filter by movements recorded at or before this timestamp.
    pub to_recorded_at: Option<DateTime<Utc>>,

    /// Maximum number of movements to return.
    pub limit: Option<usize>,

    /// Number of movements to skip.
    pub offset: Option<usize>,
}

impl MovementQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by material.
    pub fn material(mut self, material_id: MaterialId) -> Self {
        self.material_id = Some(material_id);
        self
    }

    /// Filters by location on either leg.
    pub fn location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    /// Filters by plant.
    pub fn plant(mut self, plant: Plant) -> Self {
        self.plant = Some(plant);
        self
    }

    /// Filters by a single kind.
    pub fn kind(mut self, kind: MovementKind) -> Self {
        self.kinds = Some(vec![kind]);
        self
    }

    /// Filters by several kinds (any of these).
    pub fn kinds(mut self, kinds: Vec<MovementKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Filters to movements recorded at or after this timestamp.
    pub fn from_recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.from_recorded_at = Some(at);
        self
    }

    /// Filters to movements recorded at or before this timestamp.
    pub fn to_recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.to_recorded_at = Some(at);
        self
    }

    /// Limits the number of movements returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many movements before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the record passes every filter except paging.
    pub fn matches(&self, record: &MovementRecord) -> bool {
        if let Some(ref material) = self.material_id
            && &record.material_id != material
        {
            return false;
        }
        if let Some(ref location) = self.location_id
            && record.origin_location_id.as_ref() != Some(location)
            && record.destination_location_id.as_ref() != Some(location)
        {
            return false;
        }
        if let Some(ref plant) = self.plant
            && &record.plant != plant
        {
            return false;
        }
        if let Some(ref kinds) = self.kinds
            && !kinds.contains(&record.kind)
        {
            return false;
        }
        if let Some(from) = self.from_recorded_at
            && record.recorded_at < from
        {
            return false;
        }
        if let Some(to) = self.to_recorded_at
            && record.recorded_at > to
        {
            return false;
        }
        true
    }
}

/// Filter for listing materialized balances.
#[derive(Debug, Clone, Default)]
pub struct BalanceQuery {
    pub material_id: Option<MaterialId>,
    pub location_id: Option<LocationId>,
}

impl BalanceQuery {
    /// Creates a query matching every balance.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filters by material.
    pub fn material(mut self, material_id: MaterialId) -> Self {
        self.material_id = Some(material_id);
        self
    }

    /// Filters by location.
    pub fn location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    /// Returns true if the entry passes every filter.
    pub fn matches(&self, entry: &BalanceEntry) -> bool {
        self.material_id
            .as_ref()
            .is_none_or(|material| &entry.key.material_id == material)
            && self
                .location_id
                .as_ref()
                .is_none_or(|location| &entry.key.location_id == location)
    }
}

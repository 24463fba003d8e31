//! Material and location master data lookups.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use common::{LocationId, MaterialId, Plant};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised by a catalog gateway.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog backend could not be reached.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    /// Catalog data could not be parsed.
    #[error("Invalid catalog data: {0}")]
    Invalid(#[from] serde_json::Error),
}

fn default_active() -> bool {
    true
}

/// A material as known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogMaterial {
    pub id: MaterialId,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl CatalogMaterial {
    /// An active material.
    pub fn active(id: impl Into<MaterialId>) -> Self {
        Self {
            id: id.into(),
            description: None,
            active: true,
        }
    }

    /// A deactivated material.
    pub fn inactive(id: impl Into<MaterialId>) -> Self {
        Self {
            active: false,
            ..Self::active(id)
        }
    }
}

/// A warehouse location as known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogLocation {
    pub id: LocationId,
    pub plant: Plant,
    #[serde(default)]
    pub warehouse_code: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl CatalogLocation {
    /// An active location in a plant.
    pub fn active(id: impl Into<LocationId>, plant: impl Into<Plant>) -> Self {
        Self {
            id: id.into(),
            plant: plant.into(),
            warehouse_code: None,
            active: true,
        }
    }

    /// A deactivated location in a plant.
    pub fn inactive(id: impl Into<LocationId>, plant: impl Into<Plant>) -> Self {
        Self {
            active: false,
            ..Self::active(id, plant)
        }
    }
}

/// Read-only access to catalog master data.
///
/// `Ok(None)` means the identifier does not exist. `Err` is reserved for the
/// catalog itself failing.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn resolve_material(
        &self,
        id: &MaterialId,
    ) -> Result<Option<CatalogMaterial>, CatalogError>;

    async fn resolve_location(
        &self,
        id: &LocationId,
    ) -> Result<Option<CatalogLocation>, CatalogError>;
}

/// Catalog file layout accepted by [`InMemoryCatalog::from_json`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    materials: Vec<CatalogMaterial>,
    #[serde(default)]
    locations: Vec<CatalogLocation>,
}

#[derive(Debug, Default)]
struct CatalogData {
    materials: HashMap<MaterialId, CatalogMaterial>,
    locations: HashMap<LocationId, CatalogLocation>,
}

/// In-memory catalog for tests and the command line tool.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    data: Arc<RwLock<CatalogData>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a catalog from JSON of the form
    /// `{"materials": [{"id": ...}], "locations": [{"id": ..., "plant": ...}]}`.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let data = CatalogData {
            materials: file
                .materials
                .into_iter()
                .map(|m| (m.id.clone(), m))
                .collect(),
            locations: file
                .locations
                .into_iter()
                .map(|l| (l.id.clone(), l))
                .collect(),
        };
        Ok(Self {
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Adds or replaces a material.
    pub async fn insert_material(&self, material: CatalogMaterial) {
        self.data
            .write()
            .await
            .materials
            .insert(material.id.clone(), material);
    }

    /// Adds or replaces a location.
    pub async fn insert_location(&self, location: CatalogLocation) {
        self.data
            .write()
            .await
            .locations
            .insert(location.id.clone(), location);
    }

    /// Number of materials and locations held.
    pub async fn counts(&self) -> (usize, usize) {
        let data = self.data.read().await;
        (data.materials.len(), data.locations.len())
    }
}

#[async_trait]
impl CatalogGateway for InMemoryCatalog {
    async fn resolve_material(
        &self,
        id: &MaterialId,
    ) -> Result<Option<CatalogMaterial>, CatalogError> {
        Ok(self.data.read().await.materials.get(id).cloned())
    }

    async fn resolve_location(
        &self,
        id: &LocationId,
    ) -> Result<Option<CatalogLocation>, CatalogError> {
        Ok(self.data.read().await.locations.get(id).cloned())
    }
}

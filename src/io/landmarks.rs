//! Prior landmark table persistence.
//!
//! The table maps tag id to a calibrated 2D position and is loaded once at
//! startup; it is never mutated afterwards. Format is CSV with an
//! `id,x,y` header.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::types::Point2D;
use crate::error::Result;

#[derive(Debug, Serialize, Deserialize)]
struct LandmarkRecord {
    id: u32,
    x: f32,
    y: f32,
}

/// Tag id → prior position table.
#[derive(Debug, Clone, Default)]
pub struct LandmarkTable {
    map: BTreeMap<u32, Point2D>,
}

impl LandmarkTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the table from a CSV file.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let mut map = BTreeMap::new();
        for record in reader.deserialize() {
            let record: LandmarkRecord = record?;
            map.insert(record.id, Point2D::new(record.x, record.y));
        }
        log::info!("loaded {} prior landmarks from {}", map.len(), path.display());
        Ok(Self { map })
    }

    /// Write landmarks to a CSV file in the same format.
    pub fn save_csv<'a>(
        path: &Path,
        landmarks: impl Iterator<Item = (u32, &'a Point2D)>,
    ) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().from_path(path)?;
        for (id, point) in landmarks {
            writer.serialize(LandmarkRecord {
                id,
                x: point.x,
                y: point.y,
            })?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Insert an entry (table construction in hosts and tests).
    pub fn insert(&mut self, id: u32, point: Point2D) {
        self.map.insert(id, point);
    }

    /// Whether a tag id is in the table.
    pub fn contains(&self, id: u32) -> bool {
        self.map.contains_key(&id)
    }

    /// Prior position for a tag id.
    pub fn get(&self, id: u32) -> Option<&Point2D> {
        self.map.get(&id)
    }

    /// Iterate entries ascending by id.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Point2D)> {
        self.map.iter().map(|(id, point)| (*id, point))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

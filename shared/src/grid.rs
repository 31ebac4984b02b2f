use std::collections::BTreeMap;

use crate::colors::Color;
use crate::raster::{BaseGrid, GridDims};
use crate::store::{ClaimRecord, GridKey};

/// What changed in the grid, so the renderer can patch instead of rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellChange {
    Unchanged,
    Cell(GridKey),
}

/// Base raster plus claimed overrides and the claim cache behind them.
#[derive(Debug, Clone)]
pub struct GridState {
    base: BaseGrid,
    colors: Vec<Option<Color>>,
    claims: BTreeMap<GridKey, ClaimRecord>,
}

impl GridState {
    pub fn new(base: BaseGrid) -> Self {
        let colors = base.colors().to_vec();
        Self {
            base,
            colors,
            claims: BTreeMap::new(),
        }
    }

    pub fn dims(&self) -> GridDims {
        self.base.dims()
    }

    pub fn base(&self) -> &BaseGrid {
        &self.base
    }

    pub fn colors(&self) -> &[Option<Color>] {
        &self.colors
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Color> {
        self.dims().index(x, y).and_then(|i| self.colors[i])
    }

    /// Overwrite one cell's color. Out-of-range writes are dropped.
    pub fn set(&mut self, x: u32, y: u32, color: Color) -> CellChange {
        let Some(i) = self.dims().index(x, y) else {
            return CellChange::Unchanged;
        };
        if self.colors[i] == Some(color) {
            return CellChange::Unchanged;
        }
        self.colors[i] = Some(color);
        CellChange::Cell(GridKey::new(x, y))
    }

    /// Region the cell was rasterized into. Never changed by claims.
    pub fn region_at(&self, x: u32, y: u32) -> Option<&str> {
        self.base.region(x, y)
    }

    /// Claimant region when the cell is claimed, else its base region.
    pub fn attributed_region(&self, x: u32, y: u32) -> Option<&str> {
        let base = self.region_at(x, y)?;
        Some(
            self.claims
                .get(&GridKey::new(x, y))
                .map_or(base, |c| c.claimed_by_region.as_str()),
        )
    }

    pub fn is_paintable(&self, x: u32, y: u32) -> bool {
        self.region_at(x, y).is_some()
    }

    /// Record a claim and paint it. Out-of-range and unclaimable cells are ignored.
    pub fn apply_claim(&mut self, key: GridKey, record: ClaimRecord) -> CellChange {
        if !self.is_paintable(key.x, key.y) {
            return CellChange::Unchanged;
        }
        let color = record.color;
        self.claims.insert(key, record);
        self.set(key.x, key.y, color)
    }

    /// Drop the claim on one cell, restoring its base color.
    pub fn clear_claim(&mut self, key: GridKey) -> CellChange {
        if self.claims.remove(&key).is_none() {
            return CellChange::Unchanged;
        }
        let Some(i) = self.dims().index(key.x, key.y) else {
            return CellChange::Unchanged;
        };
        self.colors[i] = self.base.colors()[i];
        CellChange::Cell(key)
    }

    /// Drop every claim and return to the rasterized base.
    pub fn reset_all(&mut self) {
        self.claims.clear();
        self.colors.copy_from_slice(self.base.colors());
    }

    /// Swap in a freshly rasterized base and re-apply the claim cache on top.
    pub fn rebase(&mut self, base: BaseGrid) {
        self.colors = base.colors().to_vec();
        self.base = base;
        let claims = std::mem::take(&mut self.claims);
        for (key, record) in claims {
            self.apply_claim(key, record);
        }
    }

    pub fn claim(&self, key: &GridKey) -> Option<&ClaimRecord> {
        self.claims.get(key)
    }

    pub fn claims(&self) -> impl Iterator<Item = (&GridKey, &ClaimRecord)> {
        self.claims.iter()
    }

    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }
}

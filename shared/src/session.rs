//! The owned context a map surface works against.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::boundary::{DatasetError, FeatureCollection, Region, load_regions, sorted_names};
use crate::colors::Color;
use crate::config::GameConfig;
use crate::gesture::{InputEvent, ViewportController};
use crate::grid::GridState;
use crate::raster::{BaseGrid, Extent, rasterize};
use crate::store::{GridKey, StoreCommand};
use crate::sync::{JoinError, PaintError, PaintOutcome, RemoteClaims, SyncEngine};
use crate::viewport::Viewport;

/// Browser-local state that survives reloads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSession {
    pub region: Option<String>,
    pub color: Option<Color>,
    pub client_id: String,
    pub last_paint_ms: Option<i64>,
}

impl LocalSession {
    /// Fill in a client id from `generate` if none was saved. Returns true when one was generated.
    pub fn ensure_client_id(&mut self, generate: impl FnOnce() -> String) -> bool {
        if !self.client_id.is_empty() {
            return false;
        }
        self.client_id = generate();
        true
    }
}

/// Pending work for the renderer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invalidation {
    /// Rebuild the whole cell buffer.
    pub full: bool,
    /// Cells to patch when no full rebuild is pending.
    pub cells: Vec<GridKey>,
    /// Redraw the visible frame (pan, zoom, hover).
    pub frame: bool,
}

impl Invalidation {
    pub fn is_empty(&self) -> bool {
        !self.full && !self.frame && self.cells.is_empty()
    }

    fn mark_cells(&mut self, keys: impl IntoIterator<Item = GridKey>) {
        if !self.full {
            self.cells.extend(keys);
        }
        self.frame = true;
    }

    fn mark_full(&mut self) {
        self.full = true;
        self.cells.clear();
        self.frame = true;
    }
}

/// What one input event did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputOutcome {
    pub hover_changed: bool,
    pub paint: Option<Result<PaintOutcome, PaintError>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverInfo {
    pub region: String,
    pub defenders: usize,
}

impl std::fmt::Display for HoverInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.defenders {
            1 => write!(f, "{}: 1 defender", self.region),
            n => write!(f, "{}: {n} defenders", self.region),
        }
    }
}

pub struct MapSession {
    config: GameConfig,
    regions: Vec<Region>,
    region_names: Vec<String>,
    extent: Option<Extent>,
    grid: GridState,
    controller: ViewportController,
    sync: SyncEngine,
    invalidation: Invalidation,
}

impl MapSession {
    pub fn new(config: GameConfig, local: LocalSession) -> Self {
        let grid = GridState::new(BaseGrid::empty(config.grid));
        let controller = ViewportController::new(&config);
        let sync = SyncEngine::new(&config, local);
        Self {
            config,
            regions: Vec::new(),
            region_names: Vec::new(),
            extent: None,
            grid,
            controller,
            sync,
            invalidation: Invalidation::default(),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Replace the boundary dataset and rasterize it. Known claims are re-applied.
    pub fn load_dataset(&mut self, collection: &FeatureCollection) -> Vec<DatasetError> {
        let (regions, errors) = load_regions(collection);
        self.region_names = sorted_names(&regions);
        self.sync.set_regions(&regions);
        self.extent = self.config.extent.resolve(&regions);
        self.regions = regions;
        self.rebuild_base();
        errors
    }

    /// Re-rasterize with the extent chosen at load time.
    pub fn rebuild_base(&mut self) {
        let base = match &self.extent {
            Some(extent) => rasterize(&self.regions, self.config.grid, extent),
            None => BaseGrid::empty(self.config.grid),
        };
        self.grid.rebase(base);
        self.invalidation.mark_full();
    }

    /// Re-register presence for the saved region, if any.
    pub fn restore_selection(&mut self) -> Option<Result<(), JoinError>> {
        self.sync.restore_region()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Region names in chooser order.
    pub fn region_names(&self) -> &[String] {
        &self.region_names
    }

    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    pub fn viewport(&self) -> &Viewport {
        self.controller.viewport()
    }

    /// Single entry point for pointer, wheel, touch and resize input.
    pub fn handle_input(&mut self, event: InputEvent, now_ms: i64) -> InputOutcome {
        let resized = matches!(event, InputEvent::Resize { .. });
        let response = self.controller.handle(event);
        let mut outcome = InputOutcome::default();

        if resized {
            self.invalidation.mark_full();
        } else if response.redraw {
            self.invalidation.frame = true;
        }
        if response.hover.is_some() {
            outcome.hover_changed = true;
            self.invalidation.frame = true;
        }
        if let Some((x, y)) = response.paint {
            let result = self.sync.try_paint(&mut self.grid, x, y, now_ms);
            if let Ok(PaintOutcome::Painted(key)) = &result {
                self.invalidation.mark_cells([*key]);
            }
            outcome.paint = Some(result);
        }
        outcome
    }

    pub fn select_region(&mut self, name: &str) -> Result<(), JoinError> {
        self.sync.join_region(name)
    }

    pub fn selected_region(&self) -> Option<&str> {
        self.sync.selected_region()
    }

    pub fn selected_color(&self) -> Option<Color> {
        self.sync.selected_color()
    }

    pub fn set_user(&mut self, user: Option<String>) {
        self.sync.set_user(user);
    }

    pub fn user(&self) -> Option<&str> {
        self.sync.user()
    }

    pub fn client_id(&self) -> &str {
        &self.sync.session().client_id
    }

    /// Call once the page chrome has confirmed.
    pub fn request_reset(&mut self) {
        self.sync.reset(&mut self.grid);
        self.invalidation.mark_full();
    }

    pub fn apply_remote_claims(&mut self, value: &Value) -> RemoteClaims {
        let result = self.sync.apply_remote_claims(&mut self.grid, value);
        if result.reset {
            self.invalidation.mark_full();
        } else if !result.changed.is_empty() {
            self.invalidation.mark_cells(result.changed.iter().copied());
        }
        result
    }

    pub fn apply_presence(&mut self, value: &Value) {
        self.sync.apply_presence(value);
        if self.controller.hovered().is_some() {
            self.invalidation.frame = true;
        }
    }

    pub fn apply_remote_paint_time(&mut self, value: &Value, now_ms: i64) -> bool {
        self.sync.apply_remote_paint_time(value, now_ms)
    }

    pub fn presence_count(&self, region: &str) -> usize {
        self.sync.presence_count(region)
    }

    pub fn last_paint_ms(&self) -> Option<i64> {
        self.sync.last_paint_ms()
    }

    pub fn cooldown_remaining_ms(&self, now_ms: i64) -> i64 {
        self.sync.cooldown_remaining_ms(now_ms)
    }

    /// Tooltip content for the hovered cell; `None` outside the paintable area.
    pub fn hover_info(&self) -> Option<HoverInfo> {
        let (x, y) = self.controller.hovered()?;
        let region = self.grid.attributed_region(x, y)?;
        Some(HoverInfo {
            region: region.to_string(),
            defenders: self.sync.presence_count(region),
        })
    }

    pub fn hovered_cell(&self) -> Option<(u32, u32)> {
        self.controller.hovered()
    }

    pub fn take_commands(&mut self) -> Vec<StoreCommand> {
        self.sync.take_commands()
    }

    pub fn take_session_changed(&mut self) -> Option<LocalSession> {
        self.sync.take_session_changed()
    }

    /// True while invalidation is waiting for the renderer.
    pub fn needs_redraw(&self) -> bool {
        !self.invalidation.is_empty()
    }

    pub fn take_invalidation(&mut self) -> Invalidation {
        std::mem::take(&mut self.invalidation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::ExtentPolicy;
    use crate::raster::GridDims;

    fn dataset() -> FeatureCollection {
        serde_json::from_str(
            r#"{"features":[
                {"properties":{"name":"Zeta"},"geometry":{"type":"Polygon","coordinates":[[[0,0],[4,0],[4,4],[0,4],[0,0]]]}},
                {"properties":{"name":"Alpha"},"geometry":{"type":"Polygon","coordinates":[[[6,6],[10,6],[10,10],[6,10],[6,6]]]}}
            ]}"#,
        )
        .expect("test dataset parses")
    }

    fn session() -> MapSession {
        let config = GameConfig {
            grid: GridDims::new(10, 10),
            extent: ExtentPolicy::Dynamic,
            ..GameConfig::default()
        };
        let local = LocalSession {
            client_id: "abc123".to_string(),
            ..LocalSession::default()
        };
        let mut s = MapSession::new(config, local);
        assert!(s.load_dataset(&dataset()).is_empty());
        s.handle_input(
            InputEvent::Resize {
                width: 100.0,
                height: 100.0,
            },
            0,
        );
        s.take_invalidation();
        s
    }

    fn tap(s: &mut MapSession, x: f64, y: f64, now: i64) -> InputOutcome {
        s.handle_input(InputEvent::PointerDown { x, y, button: 0 }, now);
        s.handle_input(InputEvent::PointerUp { x, y }, now)
    }

    #[test]
    fn chooser_lists_names_alphabetically() {
        let s = session();
        assert_eq!(s.region_names(), ["Alpha", "Zeta"]);
    }

    #[test]
    fn tap_paints_through_the_sync_engine() {
        let mut s = session();
        s.select_region("Zeta").expect("known region");
        s.take_commands();

        // 10 px cells; (85, 15) is cell (8, 1), inside Alpha.
        let outcome = tap(&mut s, 85.0, 15.0, 1_000);
        assert_eq!(
            outcome.paint,
            Some(Ok(PaintOutcome::Painted(GridKey::new(8, 1))))
        );
        assert_eq!(s.grid().get(8, 1), s.selected_color());
        let inv = s.take_invalidation();
        assert!(!inv.full);
        assert_eq!(inv.cells, vec![GridKey::new(8, 1)]);
        assert_eq!(s.take_commands().len(), 1);
        assert_eq!(s.cooldown_remaining_ms(1_000), 300_000);
    }

    #[test]
    fn tap_without_region_reports_an_error() {
        let mut s = session();
        let outcome = tap(&mut s, 85.0, 15.0, 0);
        assert_eq!(outcome.paint, Some(Err(PaintError::NoRegion)));
        assert!(s.take_commands().is_empty());
    }

    #[test]
    fn hover_shows_attributed_region_and_defenders() {
        let mut s = session();
        s.apply_presence(&serde_json::json!({"Alpha": {"a": true, "b": true}}));
        s.handle_input(InputEvent::PointerMove { x: 85.0, y: 15.0 }, 0);
        let info = s.hover_info().expect("hovering a region");
        assert_eq!(info.to_string(), "Alpha: 2 defenders");

        s.handle_input(InputEvent::PointerMove { x: 55.0, y: 45.0 }, 0);
        assert_eq!(s.hover_info(), None);
        s.handle_input(InputEvent::PointerMove { x: 15.0, y: 85.0 }, 0);
        assert_eq!(s.hover_info().map(|h| h.to_string()).as_deref(), Some("Zeta: 0 defenders"));
        s.handle_input(InputEvent::PointerLeave, 0);
        assert_eq!(s.hover_info(), None);
    }

    #[test]
    fn reset_requests_a_full_rebuild() {
        let mut s = session();
        s.select_region("Zeta").expect("known region");
        tap(&mut s, 85.0, 15.0, 0);
        s.take_invalidation();
        s.request_reset();
        assert!(s.take_invalidation().full);
        assert_eq!(s.grid().claim_count(), 0);
    }

    #[test]
    fn saved_session_restores_presence() {
        let config = GameConfig {
            grid: GridDims::new(10, 10),
            extent: ExtentPolicy::Dynamic,
            ..GameConfig::default()
        };
        let local = LocalSession {
            region: Some("Alpha".to_string()),
            color: None,
            client_id: "abc123".to_string(),
            last_paint_ms: Some(5),
        };
        let mut s = MapSession::new(config, local);
        s.load_dataset(&dataset());
        assert_eq!(s.restore_selection(), Some(Ok(())));
        assert!(s.selected_color().is_some());
        let saved = s.take_session_changed().expect("color was re-derived");
        assert_eq!(saved.last_paint_ms, Some(5));
    }

    #[test]
    fn old_session_payloads_still_load() {
        let local: LocalSession =
            serde_json::from_str(r#"{"region":"Alpha"}"#).expect("partial payload loads");
        assert_eq!(local.region.as_deref(), Some("Alpha"));
        assert!(local.client_id.is_empty());

        let mut local = local;
        assert!(local.ensure_client_id(|| "fresh".to_string()));
        assert!(!local.ensure_client_id(|| "other".to_string()));
        assert_eq!(local.client_id, "fresh");
    }
}

//! Correlates render-side cells (column/row) with durable cell records (id).
//!
//! The two sides never share references. Everything goes through a
//! coordinate lookup built from the last loaded payload.

use std::collections::HashMap;

use glam::DVec2;
use worldgrid_protocol::{GridCell, GridPayload, InteractionMode};

use crate::store::{CellMetadata, GridConfigPatch, SelectionStore};
use crate::transform::CellAddr;

#[derive(Debug, Default, Clone)]
pub struct DomainSync {
    grid_id: Option<String>,
    cells: Vec<GridCell>,
    by_addr: HashMap<CellAddr, usize>,
    by_id: HashMap<String, CellAddr>,
}

impl DomainSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grid_id(&self) -> Option<&str> {
        self.grid_id.as_deref()
    }

    /// Durable cells from the last load, in row-major order.
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    /// Takes a durable grid payload. The store's config and background are
    /// only touched when they actually change; returns true when the config
    /// was patched.
    pub fn load(&mut self, store: &mut SelectionStore, payload: &GridPayload) -> bool {
        self.grid_id = Some(payload.grid.id.clone());
        self.cells = payload.cells.clone();
        self.by_addr = self
            .cells
            .iter()
            .enumerate()
            .map(|(i, c)| (CellAddr::new(c.x, c.y), i))
            .collect();
        self.by_id = self
            .cells
            .iter()
            .map(|c| (c.id.clone(), CellAddr::new(c.x, c.y)))
            .collect();

        let config = store.config();
        let patch = GridConfigPatch {
            cells_x: (config.cells_x != payload.grid.width).then_some(payload.grid.width),
            cells_y: (config.cells_y != payload.grid.height).then_some(payload.grid.height),
            ..GridConfigPatch::default()
        };
        let config_changed = patch.cells_x.is_some() || patch.cells_y.is_some();
        if config_changed {
            store.set_config(patch);
        }

        if store.background_url() != payload.image_url.as_deref() {
            store.set_background_url(payload.image_url.clone());
        }

        tracing::debug!(
            grid_id = %payload.grid.id,
            cells = self.cells.len(),
            config_changed,
            "durable grid loaded"
        );
        config_changed
    }

    pub fn resolve_addr(&self, addr: CellAddr) -> Option<&GridCell> {
        self.by_addr.get(&addr).map(|&i| &self.cells[i])
    }

    /// Durable records for a visual selection. Cells with no durable
    /// counterpart are dropped.
    pub fn resolve_selection(&self, selection: &[CellMetadata]) -> Vec<GridCell> {
        selection
            .iter()
            .filter_map(|meta| self.resolve_addr(meta.addr()))
            .cloned()
            .collect()
    }

    /// Durable cell covering a relative point on the surface.
    pub fn resolve_location(&self, store: &SelectionStore, point: DVec2) -> Option<&GridCell> {
        let config = store.config();
        if !config.has_cells() || !(0.0..=1.0).contains(&point.x) || !(0.0..=1.0).contains(&point.y) {
            return None;
        }
        let column = ((point.x * f64::from(config.cells_x)).floor() as u32).min(config.cells_x - 1);
        let row = ((point.y * f64::from(config.cells_y)).floor() as u32).min(config.cells_y - 1);
        self.resolve_addr(CellAddr::new(column, row))
    }

    /// Makes the durable cell with `cell_id` the only selected cell. An
    /// unknown or missing id clears the selection.
    pub fn activate_cell(&self, store: &mut SelectionStore, cell_id: Option<&str>) {
        let addr = cell_id.and_then(|id| self.by_id.get(id)).copied();
        match addr {
            Some(addr) => {
                let cells_x = store.config().cells_x;
                store.set_selected_cells(vec![CellMetadata::new(addr, cells_x)]);
            }
            None => {
                if let Some(id) = cell_id {
                    tracing::debug!(cell_id = id, "active cell not in grid, clearing selection");
                }
                store.clear_selection();
            }
        }
    }

    pub fn set_mode(&self, store: &mut SelectionStore, mode: InteractionMode) {
        if store.mode() != Some(mode) {
            store.set_mode(Some(mode));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldgrid_protocol::WorldGrid;

    fn payload(width: u32, height: u32, image_url: Option<&str>) -> GridPayload {
        let mut cells = Vec::new();
        for y in 0..height {
            for x in 0..width {
                cells.push(GridCell {
                    id: format!("cell-{x}-{y}"),
                    grid_id: "grid-1".into(),
                    x,
                    y,
                    walkable: true,
                    biome: None,
                    name: None,
                    description: None,
                    tags: Vec::new(),
                    region_id: None,
                    updated_at_ms: 0,
                });
            }
        }
        GridPayload {
            grid: WorldGrid {
                id: "grid-1".into(),
                world_id: "world-1".into(),
                width,
                height,
                home_cell_id: format!("cell-{}-{}", width / 2, height / 2),
                created_at_ms: 0,
                updated_at_ms: 0,
            },
            cells,
            image_url: image_url.map(str::to_string),
        }
    }

    #[test]
    fn load_patches_only_changed_config() {
        let mut store = SelectionStore::default();
        let mut sync = DomainSync::new();

        assert!(sync.load(&mut store, &payload(4, 3, None)));
        assert_eq!((store.config().cells_x, store.config().cells_y), (4, 3));
        let config_rev = store.config_revision();
        let background_rev = store.background_revision();

        assert!(!sync.load(&mut store, &payload(4, 3, None)));
        assert_eq!(store.config_revision(), config_rev);
        assert_eq!(store.background_revision(), background_rev);

        sync.load(&mut store, &payload(4, 3, Some("map.png")));
        assert_eq!(store.config_revision(), config_rev);
        assert_eq!(store.background_revision(), background_rev + 1);
        assert_eq!(store.background_url(), Some("map.png"));
    }

    #[test]
    fn load_with_matching_defaults_is_silent() {
        let mut store = SelectionStore::default();
        let mut sync = DomainSync::new();
        assert!(!sync.load(&mut store, &payload(16, 12, None)));
        assert_eq!(store.config_revision(), 0);
        assert_eq!(sync.cells().len(), 192);
    }

    #[test]
    fn selection_resolves_by_coordinate_and_drops_unknowns() {
        let mut store = SelectionStore::default();
        let mut sync = DomainSync::new();
        sync.load(&mut store, &payload(3, 3, None));

        let selection = vec![
            CellMetadata::new(CellAddr::new(2, 1), 3),
            CellMetadata::new(CellAddr::new(7, 7), 3),
            CellMetadata::new(CellAddr::new(0, 0), 3),
        ];
        let ids: Vec<String> = sync
            .resolve_selection(&selection)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["cell-2-1", "cell-0-0"]);
    }

    #[test]
    fn activate_cell_selects_or_clears() {
        let mut store = SelectionStore::default();
        let mut sync = DomainSync::new();
        sync.load(&mut store, &payload(4, 4, None));

        sync.activate_cell(&mut store, Some("cell-3-2"));
        assert_eq!(store.selected_cells().len(), 1);
        assert_eq!(store.selected_cells()[0].addr(), CellAddr::new(3, 2));
        assert_eq!(store.selected_cells()[0].index, 11);

        sync.activate_cell(&mut store, Some("cell-from-another-grid"));
        assert!(store.selected_cells().is_empty());

        sync.activate_cell(&mut store, Some("cell-1-1"));
        sync.activate_cell(&mut store, None);
        assert!(store.selected_cells().is_empty());
    }

    #[test]
    fn location_resolves_to_covering_cell() {
        let mut store = SelectionStore::default();
        let mut sync = DomainSync::new();
        sync.load(&mut store, &payload(4, 2, None));

        let cell = sync.resolve_location(&store, DVec2::new(0.6, 0.9)).unwrap();
        assert_eq!(cell.id, "cell-2-1");
        assert_eq!(
            sync.resolve_location(&store, DVec2::new(1.0, 1.0)).map(|c| c.id.as_str()),
            Some("cell-3-1")
        );
        assert!(sync.resolve_location(&store, DVec2::new(-0.1, 0.5)).is_none());
    }

    #[test]
    fn set_mode_forwards_changes() {
        let mut store = SelectionStore::default();
        let sync = DomainSync::new();
        sync.set_mode(&mut store, InteractionMode::Location);
        assert_eq!(store.mode(), Some(InteractionMode::Location));
        store.set_mode(None);
        sync.set_mode(&mut store, InteractionMode::Grid);
        assert_eq!(store.mode(), Some(InteractionMode::Grid));
    }
}

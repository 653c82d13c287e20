//! Per-session selection state shared by the surface and the sync bridge.
//!
//! Every mutation bumps a revision counter. The surface compares revisions on
//! [`crate::Surface::sync`] to decide between a full primitive rebuild (config
//! changed) and a cheap restyle (selection changed).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use worldgrid_protocol::{GridSnapshot, InteractionMode, SelectedCellRef};

use crate::transform::{index_of, CellAddr};

/// Aspect ratio used when the config carries no usable width/height.
pub const DEFAULT_ASPECT_RATIO: f64 = 0.75;

#[derive(Clone, Debug, PartialEq)]
pub struct GridConfig {
    pub width: f64,
    pub height: f64,
    pub cells_x: u32,
    pub cells_y: u32,
    pub show_grid: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            cells_x: 16,
            cells_y: 12,
            show_grid: true,
        }
    }
}

impl GridConfig {
    pub fn has_cells(&self) -> bool {
        self.cells_x > 0 && self.cells_y > 0
    }

    /// `height / width`, or [`DEFAULT_ASPECT_RATIO`] when either side is zero.
    pub fn aspect_ratio(&self) -> f64 {
        if self.width > 0.0 && self.height > 0.0 {
            self.height / self.width
        } else {
            DEFAULT_ASPECT_RATIO
        }
    }
}

/// Shallow patch for [`SelectionStore::set_config`]; `None` keeps the current value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridConfigPatch {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub cells_x: Option<u32>,
    pub cells_y: Option<u32>,
    pub show_grid: Option<bool>,
}

/// Handle to a drawable owned by the surface. Ids from an older build
/// generation never resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PrimitiveId {
    pub(crate) generation: u32,
    pub(crate) slot: u32,
}

impl PrimitiveId {
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }
}

/// Render-side cell. Correlated with durable cells by coordinate only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellMetadata {
    pub column: u32,
    pub row: u32,
    pub index: u32,
    pub selected: bool,
    pub primitive: Option<PrimitiveId>,
}

impl CellMetadata {
    pub fn new(addr: CellAddr, cells_x: u32) -> Self {
        Self {
            column: addr.column,
            row: addr.row,
            index: index_of(addr, cells_x),
            selected: false,
            primitive: None,
        }
    }

    pub fn addr(&self) -> CellAddr {
        CellAddr::new(self.column, self.row)
    }
}

/// Last rubber-band rectangle, corners already normalized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSelection {
    pub start_cell: CellAddr,
    pub end_cell: CellAddr,
}

impl RegionSelection {
    pub fn contains(&self, cell: CellAddr) -> bool {
        (self.start_cell.column..=self.end_cell.column).contains(&cell.column)
            && (self.start_cell.row..=self.end_cell.row).contains(&cell.row)
    }

    pub fn cell_count(&self) -> u32 {
        (self.end_cell.column.abs_diff(self.start_cell.column) + 1)
            * (self.end_cell.row.abs_diff(self.start_cell.row) + 1)
    }
}

#[derive(Clone, Debug)]
pub struct SelectionStore {
    config: GridConfig,
    background_url: Option<String>,
    mode: Option<InteractionMode>,
    selected: Vec<CellMetadata>,
    region: Option<RegionSelection>,
    config_rev: u64,
    selection_rev: u64,
    background_rev: u64,
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new(GridConfig::default())
    }
}

impl SelectionStore {
    pub fn new(config: GridConfig) -> Self {
        Self {
            config,
            background_url: None,
            mode: Some(InteractionMode::Grid),
            selected: Vec::new(),
            region: None,
            config_rev: 0,
            selection_rev: 0,
            background_rev: 0,
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Merges the patch into the config. Any call counts as a config change
    /// and makes the surface rebuild its primitives, so callers skip it when
    /// nothing differs. A dimension change re-indexes the selection against
    /// the new column count and drops cells that fell off the grid.
    pub fn set_config(&mut self, patch: GridConfigPatch) {
        let dims = (self.config.cells_x, self.config.cells_y);
        if let Some(width) = patch.width {
            self.config.width = width;
        }
        if let Some(height) = patch.height {
            self.config.height = height;
        }
        if let Some(cells_x) = patch.cells_x {
            self.config.cells_x = cells_x;
        }
        if let Some(cells_y) = patch.cells_y {
            self.config.cells_y = cells_y;
        }
        if let Some(show_grid) = patch.show_grid {
            self.config.show_grid = show_grid;
        }
        self.config_rev += 1;
        if dims != (self.config.cells_x, self.config.cells_y) {
            self.reindex_selection();
        }
    }

    fn reindex_selection(&mut self) {
        let GridConfig {
            cells_x, cells_y, ..
        } = self.config;
        let in_grid = |addr: CellAddr| addr.column < cells_x && addr.row < cells_y;
        self.selected.retain(|c| in_grid(c.addr()));
        for cell in &mut self.selected {
            cell.index = index_of(cell.addr(), cells_x);
        }
        if self
            .region
            .is_some_and(|r| !in_grid(r.start_cell) || !in_grid(r.end_cell))
        {
            self.region = None;
        }
        self.selection_rev += 1;
    }

    pub fn background_url(&self) -> Option<&str> {
        self.background_url.as_deref()
    }

    pub fn set_background_url(&mut self, url: Option<String>) {
        self.background_url = url;
        self.background_rev += 1;
    }

    /// `None` is the neutral state: no pointer gesture is active.
    pub fn mode(&self) -> Option<InteractionMode> {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Option<InteractionMode>) {
        self.mode = mode;
    }

    pub fn selected_cells(&self) -> &[CellMetadata] {
        &self.selected
    }

    pub fn is_selected(&self, cell: CellAddr) -> bool {
        self.selected.iter().any(|c| c.addr() == cell)
    }

    /// Adds the cell, or removes it when its index is already selected.
    pub fn toggle_cell(&mut self, cell: CellMetadata) {
        if let Some(pos) = self.selected.iter().position(|c| c.index == cell.index) {
            self.selected.remove(pos);
        } else {
            self.selected.push(CellMetadata {
                selected: true,
                ..cell
            });
        }
        self.selection_rev += 1;
    }

    /// Replaces the selection. Duplicate indices keep the last entry.
    pub fn set_selected_cells(&mut self, cells: Vec<CellMetadata>) {
        let mut positions: HashMap<u32, usize> = HashMap::with_capacity(cells.len());
        let mut selected: Vec<CellMetadata> = Vec::with_capacity(cells.len());
        for cell in cells {
            let cell = CellMetadata {
                selected: true,
                ..cell
            };
            match positions.get(&cell.index) {
                Some(&pos) => selected[pos] = cell,
                None => {
                    positions.insert(cell.index, selected.len());
                    selected.push(cell);
                }
            }
        }
        self.selected = selected;
        self.selection_rev += 1;
    }

    pub fn clear_selection(&mut self) {
        if self.selected.is_empty() {
            return;
        }
        self.selected.clear();
        self.selection_rev += 1;
    }

    pub fn region(&self) -> Option<RegionSelection> {
        self.region
    }

    /// Stores the rectangle spanned by two corners, in either order.
    pub fn set_region(&mut self, a: CellAddr, b: CellAddr) {
        self.region = Some(RegionSelection {
            start_cell: CellAddr::new(a.column.min(b.column), a.row.min(b.row)),
            end_cell: CellAddr::new(a.column.max(b.column), a.row.max(b.row)),
        });
    }

    pub fn config_revision(&self) -> u64 {
        self.config_rev
    }

    pub fn selection_revision(&self) -> u64 {
        self.selection_rev
    }

    pub fn background_revision(&self) -> u64 {
        self.background_rev
    }

    pub fn serialize(&self) -> GridSnapshot {
        GridSnapshot {
            width: self.config.width,
            height: self.config.height,
            cells_x: self.config.cells_x,
            cells_y: self.config.cells_y,
            show_grid: self.config.show_grid,
            world_image_url: self.background_url.clone(),
            selected_cells: self
                .selected
                .iter()
                .map(|c| SelectedCellRef {
                    x: c.column,
                    y: c.row,
                    index: c.index,
                })
                .collect(),
        }
    }
}

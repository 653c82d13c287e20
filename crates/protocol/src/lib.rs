use serde::{Deserialize, Serialize};

/// Placeholder stored in `WorldGrid::home_cell_id` until the home cell has been
/// inserted and resolved. A grid carrying it is not fully provisioned.
pub const HOME_CELL_PENDING: &str = "pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    Grid,
    Location,
}

impl Default for InteractionMode {
    fn default() -> Self {
        Self::Grid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: u32,
    pub y: u32,
}

impl GridCoord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldGrid {
    pub id: String,
    pub world_id: String,
    pub width: u32,
    pub height: u32,
    pub home_cell_id: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl WorldGrid {
    /// False while the home-cell back-reference still holds the sentinel.
    pub fn is_provisioned(&self) -> bool {
        self.home_cell_id != HOME_CELL_PENDING
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub id: String,
    pub grid_id: String,
    pub x: u32,
    pub y: u32,
    pub walkable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,
    pub updated_at_ms: i64,
}

impl GridCell {
    pub fn coord(&self) -> GridCoord {
        GridCoord::new(self.x, self.y)
    }
}

/// Per-cell values applied on top of the defaults when a grid is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellOverride {
    pub x: u32,
    pub y: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walkable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridTemplate {
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<GridCoord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cell_overrides: Vec<CellOverride>,
}

impl GridTemplate {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Explicit home, else the rounded-down center.
    pub fn home_coord(&self) -> GridCoord {
        self.home
            .unwrap_or_else(|| GridCoord::new(self.width / 2, self.height / 2))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultGridRequest {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Partial update of a cell's descriptive fields. Coordinates and grid
/// membership are not part of the shape, so a payload naming them is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CellPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walkable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl CellPatch {
    pub fn is_empty(&self) -> bool {
        self.walkable.is_none()
            && self.biome.is_none()
            && self.name.is_none()
            && self.description.is_none()
            && self.tags.is_none()
    }
}

/// Grid plus its cells ordered by row, as handed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPayload {
    pub grid: WorldGrid,
    pub cells: Vec<GridCell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedCellRef {
    pub x: u32,
    pub y: u32,
    pub index: u32,
}

/// Persistable projection of the client-side selection state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSnapshot {
    pub width: f64,
    pub height: f64,
    pub cells_x: u32,
    pub cells_y: u32,
    pub show_grid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_image_url: Option<String>,
    pub selected_cells: Vec<SelectedCellRef>,
}

pub mod events {
    pub const GRID_CREATED: &str = "grid.created";
    pub const GRID_DELETED: &str = "grid.deleted";
    pub const CELL_UPDATED: &str = "cell.updated";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_defaults_to_floor_center() {
        assert_eq!(GridTemplate::new(4, 4).home_coord(), GridCoord::new(2, 2));
        assert_eq!(GridTemplate::new(5, 3).home_coord(), GridCoord::new(2, 1));
    }

    #[test]
    fn cell_patch_rejects_coordinates() {
        let err = serde_json::from_str::<CellPatch>(r#"{"x": 3, "walkable": false}"#);
        assert!(err.is_err());

        let ok: CellPatch = serde_json::from_str(r#"{"walkable": false, "biome": "marsh"}"#)
            .expect("patch");
        assert_eq!(ok.walkable, Some(false));
        assert_eq!(ok.biome.as_deref(), Some("marsh"));
    }

    #[test]
    fn snapshot_omits_missing_image() {
        let snap = GridSnapshot {
            width: 800.0,
            height: 600.0,
            cells_x: 4,
            cells_y: 3,
            show_grid: true,
            world_image_url: None,
            selected_cells: Vec::new(),
        };
        let v = serde_json::to_value(&snap).unwrap();
        assert!(v.get("worldImageUrl").is_none());
        assert_eq!(v["selectedCells"], serde_json::json!([]));
        assert_eq!(v["cellsX"], 4);
    }

    #[test]
    fn unprovisioned_grid_is_detected() {
        let mut grid = WorldGrid {
            id: "grid-1".into(),
            world_id: "w".into(),
            width: 2,
            height: 2,
            home_cell_id: HOME_CELL_PENDING.into(),
            created_at_ms: 0,
            updated_at_ms: 0,
        };
        assert!(!grid.is_provisioned());
        grid.home_cell_id = "cell-9".into();
        assert!(grid.is_provisioned());
    }
}

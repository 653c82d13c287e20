use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};
use worldgrid_protocol::{
    events, CellOverride, CellPatch, DefaultGridRequest, GridCell, GridPayload, GridTemplate,
    WorldGrid, HOME_CELL_PENDING,
};

use crate::connectivity::{bfs_distances, bfs_shortest_path, Adjacency};
use crate::{append_event_tx, new_id, now_ms, Engine, GridError};

pub const DEFAULT_GRID_WIDTH: u32 = 16;
pub const DEFAULT_GRID_HEIGHT: u32 = 12;
pub const MAX_GRID_CELLS: u64 = 65_536;

/// How far a grid got through creation. Each phase is committed on its own,
/// so a crash can leave a grid parked before `HomeResolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionPhase {
    ShellCreated,
    CellsInserted,
    HomeResolved,
}

const GRID_COLUMNS: &str = "id, world_id, width, height, home_cell_id, created_at_ms, updated_at_ms";
const CELL_COLUMNS: &str =
    "id, grid_id, x, y, walkable, biome, name, description, tags_json, region_id, updated_at_ms";

impl Engine {
    /// Grid and its cells for a world, cells ordered by row then column.
    pub fn get_world_grid(&self, world_id: &str) -> Result<GridPayload, GridError> {
        let conn = self.open()?;
        let grid = find_grid(&conn, world_id)?.ok_or_else(|| GridError::grid_not_found(world_id))?;
        let cells = load_cells(&conn, &grid.id)?;
        Ok(GridPayload {
            grid,
            cells,
            image_url: None,
        })
    }

    pub fn get_cell(&self, cell_id: &str) -> Result<GridCell, GridError> {
        let conn = self.open()?;
        find_cell(&conn, cell_id)?.ok_or_else(|| GridError::cell_not_found(cell_id))
    }

    /// Where the world's grid stands in the create sequence.
    pub fn provision_phase(&self, world_id: &str) -> Result<ProvisionPhase, GridError> {
        let conn = self.open()?;
        let grid = find_grid(&conn, world_id)?.ok_or_else(|| GridError::grid_not_found(world_id))?;
        if grid.is_provisioned() {
            return Ok(ProvisionPhase::HomeResolved);
        }
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM grid_cells WHERE grid_id = ?1",
            [&grid.id],
            |row| row.get(0),
        )?;
        if count == i64::from(grid.width) * i64::from(grid.height) {
            Ok(ProvisionPhase::CellsInserted)
        } else {
            Ok(ProvisionPhase::ShellCreated)
        }
    }

    pub fn create_grid(
        &self,
        world_id: &str,
        template: &GridTemplate,
    ) -> Result<WorldGrid, GridError> {
        validate_template(template)?;
        let mut conn = self.open()?;
        if find_grid(&conn, world_id)?.is_some() {
            return Err(GridError::AlreadyExists {
                world_id: world_id.to_string(),
            });
        }

        let grid = insert_shell(&mut conn, world_id, template)?;
        tracing::debug!(world_id, grid_id = %grid.id, phase = ?ProvisionPhase::ShellCreated, "grid shell inserted");

        let inserted = insert_cells(&mut conn, &grid, template)?;
        tracing::debug!(world_id, grid_id = %grid.id, inserted, phase = ?ProvisionPhase::CellsInserted, "grid cells inserted");

        let grid = resolve_home(&mut conn, grid, template)?;
        tracing::info!(
            world_id,
            grid_id = %grid.id,
            width = grid.width,
            height = grid.height,
            home_cell_id = %grid.home_cell_id,
            "grid created"
        );
        Ok(grid)
    }

    /// Deletes the world's grid and all of its cells. Returns false when there
    /// was nothing to delete.
    pub fn delete_grid(&self, world_id: &str) -> Result<bool, GridError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let grid_id: Option<String> = tx
            .query_row(
                "SELECT id FROM world_grids WHERE world_id = ?1",
                [world_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(grid_id) = grid_id else {
            return Ok(false);
        };

        let cells = tx.execute("DELETE FROM grid_cells WHERE grid_id = ?1", [&grid_id])?;
        tx.execute("DELETE FROM world_grids WHERE id = ?1", [&grid_id])?;
        append_event_tx(
            &tx,
            events::GRID_DELETED,
            Some(&grid_id),
            serde_json::json!({ "worldId": world_id, "gridId": grid_id, "cells": cells }),
        )?;
        tx.commit()?;
        tracing::info!(world_id, grid_id = %grid_id, cells, "grid deleted");
        Ok(true)
    }

    /// Destructive: every per-cell annotation of the previous grid is lost.
    pub fn replace_grid(
        &self,
        world_id: &str,
        template: &GridTemplate,
    ) -> Result<WorldGrid, GridError> {
        validate_template(template)?;
        self.delete_grid(world_id)?;
        self.create_grid(world_id, template)
    }

    pub fn create_default_grid(
        &self,
        world_id: &str,
        request: DefaultGridRequest,
    ) -> Result<WorldGrid, GridError> {
        let template = GridTemplate::new(
            request.width.unwrap_or(DEFAULT_GRID_WIDTH),
            request.height.unwrap_or(DEFAULT_GRID_HEIGHT),
        );
        self.create_grid(world_id, &template)
    }

    /// Patches the descriptive fields of one cell. Last write wins.
    pub fn update_cell(&self, cell_id: &str, patch: &CellPatch) -> Result<GridCell, GridError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut cell = find_cell(&tx, cell_id)?.ok_or_else(|| GridError::cell_not_found(cell_id))?;

        if let Some(walkable) = patch.walkable {
            cell.walkable = walkable;
        }
        if let Some(biome) = &patch.biome {
            cell.biome = Some(biome.clone());
        }
        if let Some(name) = &patch.name {
            cell.name = Some(name.clone());
        }
        if let Some(description) = &patch.description {
            cell.description = Some(description.clone());
        }
        if let Some(tags) = &patch.tags {
            cell.tags = tags.clone();
        }
        cell.updated_at_ms = now_ms();

        tx.execute(
            "UPDATE grid_cells
             SET walkable = ?2, biome = ?3, name = ?4, description = ?5, tags_json = ?6, updated_at_ms = ?7
             WHERE id = ?1",
            (
                &cell.id,
                cell.walkable,
                &cell.biome,
                &cell.name,
                &cell.description,
                serde_json::to_string(&cell.tags)?,
                cell.updated_at_ms,
            ),
        )?;
        append_event_tx(
            &tx,
            events::CELL_UPDATED,
            Some(&cell.id),
            serde_json::json!({ "id": cell.id, "gridId": cell.grid_id, "patch": patch }),
        )?;
        tx.commit()?;
        tracing::debug!(cell_id, grid_id = %cell.grid_id, "cell updated");
        Ok(cell)
    }

    /// Hop counts from one cell of the world's grid to every reachable cell.
    pub fn grid_distances(
        &self,
        world_id: &str,
        from_cell_id: &str,
    ) -> Result<HashMap<String, u32>, GridError> {
        let payload = self.get_world_grid(world_id)?;
        let adjacency = Adjacency::build(&payload.cells);
        if !adjacency.contains(from_cell_id) {
            return Err(GridError::cell_not_found(from_cell_id));
        }
        Ok(bfs_distances(&adjacency, from_cell_id))
    }

    /// Shortest walkable path between two cells of the world's grid; `None`
    /// when they are disconnected.
    pub fn grid_path(
        &self,
        world_id: &str,
        from_cell_id: &str,
        to_cell_id: &str,
    ) -> Result<Option<Vec<String>>, GridError> {
        let payload = self.get_world_grid(world_id)?;
        let adjacency = Adjacency::build(&payload.cells);
        for id in [from_cell_id, to_cell_id] {
            if !adjacency.contains(id) {
                return Err(GridError::cell_not_found(id));
            }
        }
        Ok(bfs_shortest_path(&adjacency, from_cell_id, to_cell_id))
    }
}

fn validate_template(template: &GridTemplate) -> Result<(), GridError> {
    if template.width == 0 || template.height == 0 {
        return Err(GridError::InvalidTemplate(format!(
            "dimensions must be positive, got {}x{}",
            template.width, template.height
        )));
    }
    let total = u64::from(template.width) * u64::from(template.height);
    if total > MAX_GRID_CELLS {
        return Err(GridError::InvalidTemplate(format!(
            "{total} cells exceeds the limit of {MAX_GRID_CELLS}"
        )));
    }
    if let Some(o) = template
        .cell_overrides
        .iter()
        .find(|o| o.x >= template.width || o.y >= template.height)
    {
        return Err(GridError::InvalidTemplate(format!(
            "override at ({}, {}) lies outside the {}x{} grid",
            o.x, o.y, template.width, template.height
        )));
    }
    Ok(())
}

fn insert_shell(
    conn: &mut Connection,
    world_id: &str,
    template: &GridTemplate,
) -> Result<WorldGrid, GridError> {
    let ts = now_ms();
    let grid = WorldGrid {
        id: new_id("grid"),
        world_id: world_id.to_string(),
        width: template.width,
        height: template.height,
        home_cell_id: HOME_CELL_PENDING.to_string(),
        created_at_ms: ts,
        updated_at_ms: ts,
    };
    let tx = conn.transaction()?;
    // A concurrent create can win between the existence check and this insert.
    tx.execute(
        "INSERT INTO world_grids (id, world_id, width, height, home_cell_id, created_at_ms, updated_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        (
            &grid.id,
            &grid.world_id,
            grid.width,
            grid.height,
            &grid.home_cell_id,
            ts,
        ),
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            GridError::AlreadyExists {
                world_id: world_id.to_string(),
            }
        } else {
            e.into()
        }
    })?;
    tx.commit()?;
    Ok(grid)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn insert_cells(
    conn: &mut Connection,
    grid: &WorldGrid,
    template: &GridTemplate,
) -> Result<usize, GridError> {
    let overrides: HashMap<(u32, u32), &CellOverride> = template
        .cell_overrides
        .iter()
        .map(|o| ((o.x, o.y), o))
        .collect();
    let ts = now_ms();
    let mut inserted = 0;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO grid_cells (id, grid_id, x, y, walkable, biome, name, description, tags_json, region_id, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10)",
        )?;
        for y in 0..grid.height {
            for x in 0..grid.width {
                let o = overrides.get(&(x, y)).copied();
                let tags = o.and_then(|o| o.tags.clone()).unwrap_or_default();
                stmt.execute((
                    new_id("cell"),
                    &grid.id,
                    x,
                    y,
                    o.and_then(|o| o.walkable).unwrap_or(true),
                    o.and_then(|o| o.biome.as_deref()),
                    o.and_then(|o| o.name.as_deref()),
                    o.and_then(|o| o.description.as_deref()),
                    serde_json::to_string(&tags)?,
                    ts,
                ))?;
                inserted += 1;
            }
        }
    }
    tx.commit()?;
    Ok(inserted)
}

fn resolve_home(
    conn: &mut Connection,
    mut grid: WorldGrid,
    template: &GridTemplate,
) -> Result<WorldGrid, GridError> {
    let home = template.home_coord();
    let tx = conn.transaction()?;
    let home_cell_id: Option<String> = tx
        .query_row(
            "SELECT id FROM grid_cells WHERE grid_id = ?1 AND x = ?2 AND y = ?3",
            (&grid.id, home.x, home.y),
            |row| row.get(0),
        )
        .optional()?;
    let Some(home_cell_id) = home_cell_id else {
        tracing::error!(
            world_id = %grid.world_id,
            grid_id = %grid.id,
            x = home.x,
            y = home.y,
            "home coordinate has no cell; grid left unprovisioned"
        );
        return Err(GridError::TemplateMismatch {
            x: home.x,
            y: home.y,
            width: grid.width,
            height: grid.height,
        });
    };

    grid.home_cell_id = home_cell_id;
    grid.updated_at_ms = now_ms();
    tx.execute(
        "UPDATE world_grids SET home_cell_id = ?2, updated_at_ms = ?3 WHERE id = ?1",
        (&grid.id, &grid.home_cell_id, grid.updated_at_ms),
    )?;
    append_event_tx(
        &tx,
        events::GRID_CREATED,
        Some(&grid.id),
        serde_json::json!({
            "worldId": grid.world_id,
            "gridId": grid.id,
            "width": grid.width,
            "height": grid.height,
            "homeCellId": grid.home_cell_id,
        }),
    )?;
    tx.commit()?;
    Ok(grid)
}

fn find_grid(conn: &Connection, world_id: &str) -> Result<Option<WorldGrid>, GridError> {
    let sql = format!("SELECT {GRID_COLUMNS} FROM world_grids WHERE world_id = ?1");
    let grid = conn
        .query_row(&sql, [world_id], |row| {
            Ok(WorldGrid {
                id: row.get(0)?,
                world_id: row.get(1)?,
                width: row.get(2)?,
                height: row.get(3)?,
                home_cell_id: row.get(4)?,
                created_at_ms: row.get(5)?,
                updated_at_ms: row.get(6)?,
            })
        })
        .optional()?;
    Ok(grid)
}

fn load_cells(conn: &Connection, grid_id: &str) -> Result<Vec<GridCell>, GridError> {
    let sql = format!("SELECT {CELL_COLUMNS} FROM grid_cells WHERE grid_id = ?1 ORDER BY y, x");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([grid_id], read_cell_row)?;
    let mut cells = Vec::new();
    for row in rows {
        cells.push(finish_cell(row?)?);
    }
    Ok(cells)
}

fn find_cell(conn: &Connection, cell_id: &str) -> Result<Option<GridCell>, GridError> {
    let sql = format!("SELECT {CELL_COLUMNS} FROM grid_cells WHERE id = ?1");
    let row = conn.query_row(&sql, [cell_id], read_cell_row).optional()?;
    row.map(finish_cell).transpose()
}

/// Raw row with tags still encoded.
type CellRow = (GridCell, String);

fn read_cell_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CellRow> {
    Ok((
        GridCell {
            id: row.get(0)?,
            grid_id: row.get(1)?,
            x: row.get(2)?,
            y: row.get(3)?,
            walkable: row.get(4)?,
            biome: row.get(5)?,
            name: row.get(6)?,
            description: row.get(7)?,
            tags: Vec::new(),
            region_id: row.get(9)?,
            updated_at_ms: row.get(10)?,
        },
        row.get(8)?,
    ))
}

fn finish_cell((mut cell, tags_json): CellRow) -> Result<GridCell, GridError> {
    cell.tags = serde_json::from_str(&tags_json)?;
    Ok(cell)
}

//! Pixel, relative and cell coordinate conversions for a grid drawn over a
//! surface of a given size.

use glam::DVec2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SurfaceSize {
    pub width: f64,
    pub height: f64,
}

impl SurfaceSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// True when either side moved by more than `epsilon` pixels.
    pub fn differs_from(&self, other: SurfaceSize, epsilon: f64) -> bool {
        (self.width - other.width).abs() > epsilon || (self.height - other.height).abs() > epsilon
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellAddr {
    pub column: u32,
    pub row: u32,
}

impl CellAddr {
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }
}

/// Axis-aligned pixel rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    /// Rectangle spanning two corners in any order.
    pub fn from_corners(a: DVec2, b: DVec2) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        Self {
            x: min.x,
            y: min.y,
            width: max.x - min.x,
            height: max.y - min.y,
        }
    }

    pub fn min(&self) -> DVec2 {
        DVec2::new(self.x, self.y)
    }

    pub fn max(&self) -> DVec2 {
        DVec2::new(self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> DVec2 {
        DVec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Half-open containment: the right and bottom edges belong to the next rect.
    pub fn contains(&self, point: DVec2) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && point.x < self.x + self.width
            && point.y < self.y + self.height
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridTransform {
    size: SurfaceSize,
    cells_x: u32,
    cells_y: u32,
}

impl GridTransform {
    pub fn new(size: SurfaceSize, cells_x: u32, cells_y: u32) -> Self {
        Self {
            size,
            cells_x,
            cells_y,
        }
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn cells_x(&self) -> u32 {
        self.cells_x
    }

    pub fn cells_y(&self) -> u32 {
        self.cells_y
    }

    pub fn cell_count(&self) -> u32 {
        self.cells_x.saturating_mul(self.cells_y)
    }

    /// A grid without cells or without area maps nothing.
    pub fn is_degenerate(&self) -> bool {
        self.cells_x == 0 || self.cells_y == 0 || self.size.is_empty()
    }

    pub fn cell_size(&self) -> DVec2 {
        if self.cells_x == 0 || self.cells_y == 0 {
            return DVec2::ZERO;
        }
        DVec2::new(
            self.size.width / f64::from(self.cells_x),
            self.size.height / f64::from(self.cells_y),
        )
    }

    /// Cell under a pixel. Points outside the surface clamp to the nearest
    /// edge cell.
    pub fn cell_of(&self, pixel: DVec2) -> Option<CellAddr> {
        if self.is_degenerate() {
            return None;
        }
        let cell = self.cell_size();
        Some(CellAddr::new(
            clamp_axis((pixel.x / cell.x).floor(), self.cells_x),
            clamp_axis((pixel.y / cell.y).floor(), self.cells_y),
        ))
    }

    /// First and last cell touched by a rectangle. The trailing edges are
    /// exclusive, so a rectangle ending exactly on a cell boundary does not
    /// reach into the next cell.
    pub fn cell_span(&self, rect: PixelRect) -> Option<(CellAddr, CellAddr)> {
        let start = self.cell_of(rect.min())?;
        let cell = self.cell_size();
        let max = rect.max();
        let end = CellAddr::new(
            clamp_axis((max.x / cell.x).ceil() - 1.0, self.cells_x).max(start.column),
            clamp_axis((max.y / cell.y).ceil() - 1.0, self.cells_y).max(start.row),
        );
        Some((start, end))
    }

    pub fn bounds_of(&self, cell: CellAddr) -> PixelRect {
        let size = self.cell_size();
        PixelRect {
            x: f64::from(cell.column) * size.x,
            y: f64::from(cell.row) * size.y,
            width: size.x,
            height: size.y,
        }
    }

    /// Pixel position as a fraction of the surface size.
    pub fn relative_of(&self, pixel: DVec2) -> DVec2 {
        if self.size.is_empty() {
            return DVec2::ZERO;
        }
        DVec2::new(pixel.x / self.size.width, pixel.y / self.size.height)
    }

    pub fn pixel_of(&self, relative: DVec2) -> DVec2 {
        DVec2::new(relative.x * self.size.width, relative.y * self.size.height)
    }

    /// Row-major index.
    pub fn index_of(&self, cell: CellAddr) -> u32 {
        index_of(cell, self.cells_x)
    }

    pub fn cell_at_index(&self, index: u32) -> Option<CellAddr> {
        if self.cells_x == 0 || index >= self.cell_count() {
            return None;
        }
        Some(CellAddr::new(index % self.cells_x, index / self.cells_x))
    }
}

pub fn index_of(cell: CellAddr, cells_x: u32) -> u32 {
    cell.row * cells_x + cell.column
}

fn clamp_axis(value: f64, count: u32) -> u32 {
    let last = f64::from(count.saturating_sub(1));
    // NaN falls through to zero via the saturating cast.
    value.clamp(0.0, last) as u32
}

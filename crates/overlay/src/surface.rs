//! Retained drawable grid and the pointer state machine that drives the
//! selection store.
//!
//! The surface keeps one rectangle primitive per cell plus a rubber-band
//! rectangle, a location marker and the placed background image. It never
//! touches a real canvas: hosts feed it pointer events and size changes, and
//! render it through a [`Painter`].
//!
//! Interaction mode is read from the store on every event, never cached.

use glam::DVec2;
use thiserror::Error;
use worldgrid_protocol::InteractionMode;

use crate::store::{CellMetadata, PrimitiveId, RegionSelection, SelectionStore};
use crate::transform::{CellAddr, GridTransform, PixelRect, SurfaceSize};

/// Drags smaller than this on both axes are treated as clicks on nothing.
pub const MIN_DRAG_PX: f64 = 2.0;
/// Size changes at or below this are measurement jitter and do not rebuild.
pub const RESIZE_EPSILON_PX: f64 = 0.5;

pub const HOVER_FILL: &str = "rgba(255,208,107,0.18)";
pub const SELECTED_FILL: &str = "rgba(111,248,255,0.35)";
pub const GRID_LINE: &str = "rgba(127,203,255,0.45)";
pub const RUBBER_BAND_FILL: &str = "rgba(104,199,255,0.15)";
pub const RUBBER_BAND_STROKE: &str = "rgba(104,199,255,0.85)";
pub const MARKER_FILL: &str = "rgba(255,113,152,0.9)";
pub const MARKER_RADIUS_PX: f64 = 6.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        ctrl: false,
        meta: false,
    };

    pub fn multi_select(&self) -> bool {
        self.shift || self.ctrl || self.meta
    }
}

/// What the host's scene graph found under the pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerTarget {
    Canvas,
    Cell(PrimitiveId),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub position: DVec2,
    pub modifiers: Modifiers,
    pub target: PointerTarget,
}

impl PointerEvent {
    pub fn on_canvas(x: f64, y: f64) -> Self {
        Self {
            position: DVec2::new(x, y),
            modifiers: Modifiers::NONE,
            target: PointerTarget::Canvas,
        }
    }

    pub fn on_cell(primitive: PrimitiveId, x: f64, y: f64) -> Self {
        Self {
            position: DVec2::new(x, y),
            modifiers: Modifiers::NONE,
            target: PointerTarget::Cell(primitive),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellFill {
    Clear,
    Hover,
    Selected,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellPrimitive {
    pub id: PrimitiveId,
    pub cell: CellAddr,
    pub index: u32,
    pub bounds: PixelRect,
    pub fill: CellFill,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageLoadError {
    #[error("image request failed: {0}")]
    Fetch(String),
    #[error("image could not be decoded: {0}")]
    Decode(String),
    #[error("image has no pixels")]
    Empty,
}

/// Identifies one background load. Only the newest ticket may apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoadTicket(u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackgroundRequest {
    pub ticket: LoadTicket,
    pub url: String,
}

/// Background image scaled to fit and centered on the surface.
#[derive(Clone, Debug, PartialEq)]
pub struct BackgroundPlacement {
    pub url: String,
    pub image: ImageSize,
    pub scale: f64,
    pub rect: PixelRect,
}

impl BackgroundPlacement {
    fn fit(url: String, image: ImageSize, surface: SurfaceSize) -> Self {
        let scale = (surface.width / image.width).min(surface.height / image.height);
        let width = image.width * scale;
        let height = image.height * scale;
        Self {
            url,
            image,
            scale,
            rect: PixelRect {
                x: (surface.width - width) / 2.0,
                y: (surface.height - height) / 2.0,
                width,
                height,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Background {
    Empty,
    Loading { ticket: LoadTicket, url: String },
    Ready(BackgroundPlacement),
    Failed { url: String },
}

/// Notifications for the owning workflow.
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceEvent {
    CellClicked(CellMetadata),
    CellsSelected(Vec<CellMetadata>),
    RegionSelected(RegionSelection),
    /// `point` is relative to the surface size.
    LocationPlaced {
        point: DVec2,
        cell: Option<CellAddr>,
    },
    BackgroundFailed {
        url: String,
        error: ImageLoadError,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub rebuilt: bool,
    pub restyled: bool,
    pub background: Option<BackgroundRequest>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct RubberBand {
    anchor: DVec2,
    current: DVec2,
}

impl RubberBand {
    fn rect(&self) -> PixelRect {
        PixelRect::from_corners(self.anchor, self.current)
    }
}

/// Drawing backend the surface renders through.
pub trait Painter {
    fn draw_image(&mut self, url: &str, rect: PixelRect);
    fn fill_rect(&mut self, rect: PixelRect, color: &str);
    fn stroke_rect(&mut self, rect: PixelRect, color: &str, line_width: f64);
    fn draw_marker(&mut self, center: DVec2, radius: f64, color: &str);
}

#[derive(Debug)]
pub struct Surface {
    size: SurfaceSize,
    cells_x: u32,
    cells_y: u32,
    show_grid: bool,
    generation: u32,
    primitives: Vec<CellPrimitive>,
    hovered: Option<u32>,
    drag: Option<RubberBand>,
    marker: Option<DVec2>,
    background: Background,
    next_ticket: u64,
    seen_config_rev: Option<u64>,
    seen_selection_rev: Option<u64>,
    seen_background_rev: Option<u64>,
    rebuilds: u64,
}

impl Surface {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            size,
            cells_x: 0,
            cells_y: 0,
            show_grid: true,
            generation: 0,
            primitives: Vec::new(),
            hovered: None,
            drag: None,
            marker: None,
            background: Background::Empty,
            next_ticket: 0,
            seen_config_rev: None,
            seen_selection_rev: None,
            seen_background_rev: None,
            rebuilds: 0,
        }
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn transform(&self) -> GridTransform {
        GridTransform::new(self.size, self.cells_x, self.cells_y)
    }

    pub fn primitives(&self) -> &[CellPrimitive] {
        &self.primitives
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Number of full primitive rebuilds so far.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Current rubber-band rectangle while a drag is in flight.
    pub fn rubber_band(&self) -> Option<PixelRect> {
        self.drag.map(|d| d.rect())
    }

    /// Placed location marker, relative to the surface size.
    pub fn marker(&self) -> Option<DVec2> {
        self.marker
    }

    pub fn background(&self) -> Option<&BackgroundPlacement> {
        match &self.background {
            Background::Ready(placement) => Some(placement),
            _ => None,
        }
    }

    pub fn background_failed(&self) -> bool {
        matches!(self.background, Background::Failed { .. })
    }

    pub fn primitive(&self, id: PrimitiveId) -> Option<&CellPrimitive> {
        if id.generation != self.generation {
            return None;
        }
        self.primitives.get(id.slot as usize)
    }

    /// Primitive under a pixel, for hosts without their own hit testing.
    pub fn hit_test(&self, position: DVec2) -> PointerTarget {
        self.primitives
            .iter()
            .find(|p| p.bounds.contains(position))
            .map_or(PointerTarget::Canvas, |p| PointerTarget::Cell(p.id))
    }

    /// Render-side metadata for a live primitive.
    pub fn cell_metadata(&self, id: PrimitiveId) -> Option<CellMetadata> {
        self.primitive(id).map(|p| CellMetadata {
            column: p.cell.column,
            row: p.cell.row,
            index: p.index,
            selected: p.fill == CellFill::Selected,
            primitive: Some(p.id),
        })
    }

    /// Brings the drawables in line with the store. A config revision change
    /// rebuilds every primitive; a selection change only restyles fills.
    pub fn sync(&mut self, store: &SelectionStore) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        if self.drag.is_some() && store.mode() != Some(InteractionMode::Grid) {
            self.abort_drag("mode changed");
        }

        if self.seen_config_rev != Some(store.config_revision()) {
            self.seen_config_rev = Some(store.config_revision());
            let config = store.config();
            self.cells_x = config.cells_x;
            self.cells_y = config.cells_y;
            self.show_grid = config.show_grid;
            self.rebuild(store);
            outcome.rebuilt = true;
        }

        if self.seen_selection_rev != Some(store.selection_revision()) {
            self.seen_selection_rev = Some(store.selection_revision());
            if !outcome.rebuilt {
                self.restyle(store);
                outcome.restyled = true;
            }
        }

        if self.seen_background_rev != Some(store.background_revision()) {
            self.seen_background_rev = Some(store.background_revision());
            outcome.background = self.begin_background(store.background_url());
        }

        outcome
    }

    /// Container width changed. Height follows the configured aspect ratio.
    pub fn observe_container_width(&mut self, width: f64, store: &SelectionStore) -> bool {
        let height = width * store.config().aspect_ratio();
        self.resize(SurfaceSize::new(width, height), store)
    }

    /// Applies a new surface size unless it is within jitter of the current one.
    pub fn resize(&mut self, size: SurfaceSize, store: &SelectionStore) -> bool {
        if !size.differs_from(self.size, RESIZE_EPSILON_PX) {
            return false;
        }
        self.size = size;
        self.abort_drag("surface resized");
        self.rebuild(store);
        if let Background::Ready(placement) = &self.background {
            let refit = BackgroundPlacement::fit(placement.url.clone(), placement.image, size);
            self.background = Background::Ready(refit);
        }
        true
    }

    fn rebuild(&mut self, store: &SelectionStore) {
        self.generation = self.generation.wrapping_add(1);
        self.primitives.clear();
        self.hovered = None;
        self.rebuilds += 1;

        let transform = self.transform();
        if !transform.is_degenerate() {
            self.primitives.reserve(transform.cell_count() as usize);
            for row in 0..self.cells_y {
                for column in 0..self.cells_x {
                    let cell = CellAddr::new(column, row);
                    let slot = self.primitives.len() as u32;
                    self.primitives.push(CellPrimitive {
                        id: PrimitiveId {
                            generation: self.generation,
                            slot,
                        },
                        cell,
                        index: transform.index_of(cell),
                        bounds: transform.bounds_of(cell),
                        fill: CellFill::Clear,
                    });
                }
            }
        }
        self.restyle(store);

        tracing::debug!(
            generation = self.generation,
            cells = self.primitives.len(),
            width = self.size.width,
            height = self.size.height,
            "grid primitives rebuilt"
        );
    }

    fn restyle(&mut self, store: &SelectionStore) {
        let hovered = self.hovered;
        for primitive in &mut self.primitives {
            primitive.fill = if store.is_selected(primitive.cell) {
                CellFill::Selected
            } else if hovered == Some(primitive.id.slot) {
                CellFill::Hover
            } else {
                CellFill::Clear
            };
        }
    }

    fn set_hover(&mut self, slot: Option<u32>, store: &SelectionStore) {
        if self.hovered == slot {
            return;
        }
        self.hovered = slot;
        self.restyle(store);
    }

    fn abort_drag(&mut self, reason: &str) {
        if self.drag.take().is_some() {
            tracing::debug!(reason, "rubber-band drag aborted");
        }
    }

    pub fn pointer_move(&mut self, store: &SelectionStore, event: PointerEvent) {
        if store.mode() != Some(InteractionMode::Grid) {
            self.abort_drag("left grid mode");
            self.set_hover(None, store);
            return;
        }

        if let Some(drag) = &mut self.drag {
            drag.current = event.position;
            return;
        }

        let slot = match event.target {
            PointerTarget::Cell(id) => self
                .primitive(id)
                .filter(|p| p.fill != CellFill::Selected)
                .map(|p| p.id.slot),
            PointerTarget::Canvas => None,
        };
        self.set_hover(slot, store);
    }

    pub fn pointer_leave(&mut self, store: &SelectionStore) {
        self.set_hover(None, store);
    }

    pub fn pointer_down(
        &mut self,
        store: &mut SelectionStore,
        event: PointerEvent,
    ) -> Vec<SurfaceEvent> {
        match store.mode() {
            Some(InteractionMode::Grid) => self.grid_press(store, event),
            Some(InteractionMode::Location) => self.place_location(store, event),
            None => Vec::new(),
        }
    }

    fn grid_press(&mut self, store: &mut SelectionStore, event: PointerEvent) -> Vec<SurfaceEvent> {
        if self.drag.is_some() {
            return Vec::new();
        }

        match event.target {
            PointerTarget::Canvas => {
                if !event.modifiers.multi_select() {
                    self.drag = Some(RubberBand {
                        anchor: event.position,
                        current: event.position,
                    });
                }
                Vec::new()
            }
            PointerTarget::Cell(id) => {
                let Some(cell) = self.cell_metadata(id) else {
                    tracing::trace!(?id, "press on stale primitive ignored");
                    return Vec::new();
                };
                if event.modifiers.multi_select() {
                    store.toggle_cell(cell);
                } else {
                    store.set_selected_cells(vec![cell]);
                }
                self.seen_selection_rev = Some(store.selection_revision());
                self.hovered = None;
                self.restyle(store);

                let clicked = CellMetadata {
                    selected: store.is_selected(cell.addr()),
                    ..cell
                };
                vec![
                    SurfaceEvent::CellClicked(clicked),
                    SurfaceEvent::CellsSelected(store.selected_cells().to_vec()),
                ]
            }
        }
    }

    fn place_location(
        &mut self,
        store: &mut SelectionStore,
        event: PointerEvent,
    ) -> Vec<SurfaceEvent> {
        let transform = self.transform();
        let point = transform.relative_of(event.position);
        let cell = transform.cell_of(event.position);
        self.marker = Some(point);
        store.set_mode(None);
        tracing::debug!(x = point.x, y = point.y, ?cell, "location placed");
        vec![SurfaceEvent::LocationPlaced { point, cell }]
    }

    pub fn pointer_up(&mut self, store: &mut SelectionStore, event: PointerEvent) -> Vec<SurfaceEvent> {
        let Some(mut drag) = self.drag.take() else {
            return Vec::new();
        };
        if store.mode() != Some(InteractionMode::Grid) {
            tracing::debug!("rubber-band drag dropped after mode change");
            return Vec::new();
        }
        drag.current = event.position;
        let rect = drag.rect();

        if rect.width < MIN_DRAG_PX && rect.height < MIN_DRAG_PX {
            tracing::trace!(width = rect.width, height = rect.height, "drag below threshold discarded");
            return Vec::new();
        }

        let Some((start_cell, end_cell)) = self.transform().cell_span(rect) else {
            return Vec::new();
        };
        store.set_region(start_cell, end_cell);
        let region = RegionSelection {
            start_cell,
            end_cell,
        };

        let cells: Vec<CellMetadata> = self
            .primitives
            .iter()
            .filter(|p| region.contains(p.cell))
            .map(|p| CellMetadata {
                column: p.cell.column,
                row: p.cell.row,
                index: p.index,
                selected: true,
                primitive: Some(p.id),
            })
            .collect();
        store.set_selected_cells(cells);
        self.seen_selection_rev = Some(store.selection_revision());
        self.restyle(store);

        vec![
            SurfaceEvent::RegionSelected(region),
            SurfaceEvent::CellsSelected(store.selected_cells().to_vec()),
        ]
    }

    /// Removes the placed location marker.
    pub fn clear_marker(&mut self) {
        self.marker = None;
    }

    fn begin_background(&mut self, url: Option<&str>) -> Option<BackgroundRequest> {
        let Some(url) = url else {
            self.background = Background::Empty;
            return None;
        };
        self.next_ticket += 1;
        let ticket = LoadTicket(self.next_ticket);
        self.background = Background::Loading {
            ticket,
            url: url.to_string(),
        };
        Some(BackgroundRequest {
            ticket,
            url: url.to_string(),
        })
    }

    /// Applies the outcome of a background load. Results for a superseded
    /// ticket are dropped without touching render state.
    pub fn complete_background_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<ImageSize, ImageLoadError>,
    ) -> Option<SurfaceEvent> {
        let url = match &self.background {
            Background::Loading { ticket: current, url } if *current == ticket => url.clone(),
            _ => {
                tracing::trace!(?ticket, "stale background load ignored");
                return None;
            }
        };

        let result = result.and_then(|image| {
            if image.width > 0.0 && image.height > 0.0 {
                Ok(image)
            } else {
                Err(ImageLoadError::Empty)
            }
        });

        match result {
            Ok(image) => {
                self.background = Background::Ready(BackgroundPlacement::fit(url, image, self.size));
                None
            }
            Err(error) => {
                tracing::warn!(%url, %error, "background image failed to load");
                self.background = Background::Failed { url: url.clone() };
                Some(SurfaceEvent::BackgroundFailed { url, error })
            }
        }
    }

    pub fn paint(&self, painter: &mut impl Painter) {
        if let Some(placement) = self.background() {
            painter.draw_image(&placement.url, placement.rect);
        }

        for primitive in &self.primitives {
            match primitive.fill {
                CellFill::Clear => {}
                CellFill::Hover => painter.fill_rect(primitive.bounds, HOVER_FILL),
                CellFill::Selected => painter.fill_rect(primitive.bounds, SELECTED_FILL),
            }
            if self.show_grid {
                painter.stroke_rect(primitive.bounds, GRID_LINE, 1.0);
            }
        }

        if let Some(rect) = self.rubber_band() {
            painter.fill_rect(rect, RUBBER_BAND_FILL);
            painter.stroke_rect(rect, RUBBER_BAND_STROKE, 1.0);
        }

        if let Some(marker) = self.marker {
            let center = self.transform().pixel_of(marker);
            painter.draw_marker(center, MARKER_RADIUS_PX, MARKER_FILL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GridConfig, GridConfigPatch};

    fn setup(cells: u32, side: f64) -> (SelectionStore, Surface) {
        let store = SelectionStore::new(GridConfig {
            width: side,
            height: side,
            cells_x: cells,
            cells_y: cells,
            show_grid: true,
        });
        let mut surface = Surface::new(SurfaceSize::new(side, side));
        surface.sync(&store);
        (store, surface)
    }

    fn id_at(surface: &Surface, column: u32, row: u32) -> PrimitiveId {
        surface
            .primitives()
            .iter()
            .find(|p| p.cell == CellAddr::new(column, row))
            .map(|p| p.id)
            .unwrap()
    }

    fn drag(store: &mut SelectionStore, surface: &mut Surface, from: (f64, f64), to: (f64, f64)) -> Vec<SurfaceEvent> {
        surface.pointer_down(store, PointerEvent::on_canvas(from.0, from.1));
        surface.pointer_move(store, PointerEvent::on_canvas(to.0, to.1));
        surface.pointer_up(store, PointerEvent::on_canvas(to.0, to.1))
    }

    #[derive(Default)]
    struct Recorder {
        images: Vec<String>,
        fills: Vec<(PixelRect, String)>,
        strokes: usize,
        markers: Vec<DVec2>,
    }

    impl Painter for Recorder {
        fn draw_image(&mut self, url: &str, _rect: PixelRect) {
            self.images.push(url.to_string());
        }
        fn fill_rect(&mut self, rect: PixelRect, color: &str) {
            self.fills.push((rect, color.to_string()));
        }
        fn stroke_rect(&mut self, _rect: PixelRect, _color: &str, _line_width: f64) {
            self.strokes += 1;
        }
        fn draw_marker(&mut self, center: DVec2, _radius: f64, _color: &str) {
            self.markers.push(center);
        }
    }

    #[test]
    fn drag_selects_cells_under_rubber_band() {
        let (mut store, mut surface) = setup(10, 100.0);
        let events = drag(&mut store, &mut surface, (10.0, 10.0), (90.0, 90.0));

        let selected = store.selected_cells();
        assert_eq!(selected.len(), 64);
        assert!(selected
            .iter()
            .all(|c| (1..=8).contains(&c.column) && (1..=8).contains(&c.row)));
        assert_eq!(
            store.region(),
            Some(RegionSelection {
                start_cell: CellAddr::new(1, 1),
                end_cell: CellAddr::new(8, 8),
            })
        );
        assert!(matches!(events[0], SurfaceEvent::RegionSelected(_)));
        assert!(matches!(&events[1], SurfaceEvent::CellsSelected(c) if c.len() == 64));
        assert_eq!(surface.rubber_band(), None);
        assert_eq!(
            surface
                .primitives()
                .iter()
                .filter(|p| p.fill == CellFill::Selected)
                .count(),
            64
        );
    }

    #[test]
    fn reverse_drag_is_normalized() {
        let (mut store, mut surface) = setup(10, 100.0);
        surface.pointer_down(&mut store, PointerEvent::on_canvas(55.0, 35.0));
        surface.pointer_move(&store, PointerEvent::on_canvas(15.0, 5.0));
        let band = surface.rubber_band().unwrap();
        assert_eq!((band.x, band.y, band.width, band.height), (15.0, 5.0, 40.0, 30.0));

        surface.pointer_up(&mut store, PointerEvent::on_canvas(15.0, 5.0));
        let region = store.region().unwrap();
        assert_eq!(region.start_cell, CellAddr::new(1, 0));
        assert_eq!(region.end_cell, CellAddr::new(5, 3));
    }

    #[test]
    fn tiny_drag_is_discarded() {
        let (mut store, mut surface) = setup(10, 100.0);
        store.set_selected_cells(vec![CellMetadata::new(CellAddr::new(4, 4), 10)]);
        let rev = store.selection_revision();

        let events = drag(&mut store, &mut surface, (50.0, 50.0), (51.5, 51.0));
        assert!(events.is_empty());
        assert_eq!(store.selection_revision(), rev);
        assert_eq!(store.region(), None);
        assert_eq!(surface.rubber_band(), None);
    }

    #[test]
    fn click_replaces_and_modifier_toggles() {
        let (mut store, mut surface) = setup(4, 100.0);
        let a = id_at(&surface, 0, 0);
        let b = id_at(&surface, 2, 1);

        let events = surface.pointer_down(&mut store, PointerEvent::on_cell(a, 5.0, 5.0));
        assert!(matches!(events[0], SurfaceEvent::CellClicked(c) if c.column == 0 && c.selected));
        surface.pointer_down(&mut store, PointerEvent::on_cell(b, 60.0, 30.0));
        assert_eq!(store.selected_cells().len(), 1);
        assert_eq!(store.selected_cells()[0].addr(), CellAddr::new(2, 1));

        let shift = Modifiers {
            shift: true,
            ..Modifiers::NONE
        };
        surface.pointer_down(&mut store, PointerEvent::on_cell(a, 5.0, 5.0).with_modifiers(shift));
        assert_eq!(store.selected_cells().len(), 2);
        surface.pointer_down(&mut store, PointerEvent::on_cell(a, 5.0, 5.0).with_modifiers(shift));
        assert_eq!(store.selected_cells().len(), 1);
        assert_eq!(surface.primitive(a).unwrap().fill, CellFill::Clear);
        assert_eq!(surface.primitive(b).unwrap().fill, CellFill::Selected);
    }

    #[test]
    fn modifier_press_on_canvas_does_not_drag() {
        let (mut store, mut surface) = setup(4, 100.0);
        let ctrl = Modifiers {
            ctrl: true,
            ..Modifiers::NONE
        };
        surface.pointer_down(&mut store, PointerEvent::on_canvas(5.0, 5.0).with_modifiers(ctrl));
        assert_eq!(surface.rubber_band(), None);
    }

    #[test]
    fn hover_highlights_only_unselected_cells() {
        let (mut store, mut surface) = setup(4, 100.0);
        let a = id_at(&surface, 1, 1);
        let b = id_at(&surface, 3, 3);
        surface.pointer_down(&mut store, PointerEvent::on_cell(b, 90.0, 90.0));

        surface.pointer_move(&store, PointerEvent::on_cell(a, 30.0, 30.0));
        assert_eq!(surface.primitive(a).unwrap().fill, CellFill::Hover);

        surface.pointer_move(&store, PointerEvent::on_cell(b, 90.0, 90.0));
        assert_eq!(surface.primitive(a).unwrap().fill, CellFill::Clear);
        assert_eq!(surface.primitive(b).unwrap().fill, CellFill::Selected);

        surface.pointer_move(&store, PointerEvent::on_cell(a, 30.0, 30.0));
        surface.pointer_leave(&store);
        assert_eq!(surface.primitive(a).unwrap().fill, CellFill::Clear);
    }

    #[test]
    fn location_mode_places_marker_and_goes_neutral() {
        let (mut store, mut surface) = setup(10, 200.0);
        store.set_mode(Some(InteractionMode::Location));

        let events = surface.pointer_down(&mut store, PointerEvent::on_canvas(50.0, 150.0));
        assert_eq!(
            events,
            vec![SurfaceEvent::LocationPlaced {
                point: DVec2::new(0.25, 0.75),
                cell: Some(CellAddr::new(2, 7)),
            }]
        );
        assert_eq!(surface.marker(), Some(DVec2::new(0.25, 0.75)));
        assert_eq!(store.mode(), None);

        assert!(surface
            .pointer_down(&mut store, PointerEvent::on_canvas(10.0, 10.0))
            .is_empty());
    }

    #[test]
    fn marker_survives_resize_in_relative_terms() {
        let (mut store, mut surface) = setup(10, 200.0);
        store.set_mode(Some(InteractionMode::Location));
        surface.pointer_down(&mut store, PointerEvent::on_canvas(50.0, 150.0));
        surface.resize(SurfaceSize::new(400.0, 400.0), &store);

        let mut recorder = Recorder::default();
        surface.paint(&mut recorder);
        assert_eq!(recorder.markers, vec![DVec2::new(100.0, 300.0)]);
    }

    #[test]
    fn mode_flip_mid_drag_aborts() {
        let (mut store, mut surface) = setup(10, 100.0);
        surface.pointer_down(&mut store, PointerEvent::on_canvas(10.0, 10.0));
        surface.pointer_move(&store, PointerEvent::on_canvas(50.0, 50.0));
        assert!(surface.rubber_band().is_some());

        store.set_mode(Some(InteractionMode::Location));
        let events = surface.pointer_up(&mut store, PointerEvent::on_canvas(90.0, 90.0));
        assert!(events.is_empty());
        assert!(store.selected_cells().is_empty());
        assert_eq!(surface.rubber_band(), None);

        store.set_mode(Some(InteractionMode::Grid));
        surface.pointer_down(&mut store, PointerEvent::on_canvas(10.0, 10.0));
        store.set_mode(None);
        surface.sync(&store);
        assert_eq!(surface.rubber_band(), None);
    }

    #[test]
    fn selection_change_restyles_without_rebuild() {
        let (mut store, mut surface) = setup(4, 100.0);
        let rebuilds = surface.rebuild_count();
        let generation = surface.generation();

        store.set_selected_cells(vec![CellMetadata::new(CellAddr::new(1, 2), 4)]);
        let outcome = surface.sync(&store);
        assert!(outcome.restyled);
        assert!(!outcome.rebuilt);
        assert_eq!(surface.rebuild_count(), rebuilds);
        assert_eq!(surface.generation(), generation);
        assert_eq!(
            surface.primitive(id_at(&surface, 1, 2)).unwrap().fill,
            CellFill::Selected
        );
    }

    #[test]
    fn config_change_rebuilds_and_invalidates_old_ids() {
        let (mut store, mut surface) = setup(4, 100.0);
        let old = id_at(&surface, 0, 0);

        store.set_config(GridConfigPatch {
            cells_x: Some(5),
            ..GridConfigPatch::default()
        });
        let outcome = surface.sync(&store);
        assert!(outcome.rebuilt);
        assert_eq!(surface.primitives().len(), 20);
        assert_eq!(surface.primitive(old), None);
        assert!(surface
            .pointer_down(&mut store, PointerEvent::on_cell(old, 1.0, 1.0))
            .is_empty());
    }

    #[test]
    fn empty_grid_renders_nothing() {
        let (mut store, mut surface) = setup(4, 100.0);
        store.set_config(GridConfigPatch {
            cells_y: Some(0),
            ..GridConfigPatch::default()
        });
        surface.sync(&store);
        assert!(surface.primitives().is_empty());
        let events = drag(&mut store, &mut surface, (10.0, 10.0), (90.0, 90.0));
        assert!(events.is_empty());
    }

    #[test]
    fn resize_jitter_is_damped() {
        let (store, mut surface) = setup(4, 100.0);
        let rebuilds = surface.rebuild_count();

        assert!(!surface.observe_container_width(100.4, &store));
        assert_eq!(surface.rebuild_count(), rebuilds);
        assert_eq!(surface.size(), SurfaceSize::new(100.0, 100.0));

        assert!(surface.observe_container_width(200.0, &store));
        assert_eq!(surface.rebuild_count(), rebuilds + 1);
        assert_eq!(surface.size(), SurfaceSize::new(200.0, 200.0));
        assert_eq!(surface.primitives()[0].bounds.width, 50.0);
    }

    #[test]
    fn container_width_uses_default_aspect_without_config_size() {
        let store = SelectionStore::new(GridConfig {
            width: 0.0,
            height: 0.0,
            ..GridConfig::default()
        });
        let mut surface = Surface::new(SurfaceSize::default());
        surface.sync(&store);
        assert!(surface.primitives().is_empty());
        surface.observe_container_width(400.0, &store);
        assert_eq!(surface.size(), SurfaceSize::new(400.0, 300.0));
        assert_eq!(surface.primitives().len(), 16 * 12);
    }

    #[test]
    fn background_is_fitted_and_centered() {
        let (mut store, mut surface) = setup(4, 100.0);
        store.set_background_url(Some("https://maps.example/a.png".into()));
        let request = surface.sync(&store).background.expect("load requested");
        assert_eq!(request.url, "https://maps.example/a.png");

        let event = surface.complete_background_load(
            request.ticket,
            Ok(ImageSize {
                width: 400.0,
                height: 200.0,
            }),
        );
        assert_eq!(event, None);
        let placement = surface.background().unwrap();
        assert_eq!(placement.scale, 0.25);
        assert_eq!(
            placement.rect,
            PixelRect {
                x: 0.0,
                y: 25.0,
                width: 100.0,
                height: 50.0
            }
        );

        surface.resize(SurfaceSize::new(200.0, 200.0), &store);
        assert_eq!(surface.background().unwrap().scale, 0.5);
    }

    #[test]
    fn superseded_background_load_is_ignored() {
        let (mut store, mut surface) = setup(4, 100.0);
        store.set_background_url(Some("old.png".into()));
        let old = surface.sync(&store).background.unwrap();
        store.set_background_url(Some("new.png".into()));
        let new = surface.sync(&store).background.unwrap();

        let size = ImageSize {
            width: 10.0,
            height: 10.0,
        };
        assert_eq!(surface.complete_background_load(old.ticket, Ok(size)), None);
        assert_eq!(surface.background(), None);

        assert_eq!(
            surface.complete_background_load(old.ticket, Err(ImageLoadError::Fetch("404".into()))),
            None
        );
        assert!(!surface.background_failed());

        surface.complete_background_load(new.ticket, Ok(size));
        assert_eq!(surface.background().unwrap().url, "new.png");
    }

    #[test]
    fn background_failure_is_reported_and_grid_still_works() {
        let (mut store, mut surface) = setup(4, 100.0);
        store.set_background_url(Some("broken.png".into()));
        let request = surface.sync(&store).background.unwrap();

        let event = surface.complete_background_load(
            request.ticket,
            Err(ImageLoadError::Decode("truncated".into())),
        );
        assert_eq!(
            event,
            Some(SurfaceEvent::BackgroundFailed {
                url: "broken.png".into(),
                error: ImageLoadError::Decode("truncated".into()),
            })
        );
        assert!(surface.background_failed());

        let id = id_at(&surface, 1, 1);
        surface.pointer_down(&mut store, PointerEvent::on_cell(id, 30.0, 30.0));
        assert_eq!(store.selected_cells().len(), 1);
    }

    #[test]
    fn zero_sized_image_counts_as_failure() {
        let (mut store, mut surface) = setup(4, 100.0);
        store.set_background_url(Some("empty.png".into()));
        let request = surface.sync(&store).background.unwrap();
        let event = surface.complete_background_load(
            request.ticket,
            Ok(ImageSize {
                width: 0.0,
                height: 10.0,
            }),
        );
        assert!(matches!(
            event,
            Some(SurfaceEvent::BackgroundFailed {
                error: ImageLoadError::Empty,
                ..
            })
        ));
    }

    #[test]
    fn paint_emits_background_fills_and_band() {
        let (mut store, mut surface) = setup(2, 100.0);
        store.set_background_url(Some("bg.png".into()));
        let request = surface.sync(&store).background.unwrap();
        surface.complete_background_load(
            request.ticket,
            Ok(ImageSize {
                width: 100.0,
                height: 100.0,
            }),
        );
        let id = id_at(&surface, 1, 0);
        surface.pointer_down(&mut store, PointerEvent::on_cell(id, 75.0, 25.0));
        surface.pointer_down(&mut store, PointerEvent::on_canvas(10.0, 10.0));
        surface.pointer_move(&store, PointerEvent::on_canvas(20.0, 20.0));

        let mut recorder = Recorder::default();
        surface.paint(&mut recorder);
        assert_eq!(recorder.images, vec!["bg.png".to_string()]);
        assert_eq!(recorder.strokes, 4 + 1);
        assert_eq!(recorder.fills.len(), 2);
        assert_eq!(recorder.fills[0].1, SELECTED_FILL);
        assert_eq!(recorder.fills[1].1, RUBBER_BAND_FILL);
    }

    #[test]
    fn hidden_grid_lines_are_not_stroked() {
        let (mut store, mut surface) = setup(2, 100.0);
        store.set_config(GridConfigPatch {
            show_grid: Some(false),
            ..GridConfigPatch::default()
        });
        assert!(surface.sync(&store).rebuilt);
        let mut recorder = Recorder::default();
        surface.paint(&mut recorder);
        assert_eq!(recorder.strokes, 0);
    }

    #[test]
    fn hit_test_finds_cell_primitives() {
        let (_store, surface) = setup(4, 100.0);
        assert_eq!(
            surface.hit_test(DVec2::new(30.0, 80.0)),
            PointerTarget::Cell(id_at(&surface, 1, 3))
        );
        assert_eq!(surface.hit_test(DVec2::new(130.0, 80.0)), PointerTarget::Canvas);
    }
}

//! Headless client engine for the world-map grid overlay.
//!
//! A [`SelectionStore`] holds config, mode and selection. A [`Surface`] keeps
//! one drawable per cell and turns pointer events into store mutations. The
//! [`DomainSync`] bridge maps between the render grid and the durable cells
//! served by the provisioning service.
//!
//! Typical loop on the host side:
//!
//! ```
//! use worldgrid_overlay::{PointerEvent, SelectionStore, Surface, SurfaceSize};
//!
//! let mut store = SelectionStore::default();
//! let mut surface = Surface::new(SurfaceSize::new(800.0, 600.0));
//! surface.sync(&store);
//!
//! surface.pointer_down(&mut store, PointerEvent::on_canvas(60.0, 60.0));
//! surface.pointer_up(&mut store, PointerEvent::on_canvas(140.0, 140.0));
//! assert_eq!(store.selected_cells().len(), 4);
//! ```

mod bridge;
mod store;
mod surface;
mod transform;

pub use bridge::DomainSync;
pub use store::{
    CellMetadata, GridConfig, GridConfigPatch, PrimitiveId, RegionSelection, SelectionStore,
    DEFAULT_ASPECT_RATIO,
};
pub use surface::{
    BackgroundPlacement, BackgroundRequest, CellFill, CellPrimitive, ImageLoadError, ImageSize,
    LoadTicket, Modifiers, Painter, PointerEvent, PointerTarget, Surface, SurfaceEvent,
    SyncOutcome, MIN_DRAG_PX, RESIZE_EPSILON_PX,
};
pub use transform::{index_of, CellAddr, GridTransform, PixelRect, SurfaceSize};

pub use glam::DVec2;

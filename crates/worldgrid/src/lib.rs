//! Umbrella crate for the world grid overlay.
//!
//! Re-exports the storage engine, the headless overlay and the shared wire
//! types so downstream code can depend on a single crate name (`worldgrid`).

pub use worldgrid_engine as engine;
pub use worldgrid_overlay as overlay;
pub use worldgrid_protocol as protocol;

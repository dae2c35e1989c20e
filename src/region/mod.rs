//! Region data model
//!
//! A region is a square grid of slices, the unit of loading, generation,
//! saving and simulation.

pub mod position;
#[allow(clippy::module_inception)]
pub mod region;
pub mod slice;
pub mod structure;

pub use position::{LocalTile, RegionPos, SlicePos, TilePos};
pub use region::{LoadState, Region, RegionSnapshot, TickOutcome, TickParams};
pub use slice::{empty_slices, Slice, TileId};
pub use structure::StructureStamp;

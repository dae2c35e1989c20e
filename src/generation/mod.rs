//! Terrain generation

pub mod pool;
pub mod populator;

pub use pool::{GenerationPool, GenerationStats};
pub use populator::{NoisePopulator, TerrainPlan, TerrainPopulator};

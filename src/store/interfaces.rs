use std::sync::Arc;

use super::CacheHandle;
use crate::region::Region;

/// What a load should lead to once the region's data is in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadRequest {
    /// Forward to the generator if the loaded region has no terrain yet
    pub generate: bool,
    /// The region is being activated; serve before background loads
    pub make_active: bool,
}

/// Asynchronous storage behind the store.
///
/// `load_region` must end with `Region::finish_load` or `Region::fail_load`.
/// Requests for a region whose load was already claimed only need to honour
/// `generate`. `save_region` must eventually drop or dispose the handle.
pub trait RegionLoader: Send + Sync {
    fn load_region(&self, region: Arc<Region>, request: LoadRequest);

    fn save_region(&self, region: Arc<Region>, handle: CacheHandle);
}

/// Terrain generation for loaded regions that have none
pub trait RegionGenerator: Send + Sync {
    fn submit(&self, region: Arc<Region>);
}

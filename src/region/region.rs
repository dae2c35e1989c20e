use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::position::{LocalTile, RegionPos};
use super::slice::{empty_slices, Slice, TileId};
use super::structure::StructureStamp;
use crate::constants::geometry::REGION_TILES;
use crate::error::{RegionError, RegionResult};
use crate::world::WorldHooks;

/// Progress of the asynchronous load of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Loaded,
    /// The loader gave up; the region stays un-prepared and is never saved over
    Failed,
}

/// What the simulation thread should do with a region after ticking it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    /// Held and modified long enough ago that it should be persisted
    Autosave,
    /// Unanchored for the full unload delay
    Expired,
}

/// Tuning passed to [`Region::tick`]
#[derive(Debug, Clone, Copy)]
pub struct TickParams {
    pub world_age: u64,
    pub unload_delay_ticks: u32,
    pub autosave_interval_ticks: u64,
}

/// Persistable image of a region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub pos: RegionPos,
    pub generated: bool,
    pub slices: Vec<Slice>,
    /// Stamps from neighbours still waiting for this region's terrain
    pub deferred: Vec<StructureStamp>,
}

/// A fixed grid of slices plus the lifecycle state that decides when it may
/// be loaded, generated, ticked, saved and dropped.
///
/// Regions are shared as `Arc<Region>` between primary and cache storage;
/// the same instance is handed to every caller for a coordinate.
pub struct Region {
    pos: RegionPos,
    slices: RwLock<Vec<Slice>>,

    load_state: Mutex<LoadState>,
    loaded_signal: Condvar,
    load_claimed: AtomicBool,
    loaded: AtomicBool,

    generation_claimed: AtomicBool,
    generated: AtomicBool,
    deferred: Mutex<VecDeque<StructureStamp>>,

    active: AtomicBool,
    anchor_count: AtomicU32,
    active_neighbours: AtomicU32,
    /// Ticks spent without an anchor; 0 while anchored
    idle_ticks: AtomicU32,

    saving: AtomicBool,
    pending_save: AtomicBool,
    unsaved_changes: AtomicBool,
    last_save_age: AtomicU64,
}

impl Region {
    pub fn new(pos: RegionPos) -> Self {
        Self {
            pos,
            slices: RwLock::new(empty_slices()),
            load_state: Mutex::new(LoadState::Pending),
            loaded_signal: Condvar::new(),
            load_claimed: AtomicBool::new(false),
            loaded: AtomicBool::new(false),
            generation_claimed: AtomicBool::new(false),
            generated: AtomicBool::new(false),
            deferred: Mutex::new(VecDeque::new()),
            active: AtomicBool::new(false),
            anchor_count: AtomicU32::new(0),
            active_neighbours: AtomicU32::new(0),
            idle_ticks: AtomicU32::new(0),
            saving: AtomicBool::new(false),
            pending_save: AtomicBool::new(false),
            unsaved_changes: AtomicBool::new(false),
            last_save_age: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn pos(&self) -> RegionPos {
        self.pos
    }

    // ---------------------------------------------------------------------
    // Anchoring
    // ---------------------------------------------------------------------

    /// Claim that keeps the region in primary storage. Callable from any thread.
    pub fn anchor(&self) {
        self.anchor_count.fetch_add(1, Ordering::AcqRel);
        // A fresh anchor restarts the unload countdown even between two ticks
        self.idle_ticks.store(0, Ordering::Release);
    }

    /// Release a claim taken with [`anchor`](Self::anchor).
    ///
    /// # Panics
    /// If the region has no anchors.
    pub fn deanchor(&self) {
        let previous = self.anchor_count.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "deanchor of region {} without a matching anchor", self.pos);
    }

    pub fn anchor_count(&self) -> u32 {
        self.anchor_count.load(Ordering::Acquire)
    }

    pub fn is_anchored(&self) -> bool {
        self.anchor_count() > 0
    }

    // ---------------------------------------------------------------------
    // Activity
    // ---------------------------------------------------------------------

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Returns true if the flag changed; the caller owns the neighbour cascade
    pub(crate) fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::AcqRel) != active
    }

    pub fn active_neighbour_count(&self) -> u32 {
        self.active_neighbours.load(Ordering::Acquire)
    }

    pub(crate) fn add_active_neighbour(&self) {
        self.active_neighbours.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn remove_active_neighbour(&self) {
        let previous = self.active_neighbours.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "active neighbour count of region {} underflowed", self.pos);
    }

    // ---------------------------------------------------------------------
    // Simulation
    // ---------------------------------------------------------------------

    /// Advance per-tick state. Only the simulation thread ticks regions.
    pub fn tick(&self, params: &TickParams, hooks: &dyn WorldHooks) -> TickOutcome {
        if !self.is_anchored() {
            // Single read-modify-write so a concurrent anchor's reset is never overwritten
            let idle = match self.idle_ticks.fetch_update(Ordering::AcqRel, Ordering::Acquire, |idle| {
                Some(idle.saturating_add(1))
            }) {
                Ok(previous) | Err(previous) => previous.saturating_add(1),
            };
            if idle == 1 {
                log::trace!("[Region] {} unanchored, unload countdown started", self.pos);
            }
            return if idle >= params.unload_delay_ticks {
                TickOutcome::Expired
            } else {
                TickOutcome::Idle
            };
        }

        self.idle_ticks.store(0, Ordering::Release);

        if self.is_active() && self.is_prepared() {
            let mut rng = rand::thread_rng();
            let local = LocalTile::new(
                rng.gen_range(0..REGION_TILES) as u16,
                rng.gen_range(0..REGION_TILES) as u16,
            );
            hooks.random_tile_update(self, local);
        }

        let since_save = params
            .world_age
            .saturating_sub(self.last_save_age.load(Ordering::Acquire));
        if self.has_unsaved_changes() && since_save >= params.autosave_interval_ticks {
            return TickOutcome::Autosave;
        }

        TickOutcome::Idle
    }

    /// Ticks spent unanchored so far
    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks.load(Ordering::Acquire)
    }

    /// Restart the unload countdown from zero
    pub(crate) fn reset_countdown(&self) {
        self.idle_ticks.store(0, Ordering::Release);
    }

    // ---------------------------------------------------------------------
    // Readiness
    // ---------------------------------------------------------------------

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn is_generated(&self) -> bool {
        self.generated.load(Ordering::Acquire)
    }

    pub fn has_deferred_structures(&self) -> bool {
        !self.deferred.lock().is_empty()
    }

    /// Safe for gameplay: loaded, generated and no structure stamps outstanding
    pub fn is_prepared(&self) -> bool {
        self.is_loaded() && self.is_generated() && !self.has_deferred_structures()
    }

    pub fn load_state(&self) -> LoadState {
        *self.load_state.lock()
    }

    /// Block until the loader has finished with this region.
    ///
    /// There is no timeout: callers that need the region's data to stay
    /// correct (neighbour stamping during generation) must not proceed early.
    pub fn wait_until_loaded(&self) -> RegionResult<()> {
        let mut state = self.load_state.lock();
        while *state == LoadState::Pending {
            self.loaded_signal.wait(&mut state);
        }
        match *state {
            LoadState::Failed => Err(RegionError::LoadFailed { pos: self.pos }),
            _ => Ok(()),
        }
    }

    /// First caller wins the right to read the region from storage
    pub fn claim_load(&self) -> bool {
        !self.load_claimed.swap(true, Ordering::AcqRel)
    }

    /// Install persisted content (or keep the fresh grid when there is none)
    /// and wake every waiter.
    pub fn finish_load(&self, snapshot: Option<RegionSnapshot>) {
        if let Some(snapshot) = snapshot {
            debug_assert_eq!(snapshot.pos, self.pos);
            let mut deferred = self.deferred.lock();
            *self.slices.write() = snapshot.slices;
            deferred.extend(snapshot.deferred);
            self.generated.store(snapshot.generated, Ordering::Release);
            if snapshot.generated {
                self.generation_claimed.store(true, Ordering::Release);
            }
        }
        self.set_load_state(LoadState::Loaded);
    }

    pub fn fail_load(&self) {
        self.set_load_state(LoadState::Failed);
    }

    fn set_load_state(&self, next: LoadState) {
        let mut state = self.load_state.lock();
        *state = next;
        self.loaded.store(next == LoadState::Loaded, Ordering::Release);
        self.loaded_signal.notify_all();
    }

    // ---------------------------------------------------------------------
    // Generation
    // ---------------------------------------------------------------------

    /// First caller wins the right to generate; false once generated
    pub fn claim_generation(&self) -> bool {
        !self.is_generated() && !self.generation_claimed.swap(true, Ordering::AcqRel)
    }

    /// Install generated terrain, apply this region's own stamps, then drain
    /// stamps queued by neighbours. The `generated` flag flips while the
    /// deferred queue is locked so no stamp can slip in between.
    pub fn finish_generation(&self, slices: Vec<Slice>, own_stamps: Vec<StructureStamp>) {
        let mut deferred = self.deferred.lock();
        {
            let mut grid = self.slices.write();
            *grid = slices;
            for stamp in own_stamps.iter().chain(deferred.iter()) {
                apply_stamp(&mut grid, self.pos, stamp);
            }
        }
        let drained = deferred.len();
        deferred.clear();
        self.generated.store(true, Ordering::Release);
        self.unsaved_changes.store(true, Ordering::Release);
        if drained > 0 {
            log::debug!("[Region] {} applied {} deferred structure stamps", self.pos, drained);
        }
    }

    /// Apply a neighbour's stamp now if terrain exists, otherwise queue it
    pub fn stamp_or_defer(&self, stamp: StructureStamp) {
        let mut deferred = self.deferred.lock();
        if self.is_generated() {
            apply_stamp(&mut self.slices.write(), self.pos, &stamp);
            self.unsaved_changes.store(true, Ordering::Release);
        } else {
            deferred.push_back(stamp);
            // The queue is part of the persisted image
            self.unsaved_changes.store(true, Ordering::Release);
        }
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.lock().len()
    }

    // ---------------------------------------------------------------------
    // Tiles
    // ---------------------------------------------------------------------

    pub fn tile(&self, local: LocalTile) -> TileId {
        self.slices.read()[local.slice_index()].get(local.tile_index())
    }

    pub fn set_tile(&self, local: LocalTile, tile: TileId) {
        self.slices.write()[local.slice_index()].set(local.tile_index(), tile);
        self.unsaved_changes.store(true, Ordering::Release);
    }

    /// Read access to the whole slice grid
    pub fn with_slices<R>(&self, f: impl FnOnce(&[Slice]) -> R) -> R {
        f(&self.slices.read())
    }

    // ---------------------------------------------------------------------
    // Persistence bookkeeping
    // ---------------------------------------------------------------------

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved_changes.load(Ordering::Acquire)
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    pub fn has_pending_save(&self) -> bool {
        self.pending_save.load(Ordering::Acquire)
    }

    /// Returns true when the caller must dispatch a save. If one is already
    /// in flight the request is folded into `pending_save` instead.
    pub(crate) fn request_save(&self, world_age: u64) -> bool {
        self.last_save_age.store(world_age, Ordering::Release);
        if self.saving.swap(true, Ordering::AcqRel) {
            self.pending_save.store(true, Ordering::Release);
            false
        } else {
            true
        }
    }

    /// Returns true when a save was requested while the last one ran; the
    /// region then stays in `saving` and the caller re-dispatches.
    pub(crate) fn complete_save(&self) -> bool {
        if self.pending_save.swap(false, Ordering::AcqRel) {
            true
        } else {
            self.saving.store(false, Ordering::Release);
            false
        }
    }

    /// Capture a persistable image and clear `unsaved_changes`
    pub fn take_snapshot(&self) -> RegionSnapshot {
        let deferred = self.deferred.lock();
        let slices = self.slices.read().clone();
        self.unsaved_changes.store(false, Ordering::Release);
        RegionSnapshot {
            pos: self.pos,
            generated: self.is_generated(),
            slices,
            deferred: deferred.iter().cloned().collect(),
        }
    }
}

fn apply_stamp(grid: &mut [Slice], region: RegionPos, stamp: &StructureStamp) {
    for (pos, tile) in &stamp.tiles {
        if pos.to_region_pos() != region {
            log::warn!("[Region] Stamp tile {:?} does not belong to region {}, skipping", pos, region);
            continue;
        }
        let local = pos.to_local();
        grid[local.slice_index()].set(local.tile_index(), *tile);
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("pos", &self.pos)
            .field("load_state", &self.load_state())
            .field("generated", &self.is_generated())
            .field("active", &self.is_active())
            .field("anchors", &self.anchor_count())
            .field("active_neighbours", &self.active_neighbour_count())
            .field("saving", &self.is_saving())
            .finish()
    }
}

mod common;

use std::sync::Arc;

use common::{harness, Harness};
use terra_regions::constants::geometry::REGION_TILES;
use terra_regions::streaming::WindowRect;
use terra_regions::{RegionPos, SharedTarget, StreamingWindow, TilePos};

fn tile_in(region: RegionPos) -> TilePos {
    region.min_tile().offset(5, 9)
}

fn anchors(h: &Harness, pos: RegionPos) -> u32 {
    h.store.region(pos).map(|r| r.anchor_count()).unwrap_or(0)
}

fn assert_window(h: &Harness, center: RegionPos, radius: i32) {
    let rect = WindowRect::around(center, radius);
    for pos in rect.positions() {
        assert_eq!(anchors(h, pos), 1, "{} should hold one anchor", pos);
    }
    // The ring around the window is loaded for activation but not anchored
    let ring = WindowRect::around(center, radius + 1);
    for pos in ring.positions().filter(|p| !rect.contains(*p)) {
        assert_eq!(anchors(h, pos), 0, "{} should not be anchored", pos);
    }
}

#[test]
fn test_first_update_anchors_whole_window() {
    let h = harness(5);
    let target = SharedTarget::new(tile_in(RegionPos::new(0, 0)));
    let mut window = StreamingWindow::new(h.store.clone(), target, 2);

    window.update();
    assert_window(&h, RegionPos::new(0, 0), 2);
    assert_eq!(window.anchored_rect(), Some(WindowRect::around(RegionPos::new(0, 0), 2)));
    // 5x5 anchored and active, plus the ring of inactive neighbours
    assert_eq!(h.store.num_regions(), 49);
    window.unload();
}

#[test]
fn test_unchanged_region_is_a_no_op() {
    let h = harness(5);
    let target = SharedTarget::new(TilePos::new(1, 1));
    let mut window = StreamingWindow::new(h.store.clone(), target.clone(), 1);
    window.update();
    let loads = h.loader.loads.lock().len();

    target.set(TilePos::new(REGION_TILES - 1, REGION_TILES - 1));
    window.update();
    assert_eq!(h.loader.loads.lock().len(), loads);
    assert_window(&h, RegionPos::new(0, 0), 1);
    window.unload();
}

#[test]
fn test_radius_one_step_moves_one_column() {
    let h = harness(5);
    let target = SharedTarget::new(tile_in(RegionPos::new(0, 0)));
    let mut window = StreamingWindow::new(h.store.clone(), target.clone(), 1);
    window.update();

    let kept: Vec<_> = (-1..=1)
        .map(|y| h.store.region(RegionPos::new(0, y)).unwrap())
        .collect();

    target.set(tile_in(RegionPos::new(1, 0)));
    window.update();

    for y in -1..=1 {
        assert_eq!(anchors(&h, RegionPos::new(-1, y)), 0, "left column released");
        assert_eq!(anchors(&h, RegionPos::new(2, y)), 1, "right column anchored");
    }
    for (y, region) in (-1..=1).zip(&kept) {
        assert!(Arc::ptr_eq(region, &h.store.region(RegionPos::new(0, y)).unwrap()));
        assert_eq!(region.anchor_count(), 1);
    }
    assert_window(&h, RegionPos::new(1, 0), 1);
    window.unload();
}

#[test]
fn test_diagonal_move_within_radius() {
    let h = harness(5);
    let target = SharedTarget::new(tile_in(RegionPos::new(0, 0)));
    let mut window = StreamingWindow::new(h.store.clone(), target.clone(), 3);
    window.update();

    target.set(tile_in(RegionPos::new(2, -3)));
    window.update();
    assert_eq!(window.center(), Some(RegionPos::new(2, -3)));
    assert_window(&h, RegionPos::new(2, -3), 3);
    window.unload();
}

#[test]
fn test_teleport_rebuilds_window() {
    let h = harness(5);
    let target = SharedTarget::new(tile_in(RegionPos::new(0, 0)));
    let mut window = StreamingWindow::new(h.store.clone(), target.clone(), 1);
    window.update();

    target.set(tile_in(RegionPos::new(50, 50)));
    window.update();

    assert_window(&h, RegionPos::new(50, 50), 1);
    for pos in WindowRect::around(RegionPos::new(0, 0), 1).positions() {
        assert_eq!(anchors(&h, pos), 0);
    }
    window.unload();
}

#[test]
fn test_jump_never_releases_shared_regions() {
    let h = harness(1);
    let target = SharedTarget::new(tile_in(RegionPos::new(0, 0)));
    let mut window = StreamingWindow::new(h.store.clone(), target.clone(), 2);
    window.update();

    // Shift of 3 exceeds the radius but the windows still share two columns
    let shared: Vec<_> = WindowRect::around(RegionPos::new(0, 0), 2)
        .positions()
        .filter(|p| p.x >= 1)
        .map(|p| h.store.region(p).unwrap())
        .collect();

    target.set(tile_in(RegionPos::new(3, 0)));
    window.update();
    h.store.update_regions();

    for region in &shared {
        let current = h.store.region(region.pos()).unwrap();
        assert!(Arc::ptr_eq(region, &current));
        assert_eq!(current.anchor_count(), 1);
        assert!(!h.hooks.unloaded().contains(&region.pos()));
        assert_eq!(h.loader.loads_of(region.pos()).len(), 1, "{} was reloaded", region.pos());
    }
    window.unload();
}

#[test]
fn test_unload_releases_every_anchor() {
    let h = harness(1);
    let target = SharedTarget::new(tile_in(RegionPos::new(-3, 4)));
    let mut window = StreamingWindow::new(h.store.clone(), target, 2);
    window.update();

    window.unload();
    assert_eq!(window.anchored_rect(), None);

    h.store.update_regions();
    assert_eq!(h.store.num_regions(), 0);
    h.loader.finish_saves();
    assert!(h.store.wait_until_done());
}

#[test]
fn test_growing_radius_keeps_existing_anchors() {
    let h = harness(5);
    let target = SharedTarget::new(tile_in(RegionPos::new(0, 0)));
    let mut window = StreamingWindow::new(h.store.clone(), target, 1);
    window.update();

    window.set_radius(2);
    assert_window(&h, RegionPos::new(0, 0), 2);

    window.set_radius(0);
    assert_window(&h, RegionPos::new(0, 0), 0);
    window.unload();
}

use std::sync::Arc;

use parking_lot::RwLock;

use crate::region::{RegionPos, TilePos};
use crate::store::RegionStore;

/// Something the window follows
pub trait StreamTarget {
    fn tile_pos(&self) -> TilePos;
}

impl StreamTarget for TilePos {
    fn tile_pos(&self) -> TilePos {
        *self
    }
}

/// Observer position shared with whatever moves it
#[derive(Debug, Clone, Default)]
pub struct SharedTarget(Arc<RwLock<TilePos>>);

impl SharedTarget {
    pub fn new(pos: TilePos) -> Self {
        Self(Arc::new(RwLock::new(pos)))
    }

    pub fn set(&self, pos: TilePos) {
        *self.0.write() = pos;
    }
}

impl StreamTarget for SharedTarget {
    fn tile_pos(&self) -> TilePos {
        *self.0.read()
    }
}

/// Inclusive rectangle of region coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRect {
    pub min: RegionPos,
    pub max: RegionPos,
}

impl WindowRect {
    pub fn around(center: RegionPos, radius: i32) -> Self {
        Self {
            min: center.offset(-radius, -radius),
            max: center.offset(radius, radius),
        }
    }

    pub fn contains(&self, pos: RegionPos) -> bool {
        pos.x >= self.min.x && pos.x <= self.max.x && pos.y >= self.min.y && pos.y <= self.max.y
    }

    pub fn area(&self) -> usize {
        ((self.max.x - self.min.x + 1) * (self.max.y - self.min.y + 1)) as usize
    }

    pub fn positions(&self) -> impl Iterator<Item = RegionPos> {
        let (min, max) = (self.min, self.max);
        (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| RegionPos::new(x, y)))
    }
}

/// Square window of anchored regions centred on a moving target.
///
/// Every region inside the window holds exactly one anchor from the window.
/// Moves anchor the new cells before releasing the old ones, so a region
/// that stays covered never drops to zero anchors along the way.
pub struct StreamingWindow<T: StreamTarget> {
    store: Arc<RegionStore>,
    target: T,
    radius: i32,
    center: Option<RegionPos>,
}

impl<T: StreamTarget> StreamingWindow<T> {
    pub fn new(store: Arc<RegionStore>, target: T, radius: i32) -> Self {
        assert!(radius >= 0, "window radius must not be negative");
        Self {
            store,
            target,
            radius,
            center: None,
        }
    }

    pub fn radius(&self) -> i32 {
        self.radius
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn center(&self) -> Option<RegionPos> {
        self.center
    }

    /// Bounds of the currently anchored window
    pub fn anchored_rect(&self) -> Option<WindowRect> {
        self.center.map(|c| WindowRect::around(c, self.radius))
    }

    /// Follow the target. Small moves slide the window cell by cell; a jump
    /// further than the radius on either axis rebuilds it.
    pub fn update(&mut self) {
        let next = self.target.tile_pos().to_region_pos();
        let Some(current) = self.center else {
            self.refresh();
            return;
        };
        if current == next {
            return;
        }

        let dx = next.x - current.x;
        let dy = next.y - current.y;
        if dx.abs() > self.radius || dy.abs() > self.radius {
            log::debug!("[StreamingWindow] Jump {} -> {}, rebuilding window", current, next);
            self.refresh();
            return;
        }

        for _ in 0..dx.abs() {
            self.step(dx.signum(), 0);
        }
        for _ in 0..dy.abs() {
            self.step(0, dy.signum());
        }
    }

    /// Anchor the full window around the target, then release the old one
    pub fn refresh(&mut self) {
        let next = self.target.tile_pos().to_region_pos();
        let old = self.anchored_rect();

        for pos in WindowRect::around(next, self.radius).positions() {
            self.store.anchor(pos);
        }
        if let Some(old) = old {
            for pos in old.positions() {
                self.store.deanchor(pos);
            }
        }
        self.center = Some(next);
    }

    /// Release every anchor held by the window
    pub fn unload(&mut self) {
        if let Some(rect) = self.anchored_rect() {
            for pos in rect.positions() {
                self.store.deanchor(pos);
            }
        }
        self.center = None;
    }

    /// Resize around the current centre, anchoring before releasing
    pub fn set_radius(&mut self, radius: i32) {
        assert!(radius >= 0, "window radius must not be negative");
        let old = self.anchored_rect();
        self.radius = radius;
        if let (Some(old), Some(center)) = (old, self.center) {
            for pos in WindowRect::around(center, radius).positions() {
                self.store.anchor(pos);
            }
            for pos in old.positions() {
                self.store.deanchor(pos);
            }
        }
    }

    /// Slide one cell along a single axis
    fn step(&mut self, dx: i32, dy: i32) {
        let Some(center) = self.center else {
            return;
        };
        let r = self.radius;
        let (entered, exited): (Vec<RegionPos>, Vec<RegionPos>) = if dx != 0 {
            let enter_x = center.x + dx * (r + 1);
            let exit_x = center.x - dx * r;
            (center.y - r..=center.y + r)
                .map(|y| (RegionPos::new(enter_x, y), RegionPos::new(exit_x, y)))
                .unzip()
        } else {
            let enter_y = center.y + dy * (r + 1);
            let exit_y = center.y - dy * r;
            (center.x - r..=center.x + r)
                .map(|x| (RegionPos::new(x, enter_y), RegionPos::new(x, exit_y)))
                .unzip()
        };

        for pos in entered {
            self.store.anchor(pos);
        }
        for pos in exited {
            self.store.deanchor(pos);
        }
        self.center = Some(center.offset(dx, dy));
    }
}

impl<T: StreamTarget> Drop for StreamingWindow<T> {
    fn drop(&mut self) {
        if let Some(center) = self.center {
            log::warn!(
                "[StreamingWindow] Dropped while anchoring around {}; call unload() first",
                center
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_positions_cover_area() {
        let rect = WindowRect::around(RegionPos::new(0, 0), 2);
        let positions: Vec<_> = rect.positions().collect();
        assert_eq!(positions.len(), 25);
        assert_eq!(rect.area(), 25);
        assert!(positions.iter().all(|p| rect.contains(*p)));
        assert!(!rect.contains(RegionPos::new(3, 0)));
    }

    #[test]
    fn test_zero_radius_rect_is_single_cell() {
        let rect = WindowRect::around(RegionPos::new(-4, 9), 0);
        assert_eq!(rect.positions().collect::<Vec<_>>(), vec![RegionPos::new(-4, 9)]);
    }
}

//! Per-window render caches
//!
//! The render pipeline keeps a cache per unified window: the last drawn
//! viewport, the cursor bookkeeping used to detect mark movement and new
//! cursors, and the animated-scroll record.  Caches are revalidated every
//! frame and rebuilt whenever the window shows a different buffer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::buffer::BufferId;
use crate::window::WindowId;

/// Animation from one viewport line to another.  Interpolation is linear
/// in line space over `min(200ms, 2ms per line)`.
#[derive(Clone, Copy, Debug)]
pub struct AnimatedScroll {
    pub start_time: Instant,
    pub start_line: u64,
    pub end_line: u64,
    pub end_position: u64,
}

const MAX_ANIMATION: Duration = Duration::from_millis(200);
const PER_LINE: Duration = Duration::from_millis(2);

impl AnimatedScroll {
    pub fn new(now: Instant, start_line: u64, end_line: u64, end_position: u64) -> AnimatedScroll {
        AnimatedScroll {
            start_time: now,
            start_line,
            end_line,
            end_position,
        }
    }

    pub fn duration(&self) -> Duration {
        let distance = self.end_line.abs_diff(self.start_line);
        (PER_LINE * distance as u32).min(MAX_ANIMATION)
    }

    pub fn finished(&self, now: Instant) -> bool {
        now.duration_since(self.start_time) >= self.duration()
    }

    /// The line to draw from at `now`.
    pub fn interpolated_line(&self, now: Instant) -> u64 {
        let duration = self.duration();
        if duration.is_zero() {
            return self.end_line;
        }
        let elapsed = now.duration_since(self.start_time).min(duration);
        let t = elapsed.as_secs_f64() / duration.as_secs_f64();
        let from = self.start_line as f64;
        let to = self.end_line as f64;
        (from + (to - from) * t).round() as u64
    }
}

/// Cached viewport state for one unified window.
pub struct WindowCache {
    pub buffer_id: BufferId,
    /// Change-log length the viewport bookkeeping was built against.
    pub change_index: usize,
    /// Byte offset of the first glyph drawn last frame.
    pub visible_start: u64,
    /// One past the last byte drawn last frame.
    pub visible_end: u64,
    pub cursor_count: usize,
    pub selected_cursor_mark: u64,
    pub animation: Option<AnimatedScroll>,
}

impl WindowCache {
    pub fn new(buffer_id: BufferId) -> WindowCache {
        WindowCache {
            buffer_id,
            change_index: 0,
            visible_start: 0,
            visible_end: 0,
            cursor_count: 1,
            selected_cursor_mark: 0,
            animation: None,
        }
    }

    /// Start, retarget, or finish the scroll animation toward
    /// `target_line`.  Returns the line to draw from this frame.
    ///
    /// A retarget mid-flight restarts from the currently interpolated
    /// line, never from either endpoint.
    pub fn animate_toward(
        &mut self,
        now: Instant,
        current_line: u64,
        target_line: u64,
        target_position: u64,
        allow_animation: bool,
    ) -> u64 {
        if !allow_animation {
            self.animation = None;
            return target_line;
        }

        match self.animation {
            Some(animation) if animation.end_position == target_position => {}
            _ => {
                let from_line = self
                    .animation
                    .map(|animation| animation.interpolated_line(now))
                    .unwrap_or(current_line);
                if from_line == target_line {
                    self.animation = None;
                    return target_line;
                }
                self.animation = Some(AnimatedScroll::new(
                    now,
                    from_line,
                    target_line,
                    target_position,
                ));
            }
        }

        let animation = self.animation.expect("animation is active");
        if animation.finished(now) {
            self.animation = None;
            target_line
        } else {
            animation.interpolated_line(now)
        }
    }
}

/// All window caches, keyed by window id.  Stale entries (window closed or
/// buffer swapped) are dropped on revalidation.
#[derive(Default)]
pub struct WindowCaches {
    caches: HashMap<WindowId, WindowCache>,
}

impl WindowCaches {
    pub fn new() -> WindowCaches {
        WindowCaches::default()
    }

    /// The cache for `window`, rebuilt if it tracks a different buffer.
    pub fn validate(&mut self, window: WindowId, buffer_id: BufferId) -> &mut WindowCache {
        let entry = self
            .caches
            .entry(window)
            .or_insert_with(|| WindowCache::new(buffer_id));
        if entry.buffer_id != buffer_id {
            *entry = WindowCache::new(buffer_id);
        }
        entry
    }

    /// Drop caches for windows not in `live`.
    pub fn retain_windows(&mut self, live: &[WindowId]) {
        self.caches.retain(|id, _| live.contains(id));
    }

    pub fn get(&self, window: WindowId) -> Option<&WindowCache> {
        self.caches.get(&window)
    }

    /// Clear scroll animations and viewport bookkeeping (used when undo
    /// rewinds a buffer under the windows).
    pub fn invalidate_buffer(&mut self, buffer_id: BufferId) {
        self.caches.retain(|_, cache| cache.buffer_id != buffer_id);
    }
}

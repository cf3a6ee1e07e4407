//! Gesture state flags
//!
//! Scrolling, scaling and flinging are independent bits: a pinch can start
//! while a drag is still reported as scrolling.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GestureFlags(u8);

impl GestureFlags {
    pub const NONE: GestureFlags = GestureFlags(0);
    pub const SCROLLING: GestureFlags = GestureFlags(1);
    pub const SCALING: GestureFlags = GestureFlags(1 << 1);
    pub const FLINGING: GestureFlags = GestureFlags(1 << 2);

    #[must_use]
    pub fn contains(self, other: GestureFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn intersects(self, other: GestureFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: GestureFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: GestureFlags) {
        self.0 &= !other.0;
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for GestureFlags {
    type Output = GestureFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        GestureFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for GestureFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for GestureFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::SCROLLING) {
            names.push("SCROLLING");
        }
        if self.contains(Self::SCALING) {
            names.push("SCALING");
        }
        if self.contains(Self::FLINGING) {
            names.push("FLINGING");
        }
        if names.is_empty() {
            names.push("NONE");
        }
        write!(f, "GestureFlags({})", names.join(" | "))
    }
}

/// Input-level gesture transitions reported by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureEvent {
    ScrollStart,
    ScrollEnd,
    ScaleBegin,
    ScaleEnd,
    FlingStart,
    FlingEnd,
    /// Last pointer lifted
    PointerUp,
    Cancel,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GestureTracker {
    flags: GestureFlags,
}

impl GestureTracker {
    #[must_use]
    pub fn flags(&self) -> GestureFlags {
        self.flags
    }

    /// Applies an event, returning the flags that were cleared by it
    pub fn apply(&mut self, event: GestureEvent) -> GestureFlags {
        let before = self.flags;
        match event {
            GestureEvent::ScrollStart => self.flags.insert(GestureFlags::SCROLLING),
            GestureEvent::ScrollEnd => self.flags.remove(GestureFlags::SCROLLING),
            GestureEvent::ScaleBegin => self.flags.insert(GestureFlags::SCALING),
            GestureEvent::ScaleEnd => self.flags.remove(GestureFlags::SCALING),
            GestureEvent::FlingStart => self.flags.insert(GestureFlags::FLINGING),
            GestureEvent::FlingEnd => self.flags.remove(GestureFlags::FLINGING),
            GestureEvent::PointerUp | GestureEvent::Cancel => {
                self.flags
                    .remove(GestureFlags::SCROLLING | GestureFlags::SCALING);
            }
        }
        GestureFlags(before.0 & !self.flags.0)
    }

    #[must_use]
    pub fn is_scrolling(&self) -> bool {
        self.flags.contains(GestureFlags::SCROLLING)
    }

    #[must_use]
    pub fn is_scaling(&self) -> bool {
        self.flags.contains(GestureFlags::SCALING)
    }

    #[must_use]
    pub fn is_flinging(&self) -> bool {
        self.flags.contains(GestureFlags::FLINGING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_independent() {
        let mut tracker = GestureTracker::default();
        tracker.apply(GestureEvent::ScrollStart);
        tracker.apply(GestureEvent::ScaleBegin);
        assert!(tracker.is_scrolling() && tracker.is_scaling());

        tracker.apply(GestureEvent::ScaleEnd);
        assert!(tracker.is_scrolling());
        assert!(!tracker.is_scaling());
    }

    #[test]
    fn pointer_up_clears_scroll_and_scale_only() {
        let mut tracker = GestureTracker::default();
        tracker.apply(GestureEvent::ScrollStart);
        tracker.apply(GestureEvent::ScaleBegin);
        tracker.apply(GestureEvent::FlingStart);

        let cleared = tracker.apply(GestureEvent::PointerUp);
        assert_eq!(cleared, GestureFlags::SCROLLING | GestureFlags::SCALING);
        assert_eq!(tracker.flags(), GestureFlags::FLINGING);

        tracker.apply(GestureEvent::Cancel);
        assert!(tracker.is_flinging());
    }

    #[test]
    fn debug_lists_set_flags() {
        let flags = GestureFlags::SCROLLING | GestureFlags::FLINGING;
        assert_eq!(format!("{flags:?}"), "GestureFlags(SCROLLING | FLINGING)");
        assert_eq!(format!("{:?}", GestureFlags::NONE), "GestureFlags(NONE)");
    }
}

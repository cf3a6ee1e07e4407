//! Viewport animations
//!
//! At most one animation is active: starting any animation replaces the
//! previous one. Time is passed in by the caller so frames are reproducible.

use std::time::{Duration, Instant};

pub const DEFAULT_ANIMATION_DURATION: Duration = Duration::from_millis(400);
/// Fling slow-down in pixels per second squared
pub const DEFAULT_FLING_DECELERATION: f32 = 4000.0;

/// Ease-out curve: fast start, gentle landing
#[must_use]
pub fn decelerate(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t) * (1.0 - t)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Tween {
    from: f32,
    to: f32,
    start: Instant,
    duration: Duration,
}

impl Tween {
    fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        now.saturating_duration_since(self.start).as_secs_f32() / self.duration.as_secs_f32()
    }

    fn sample(&self, now: Instant) -> (f32, bool) {
        let t = self.progress(now);
        if t >= 1.0 {
            return (self.to, true);
        }
        (self.from + (self.to - self.from) * decelerate(t), false)
    }
}

/// Allowed offset range of a fling
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlingBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct AxisFling {
    start: f32,
    velocity: f32,
    min: f32,
    max: f32,
}

impl AxisFling {
    fn stop_time(&self, deceleration: f32) -> f32 {
        self.velocity.abs() / deceleration
    }

    fn position(&self, elapsed: f32, deceleration: f32) -> f32 {
        let t = elapsed.min(self.stop_time(deceleration));
        let travel = self.velocity * t - self.velocity.signum() * 0.5 * deceleration * t * t;
        let (lo, hi) = (self.min.min(self.max), self.max.max(self.min));
        (self.start + travel).clamp(lo, hi)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Fling {
    x: AxisFling,
    y: AxisFling,
    start: Instant,
    deceleration: f32,
}

impl Fling {
    fn sample(&self, now: Instant) -> ((f32, f32), bool) {
        let elapsed = now.saturating_duration_since(self.start).as_secs_f32();
        let x = self.x.position(elapsed, self.deceleration);
        let y = self.y.position(elapsed, self.deceleration);
        let finished = elapsed >= self.x.stop_time(self.deceleration)
            && elapsed >= self.y.stop_time(self.deceleration);
        ((x, y), finished)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Animation {
    Move { axis: Axis, tween: Tween },
    Zoom { tween: Tween, pivot: (f32, f32) },
    Fling(Fling),
}

/// What the active animation wants applied this frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimationStep {
    Move { axis: Axis, offset: f32 },
    Zoom { zoom: f32, pivot_x: f32, pivot_y: f32 },
    Fling { x: f32, y: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimationFrame {
    pub step: AnimationStep,
    /// Last frame of the animation, it is no longer active
    pub finished: bool,
}

#[derive(Clone, Debug)]
pub struct Animator {
    active: Option<Animation>,
    duration: Duration,
    deceleration: f32,
}

impl Default for Animator {
    fn default() -> Self {
        Self::new(DEFAULT_ANIMATION_DURATION, DEFAULT_FLING_DECELERATION)
    }
}

impl Animator {
    #[must_use]
    pub fn new(duration: Duration, deceleration: f32) -> Self {
        Self {
            active: None,
            duration,
            deceleration: if deceleration.is_finite() && deceleration > 0.0 {
                deceleration
            } else {
                DEFAULT_FLING_DECELERATION
            },
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn start_x(&mut self, from: f32, to: f32, now: Instant) {
        self.start_move(Axis::X, from, to, now);
    }

    pub fn start_y(&mut self, from: f32, to: f32, now: Instant) {
        self.start_move(Axis::Y, from, to, now);
    }

    pub fn start_move(&mut self, axis: Axis, from: f32, to: f32, now: Instant) {
        self.active = Some(Animation::Move {
            axis,
            tween: self.tween(from, to, now),
        });
    }

    pub fn start_zoom(&mut self, from: f32, to: f32, pivot: (f32, f32), now: Instant) {
        self.active = Some(Animation::Zoom {
            tween: self.tween(from, to, now),
            pivot,
        });
    }

    pub fn start_fling(
        &mut self,
        start: (f32, f32),
        velocity: (f32, f32),
        bounds: FlingBounds,
        now: Instant,
    ) {
        self.active = Some(Animation::Fling(Fling {
            x: AxisFling {
                start: start.0,
                velocity: velocity.0,
                min: bounds.min_x,
                max: bounds.max_x,
            },
            y: AxisFling {
                start: start.1,
                velocity: velocity.1,
                min: bounds.min_y,
                max: bounds.max_y,
            },
            start: now,
            deceleration: self.deceleration,
        }));
    }

    fn tween(&self, from: f32, to: f32, now: Instant) -> Tween {
        Tween {
            from,
            to,
            start: now,
            duration: self.duration,
        }
    }

    /// Stops whatever runs, returns whether something was running
    pub fn stop(&mut self) -> bool {
        self.active.take().is_some()
    }

    pub fn stop_fling(&mut self) -> bool {
        if self.is_flinging() {
            self.active = None;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn is_flinging(&self) -> bool {
        matches!(self.active, Some(Animation::Fling(_)))
    }

    /// Samples the active animation at `now`, retiring it on its last frame
    pub fn tick(&mut self, now: Instant) -> Option<AnimationFrame> {
        let animation = self.active?;
        let (step, finished) = match animation {
            Animation::Move { axis, tween } => {
                let (offset, done) = tween.sample(now);
                (AnimationStep::Move { axis, offset }, done)
            }
            Animation::Zoom { tween, pivot } => {
                let (zoom, done) = tween.sample(now);
                (
                    AnimationStep::Zoom {
                        zoom,
                        pivot_x: pivot.0,
                        pivot_y: pivot.1,
                    },
                    done,
                )
            }
            Animation::Fling(fling) => {
                let ((x, y), done) = fling.sample(now);
                (AnimationStep::Fling { x, y }, done)
            }
        };
        if finished {
            self.active = None;
        }
        Some(AnimationFrame { step, finished })
    }
}

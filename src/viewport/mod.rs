//! UI-thread viewport: offsets, zoom, gestures and animations

pub mod animation;
pub mod controller;
pub mod gesture;
pub mod view_state;

pub use animation::{
    AnimationFrame, AnimationStep, Animator, Axis, DEFAULT_ANIMATION_DURATION,
    DEFAULT_FLING_DECELERATION, FlingBounds,
};
pub use controller::{
    DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, ScrollDir, ScrollHandle, SnapEdge, ViewportController,
    ZoomLimits,
};
pub use gesture::{GestureEvent, GestureFlags, GestureTracker};
pub use view_state::{ViewState, ViewStates};

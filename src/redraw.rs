//! Frame loop
//!
//! A dedicated thread repeatedly locks a frame from a [`DrawSurface`], hands
//! it to the frame callback and posts it back, at most once per frame
//! interval. The loop can be paused, resumed, stopped and started again.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Something frames can be drawn into
pub trait DrawSurface: Send + 'static {
    type Frame;

    /// Borrows the next frame; `None` when the surface is not ready
    fn lock_frame(&mut self) -> Option<Self::Frame>;

    /// Returns a drawn frame to the surface
    fn post_frame(&mut self, frame: Self::Frame);
}

pub type FrameRenderer<F> = Box<dyn FnMut(&mut F) -> anyhow::Result<()> + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Dead,
    Started,
    Paused,
}

struct Drawing<S: DrawSurface> {
    surface: S,
    renderer: FrameRenderer<S::Frame>,
}

struct Shared {
    state: Mutex<LoopState>,
    wake: Condvar,
    frames: AtomicU64,
}

impl Shared {
    fn state(&self) -> std::sync::MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ReDrawer<S: DrawSurface> {
    shared: Arc<Shared>,
    drawing: Arc<Mutex<Drawing<S>>>,
    interval: Duration,
    thread: Option<JoinHandle<()>>,
}

impl<S: DrawSurface> ReDrawer<S> {
    pub fn new(surface: S, interval: Duration, renderer: FrameRenderer<S::Frame>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LoopState::Dead),
                wake: Condvar::new(),
                frames: AtomicU64::new(0),
            }),
            drawing: Arc::new(Mutex::new(Drawing { surface, renderer })),
            interval,
            thread: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> LoopState {
        *self.shared.state()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Started
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state() == LoopState::Paused
    }

    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.state() == LoopState::Dead
    }

    /// Started or paused
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.is_dead()
    }

    #[must_use]
    pub fn frames_drawn(&self) -> u64 {
        self.shared.frames.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs `f` against the surface while no frame is being drawn
    pub fn with_surface<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut drawing = self.drawing.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut drawing.surface)
    }

    pub fn set_renderer(&self, renderer: FrameRenderer<S::Frame>) {
        let mut drawing = self.drawing.lock().unwrap_or_else(PoisonError::into_inner);
        drawing.renderer = renderer;
    }

    /// Starts the loop thread. A paused loop is resumed instead; a running
    /// loop is left alone.
    pub fn start(&mut self) -> std::io::Result<()> {
        {
            let mut state = self.shared.state();
            match *state {
                LoopState::Started => return Ok(()),
                LoopState::Paused => {
                    *state = LoopState::Started;
                    self.shared.wake.notify_all();
                    return Ok(());
                }
                LoopState::Dead => {}
            }
        }
        self.join_thread();

        *self.shared.state() = LoopState::Started;
        let shared = Arc::clone(&self.shared);
        let drawing = Arc::clone(&self.drawing);
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name("pageview-redraw".to_string())
            .spawn(move || run_loop(&shared, &drawing, interval));
        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                info!("Frame loop started ({interval:?} interval)");
                Ok(())
            }
            Err(e) => {
                *self.shared.state() = LoopState::Dead;
                Err(e)
            }
        }
    }

    /// Returns false unless the loop was running
    pub fn pause(&self) -> bool {
        let mut state = self.shared.state();
        if *state != LoopState::Started {
            return false;
        }
        *state = LoopState::Paused;
        self.shared.wake.notify_all();
        debug!("Frame loop paused");
        true
    }

    pub fn resume(&self) -> bool {
        let mut state = self.shared.state();
        if *state != LoopState::Paused {
            return false;
        }
        *state = LoopState::Started;
        self.shared.wake.notify_all();
        debug!("Frame loop resumed");
        true
    }

    /// Stops the loop and waits for its thread to exit
    pub fn stop(&mut self) {
        {
            let mut state = self.shared.state();
            *state = LoopState::Dead;
            self.shared.wake.notify_all();
        }
        if self.join_thread() {
            info!("Frame loop stopped after {} frames", self.frames_drawn());
        }
    }

    fn join_thread(&mut self) -> bool {
        let Some(handle) = self.thread.take() else {
            return false;
        };
        if handle.join().is_err() {
            error!("Frame loop thread panicked");
        }
        true
    }
}

impl<S: DrawSurface> Drop for ReDrawer<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<S: DrawSurface>(shared: &Shared, drawing: &Mutex<Drawing<S>>, interval: Duration) {
    loop {
        {
            let mut state = shared.state();
            while *state == LoopState::Paused {
                state = shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if *state == LoopState::Dead {
                break;
            }
        }

        let started = Instant::now();
        draw_frame(shared, drawing);

        let remaining = interval.saturating_sub(started.elapsed());
        let state = shared.state();
        if *state == LoopState::Dead {
            break;
        }
        if !remaining.is_zero() {
            let _ = shared
                .wake
                .wait_timeout_while(state, remaining, |s| *s == LoopState::Started)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

fn draw_frame<S: DrawSurface>(shared: &Shared, drawing: &Mutex<Drawing<S>>) {
    let mut guard = drawing.lock().unwrap_or_else(PoisonError::into_inner);
    let drawing = &mut *guard;
    let Some(mut frame) = drawing.surface.lock_frame() else {
        debug!("Surface not ready, skipping frame");
        return;
    };

    let renderer = &mut drawing.renderer;
    match catch_unwind(AssertUnwindSafe(|| renderer(&mut frame))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Frame render failed: {e:#}"),
        Err(_) => error!("Frame renderer panicked"),
    }
    drawing.surface.post_frame(frame);
    shared.frames.fetch_add(1, Ordering::AcqRel);
}

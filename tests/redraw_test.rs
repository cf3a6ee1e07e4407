use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pageview::canvas::{Canvas, CanvasSurface, PixelCanvas};
use pageview::geometry::{Color, Rect, Size};
use pageview::redraw::{DrawSurface, LoopState, ReDrawer};

const INTERVAL: Duration = Duration::from_millis(2);
const WAIT: Duration = Duration::from_secs(5);

/// Surface handing out plain counters, optionally refusing frames
#[derive(Clone, Default)]
struct CountingSurface {
    ready: Arc<AtomicBool>,
    posted: Arc<AtomicUsize>,
}

impl CountingSurface {
    fn ready() -> Self {
        let surface = Self::default();
        surface.ready.store(true, Ordering::SeqCst);
        surface
    }
}

impl DrawSurface for CountingSurface {
    type Frame = usize;

    fn lock_frame(&mut self) -> Option<usize> {
        self.ready
            .load(Ordering::SeqCst)
            .then(|| self.posted.load(Ordering::SeqCst))
    }

    fn post_frame(&mut self, _frame: usize) {
        self.posted.fetch_add(1, Ordering::SeqCst);
    }
}

fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

#[test]
fn test_loop_draws_frames_until_stopped() {
    let surface = CountingSurface::ready();
    let posted = Arc::clone(&surface.posted);
    let mut redrawer = ReDrawer::new(surface, INTERVAL, Box::new(|_: &mut usize| Ok(())));
    assert_eq!(redrawer.state(), LoopState::Dead);

    redrawer.start().unwrap();
    assert!(redrawer.is_running());
    assert!(wait_for(|| redrawer.frames_drawn() >= 5));

    redrawer.stop();
    assert!(redrawer.is_dead());
    let drawn = redrawer.frames_drawn();
    assert_eq!(posted.load(Ordering::SeqCst) as u64, drawn);

    thread::sleep(INTERVAL * 10);
    assert_eq!(redrawer.frames_drawn(), drawn);
}

#[test]
fn test_paused_loop_draws_nothing() {
    let mut redrawer = ReDrawer::new(
        CountingSurface::ready(),
        INTERVAL,
        Box::new(|_: &mut usize| Ok(())),
    );
    redrawer.start().unwrap();
    assert!(wait_for(|| redrawer.frames_drawn() >= 1));

    assert!(redrawer.pause());
    assert!(!redrawer.pause());
    assert!(redrawer.is_paused());
    assert!(redrawer.is_alive());
    // a frame in progress when pausing may still land
    thread::sleep(INTERVAL * 5);
    let frozen = redrawer.frames_drawn();
    thread::sleep(INTERVAL * 20);
    assert_eq!(redrawer.frames_drawn(), frozen);

    assert!(redrawer.resume());
    assert!(!redrawer.resume());
    assert!(wait_for(|| redrawer.frames_drawn() > frozen));
    redrawer.stop();
}

#[test]
fn test_start_resumes_a_paused_loop() {
    let mut redrawer = ReDrawer::new(
        CountingSurface::ready(),
        INTERVAL,
        Box::new(|_: &mut usize| Ok(())),
    );
    redrawer.start().unwrap();
    redrawer.pause();

    redrawer.start().unwrap();
    assert!(redrawer.is_running());
    let before = redrawer.frames_drawn();
    assert!(wait_for(|| redrawer.frames_drawn() > before));
}

#[test]
fn test_loop_can_restart_after_stop() {
    let mut redrawer = ReDrawer::new(
        CountingSurface::ready(),
        INTERVAL,
        Box::new(|_: &mut usize| Ok(())),
    );
    redrawer.start().unwrap();
    assert!(wait_for(|| redrawer.frames_drawn() >= 1));
    redrawer.stop();
    let first_run = redrawer.frames_drawn();

    redrawer.start().unwrap();
    assert!(wait_for(|| redrawer.frames_drawn() > first_run));
    redrawer.stop();
    assert!(!redrawer.pause());
}

#[test]
fn test_failing_renderer_keeps_the_loop_alive() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut redrawer = ReDrawer::new(
        CountingSurface::ready(),
        INTERVAL,
        Box::new(move |_: &mut usize| {
            match counter.fetch_add(1, Ordering::SeqCst) % 3 {
                0 => anyhow::bail!("no content yet"),
                1 => panic!("renderer bug"),
                _ => Ok(()),
            }
        }),
    );

    redrawer.start().unwrap();
    assert!(wait_for(|| calls.load(Ordering::SeqCst) >= 9));
    assert!(redrawer.is_running());
    redrawer.stop();
    // every attempted frame is still posted back
    assert!(redrawer.frames_drawn() >= 9);
}

#[test]
fn test_unready_surface_skips_frames() {
    let surface = CountingSurface::default();
    let ready = Arc::clone(&surface.ready);
    let mut redrawer = ReDrawer::new(surface, INTERVAL, Box::new(|_: &mut usize| Ok(())));

    redrawer.start().unwrap();
    thread::sleep(INTERVAL * 20);
    assert_eq!(redrawer.frames_drawn(), 0);
    assert!(redrawer.is_running());

    ready.store(true, Ordering::SeqCst);
    assert!(wait_for(|| redrawer.frames_drawn() >= 1));
}

#[test]
fn test_renderer_draws_into_canvas_surface() {
    let mut redrawer = ReDrawer::new(
        CanvasSurface::new(Size::new(40, 30)),
        INTERVAL,
        Box::new(|canvas: &mut PixelCanvas| {
            canvas.clear(Color::WHITE);
            canvas.fill_rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), Color::BLACK);
            Ok(())
        }),
    );
    redrawer.start().unwrap();
    assert!(wait_for(|| redrawer.frames_drawn() >= 2));
    redrawer.stop();

    redrawer.with_surface(|surface| {
        assert!(surface.frames_posted() >= 2);
        let canvas = surface.canvas().unwrap();
        assert_eq!(canvas.pixel(5, 5), Some([0, 0, 0, 255]));
        assert_eq!(canvas.pixel(20, 20), Some([255, 255, 255, 255]));
    });
}

#[test]
fn test_renderer_can_be_swapped() {
    let swapped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&swapped);
    let mut redrawer = ReDrawer::new(
        CountingSurface::ready(),
        INTERVAL,
        Box::new(|_: &mut usize| Ok(())),
    );
    redrawer.set_renderer(Box::new(move |_: &mut usize| {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    }));

    redrawer.start().unwrap();
    assert!(wait_for(|| swapped.load(Ordering::SeqCst)));
}

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info, warn};
use simplelog::{Config, LevelFilter, WriteLogger};

use pageview::canvas::{CanvasSurface, PixelCanvas};
use pageview::geometry::Size;
use pageview::layout::{FitPolicy, parse_viewport};
use pageview::panic_handler::initialize_panic_handler;
use pageview::redraw::ReDrawer;
use pageview::render::{PhotoRasterizer, SharedRasterizer, share};
use pageview::settings::{get_settings, load_settings, load_settings_from_path};
use pageview::view::DocumentView;
use pageview::viewport::ViewStates;
use pageview::{DocumentConfig, SwipeOrientation};

const STATE_FILENAME: &str = "view_state.json";

#[derive(Parser)]
#[command(name = "pageview")]
#[command(about = "Lays out and renders document pages into a PNG snapshot")]
#[command(version)]
struct Cli {
    /// Directory of images, or a PDF file when built with the `pdf` feature
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Page to show (0-based), overrides the saved position
    #[arg(short, long)]
    page: Option<usize>,

    /// Zoom factor, clamped to the configured limits
    #[arg(short, long)]
    zoom: Option<f32>,

    /// Viewport size as WIDTHxHEIGHT
    #[arg(long, default_value = "1080x1920", value_parser = parse_viewport)]
    viewport: Size,

    /// Fit policy: width, height, both or none
    #[arg(long, value_parser = parse_fit)]
    fit: Option<FitPolicy>,

    /// Lay pages out left to right
    #[arg(long)]
    horizontal: bool,

    /// Invert page colors
    #[arg(long)]
    night: bool,

    /// Output image
    #[arg(short, long, default_value = "page.png")]
    out: PathBuf,

    /// Frames to draw once the visible pages are rendered
    #[arg(long, default_value_t = 2)]
    frames: u64,

    /// Give up waiting for renders after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// View state file (defaults to the user data directory)
    #[arg(long)]
    state: Option<PathBuf>,

    #[arg(long, default_value = "pageview.log")]
    log_file: PathBuf,

    /// Log at info level instead of debug
    #[arg(short, long)]
    quiet: bool,
}

fn parse_fit(s: &str) -> Result<FitPolicy, pageview::layout::LayoutError> {
    s.parse()
}

fn default_state_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("pageview").join(STATE_FILENAME))
}

fn open_backend(source: &Path) -> Result<SharedRasterizer> {
    if source.is_dir() {
        let photos = PhotoRasterizer::open(source)
            .with_context(|| format!("Failed to open image directory {}", source.display()))?;
        return Ok(share(photos));
    }
    let is_pdf = source
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        #[cfg(feature = "pdf")]
        {
            let pdf = pageview::render::MuPdfRasterizer::open(source)
                .with_context(|| format!("Failed to open PDF {}", source.display()))?;
            return Ok(share(pdf));
        }
        #[cfg(not(feature = "pdf"))]
        bail!("PDF support requires building with the `pdf` feature");
    }
    bail!(
        "Unsupported source {}: expected an image directory or a PDF",
        source.display()
    )
}

fn lock(view: &Mutex<DocumentView>) -> MutexGuard<'_, DocumentView> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

fn document_config(cli: &Cli, mut config: DocumentConfig) -> DocumentConfig {
    if let Some(fit) = cli.fit {
        config.fit_policy = fit;
    }
    if cli.horizontal {
        config.orientation = SwipeOrientation::Horizontal;
    }
    if cli.night {
        config.night_mode = true;
    }
    config
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        LevelFilter::Info
    } else {
        LevelFilter::Debug
    };
    WriteLogger::init(level, Config::default(), File::create(&cli.log_file)?)?;
    initialize_panic_handler();

    info!("Starting pageview on {}", cli.source.display());

    match &cli.config {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    let settings = get_settings();

    let rasterizer = open_backend(&cli.source)?;
    let config = document_config(&cli, settings.document.clone());
    let mut view = DocumentView::open(rasterizer, config, cli.viewport, settings.view_options())?;
    if view.document().is_empty() {
        bail!("{} has no pages", cli.source.display());
    }

    let key = cli
        .source
        .canonicalize()
        .unwrap_or_else(|_| cli.source.clone())
        .display()
        .to_string();
    let state_path = cli.state.clone().or_else(default_state_path);
    let mut states = ViewStates::load_or_ephemeral(state_path.as_deref().and_then(Path::to_str));
    if let Some(state) = states.get(&key).cloned() {
        info!(
            "Restoring page {} at zoom {:.2}",
            state.current_page, state.zoom
        );
        view.restore_state(&state);
    }
    if let Some(zoom) = cli.zoom {
        view.zoom_to(zoom);
    }
    if let Some(page) = cli.page {
        view.jump_to_page(page);
    }

    let view = Arc::new(Mutex::new(view));
    let drawing_view = Arc::clone(&view);
    let mut redrawer = ReDrawer::new(
        CanvasSurface::new(cli.viewport),
        settings.frame_interval(),
        Box::new(move |canvas: &mut PixelCanvas| {
            lock(&drawing_view).draw(canvas);
            Ok(())
        }),
    );
    redrawer.start()?;

    let deadline = Instant::now() + Duration::from_secs(cli.timeout);
    let mut ready_at_frame = None;
    loop {
        let ready = {
            let mut view = lock(&view);
            view.pump(Instant::now());
            view.visible_pages_ready() && !view.controller().is_animating()
        };
        if ready && ready_at_frame.is_none() {
            ready_at_frame = Some(redrawer.frames_drawn());
        }
        if let Some(frame) = ready_at_frame {
            if redrawer.frames_drawn() >= frame + cli.frames.max(1) {
                break;
            }
        }
        if Instant::now() >= deadline {
            warn!("Timed out waiting for page renders, saving what is drawn");
            break;
        }
        thread::sleep(redrawer.interval());
    }
    redrawer.stop();

    redrawer.with_surface(|surface| match surface.canvas() {
        Some(canvas) => canvas.save(&cli.out),
        None => bail!("No frame was drawn"),
    })?;
    info!("Wrote {}", cli.out.display());

    let mut view = lock(&view);
    states.update(&key, view.save_state());
    let stats = view.scheduler().cache().stats();
    info!(
        "Cache: {} hits, {} misses, {:.0}% utilization",
        stats.hits,
        stats.misses,
        stats.utilization() * 100.0
    );
    view.close();

    if let Err(e) = states.save() {
        error!("Failed to save view state: {e}");
    }
    info!("Shutting down pageview");
    Ok(())
}

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};
use std::time::Duration;

use crate::cache::DEFAULT_MEMORY_FACTOR;
use crate::document::DocumentConfig;
use crate::render::SchedulerConfig;
use crate::render::scheduler::{
    DEFAULT_MAX_CONCURRENT_RENDERS, DEFAULT_PREFETCH_RADIUS, DEFAULT_REMOVABLE_PAGE_DISTANCE,
    DEFAULT_SNAPSHOT_SCALE,
};
use crate::view::{DEFAULT_MAX_RASTER_DIMENSION, ViewOptions};
use crate::viewport::{
    DEFAULT_ANIMATION_DURATION, DEFAULT_FLING_DECELERATION, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM,
    ZoomLimits,
};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pageview";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub memory_budget_mb: usize,
    pub memory_factor: usize,
    pub max_concurrent_renders: usize,
    pub removable_page_distance: usize,
    pub prefetch_radius: usize,
    pub max_raster_dimension: u32,
    pub snapshot_scale: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            memory_budget_mb: 512,
            memory_factor: DEFAULT_MEMORY_FACTOR,
            max_concurrent_renders: DEFAULT_MAX_CONCURRENT_RENDERS,
            removable_page_distance: DEFAULT_REMOVABLE_PAGE_DISTANCE,
            prefetch_radius: DEFAULT_PREFETCH_RADIUS,
            max_raster_dimension: DEFAULT_MAX_RASTER_DIMENSION,
            snapshot_scale: DEFAULT_SNAPSHOT_SCALE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportSettings {
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub animation_duration_ms: u64,
    pub fling_deceleration: f32,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            animation_duration_ms: DEFAULT_ANIMATION_DURATION.as_millis() as u64,
            fling_deceleration: DEFAULT_FLING_DECELERATION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub document: DocumentConfig,

    #[serde(default)]
    pub render: RenderSettings,

    #[serde(default)]
    pub viewport: ViewportSettings,

    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_frame_interval_ms() -> u64 {
    16
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            document: DocumentConfig::default(),
            render: RenderSettings::default(),
            viewport: ViewportSettings::default(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

impl Settings {
    /// Pulls out-of-range values back to something usable
    pub fn sanitize(&mut self) {
        let v = &mut self.viewport;
        if !(v.min_zoom.is_finite() && v.min_zoom > 0.0) {
            v.min_zoom = DEFAULT_MIN_ZOOM;
        }
        if !v.max_zoom.is_finite() || v.max_zoom < v.min_zoom {
            v.max_zoom = v.min_zoom.max(DEFAULT_MAX_ZOOM);
        }
        if !(v.fling_deceleration.is_finite() && v.fling_deceleration > 0.0) {
            v.fling_deceleration = DEFAULT_FLING_DECELERATION;
        }

        let r = &mut self.render;
        r.memory_factor = r.memory_factor.max(1);
        r.max_concurrent_renders = r.max_concurrent_renders.max(1);
        r.memory_budget_mb = r.memory_budget_mb.max(1);
        r.max_raster_dimension = r.max_raster_dimension.max(1);
        if !(r.snapshot_scale.is_finite() && r.snapshot_scale > 0.0 && r.snapshot_scale <= 1.0) {
            r.snapshot_scale = DEFAULT_SNAPSHOT_SCALE;
        }

        self.frame_interval_ms = self.frame_interval_ms.max(1);
    }

    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    #[must_use]
    pub fn view_options(&self) -> ViewOptions {
        let r = &self.render;
        let v = &self.viewport;
        ViewOptions {
            scheduler: SchedulerConfig {
                max_concurrent_renders: r.max_concurrent_renders,
                removable_page_distance: r.removable_page_distance,
                prefetch_radius: r.prefetch_radius,
                snapshot_scale: r.snapshot_scale,
            },
            memory_budget_kb: r.memory_budget_mb * 1024,
            memory_factor: r.memory_factor,
            max_raster_dimension: r.max_raster_dimension,
            zoom: ZoomLimits::new(v.min_zoom, v.max_zoom),
            animation_duration: Duration::from_millis(v.animation_duration_ms),
            fling_deceleration: v.fling_deceleration,
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Loads the user config, writing defaults when there is none yet
pub fn load_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };
    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        save_settings();
    }
}

pub fn load_settings_from_path(path: &Path) {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }
                settings.sanitize();

                if let Ok(mut global) = SETTINGS.write() {
                    *global = settings;
                }
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

/// Writes the global settings to the user config
pub fn save_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, cannot save settings");
        return;
    };
    if let Ok(settings) = SETTINGS.read() {
        save_settings_to_file(&settings, &path);
    }
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let body = match serde_yaml::to_string(settings) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize settings: {e}");
            return;
        }
    };
    let content = format!("{SETTINGS_HEADER}{body}");

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# pageview settings
# ============================================================================
# document.fit_policy:   width | height | both | none
# document.orientation:  vertical | horizontal
# render.memory_factor:  the raster cache gets memory_budget_mb / memory_factor
# frame_interval_ms:     delay between frames of the redraw loop

"#;

// Public API for accessing/modifying settings

pub fn get_settings() -> Settings {
    SETTINGS.read().map(|s| s.clone()).unwrap_or_default()
}

/// Replaces the global settings without touching the file
pub fn set_settings(mut settings: Settings) {
    settings.sanitize();
    if let Ok(mut global) = SETTINGS.write() {
        *global = settings;
    }
}

pub fn get_frame_interval() -> Duration {
    SETTINGS
        .read()
        .map(|s| s.frame_interval())
        .unwrap_or(Duration::from_millis(default_frame_interval_ms()))
}

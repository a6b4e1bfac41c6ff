//! Slideshow settings: a JSON file plus `SLIDESHOW_*` environment overrides.

use crate::compositor::CompositeSettings;
use crate::crossfade::FadeTiming;
use crate::queue::{DEFAULT_CAPACITY, DEFAULT_MIN_READY};
use crate::scheduler::SchedulerConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the settings file.
pub const CONFIG_PATH_VAR: &str = "SLIDESHOW_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Upper bound for second-valued settings.
const MAX_SECONDS: f64 = 86_400.0;
const MAX_TICK_HZ: f64 = 1_000.0;
const MAX_IDLE_TICK_MS: u64 = 60_000;
const MAX_BLUR_RADIUS_PX: f32 = 1_000.0;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(alias = "IMAGE_FOLDER")]
    pub image_folder: PathBuf,
    #[serde(alias = "DISPLAY_TIME_S", default = "default_display_time")]
    pub display_time_s: f64,
    #[serde(alias = "FADE_TIME_S", default = "default_fade_time")]
    pub fade_time_s: f64,
    /// Fixed-step crossfade; overrides `fade_time_s` when set.
    #[serde(alias = "FADE_STEPS", default)]
    pub fade_steps: Option<u32>,
    #[serde(alias = "BLUR_RADIUS_PX", default = "default_blur_radius")]
    pub blur_radius_px: f32,
    #[serde(alias = "TINT_OPACITY", default = "default_tint_opacity")]
    pub tint_opacity: f32,
    #[serde(alias = "QUEUE_CAPACITY", default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(alias = "MIN_READY", default = "default_min_ready")]
    pub min_ready: usize,
    #[serde(alias = "PRELOAD_WORKERS", default = "default_preload_workers")]
    pub preload_workers: usize,
    #[serde(alias = "TICK_HZ", default = "default_tick_hz")]
    pub tick_hz: f64,
    #[serde(alias = "IDLE_TICK_MS", default = "default_idle_tick_ms")]
    pub idle_tick_ms: u64,
    #[serde(alias = "ENABLE_VIDEO", default = "default_enable_video")]
    pub enable_video: bool,
}

fn default_display_time() -> f64 {
    10.0
}
fn default_fade_time() -> f64 {
    2.0
}
fn default_blur_radius() -> f32 {
    30.0
}
fn default_tint_opacity() -> f32 {
    0.5
}
fn default_queue_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_min_ready() -> usize {
    DEFAULT_MIN_READY
}
fn default_preload_workers() -> usize {
    2
}
fn default_tick_hz() -> f64 {
    60.0
}
fn default_idle_tick_ms() -> u64 {
    50
}
fn default_enable_video() -> bool {
    true
}

impl Settings {
    /// Settings file named by `SLIDESHOW_CONFIG`, or `config.json`.
    pub fn path_from_env() -> PathBuf {
        std::env::var(CONFIG_PATH_VAR)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into())
            .into()
    }

    /// Load and validate settings. A missing file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        anyhow::ensure!(
            path.is_file(),
            "Configuration file '{}' not found",
            path.display()
        );

        let settings: Settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(::config::Environment::with_prefix("SLIDESHOW").try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.display_time_s > 0.0 && self.display_time_s <= MAX_SECONDS,
            "DISPLAY_TIME_S must be within (0, {}], got {}",
            MAX_SECONDS,
            self.display_time_s
        );
        anyhow::ensure!(
            (0.0..=MAX_SECONDS).contains(&self.fade_time_s),
            "FADE_TIME_S must be within [0, {}], got {}",
            MAX_SECONDS,
            self.fade_time_s
        );
        anyhow::ensure!(
            self.fade_steps != Some(0),
            "FADE_STEPS must be at least 1"
        );
        anyhow::ensure!(
            (0.0..=MAX_BLUR_RADIUS_PX).contains(&self.blur_radius_px),
            "BLUR_RADIUS_PX must be within [0, {}], got {}",
            MAX_BLUR_RADIUS_PX,
            self.blur_radius_px
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.tint_opacity),
            "TINT_OPACITY must be within [0, 1], got {}",
            self.tint_opacity
        );
        anyhow::ensure!(
            self.queue_capacity >= 2,
            "QUEUE_CAPACITY must be at least 2, got {}",
            self.queue_capacity
        );
        anyhow::ensure!(
            (2..=self.queue_capacity).contains(&self.min_ready),
            "MIN_READY must be within [2, {}], got {}",
            self.queue_capacity,
            self.min_ready
        );
        anyhow::ensure!(
            self.preload_workers >= 1,
            "PRELOAD_WORKERS must be at least 1"
        );
        anyhow::ensure!(
            self.tick_hz > 0.0 && self.tick_hz <= MAX_TICK_HZ,
            "TICK_HZ must be within (0, {}], got {}",
            MAX_TICK_HZ,
            self.tick_hz
        );
        anyhow::ensure!(
            (1..=MAX_IDLE_TICK_MS).contains(&self.idle_tick_ms),
            "IDLE_TICK_MS must be within [1, {}], got {}",
            MAX_IDLE_TICK_MS,
            self.idle_tick_ms
        );
        Ok(())
    }

    pub fn display_time(&self) -> Duration {
        Duration::from_secs_f64(self.display_time_s)
    }

    pub fn fade_timing(&self) -> FadeTiming {
        match self.fade_steps {
            Some(steps) => FadeTiming::Steps(steps),
            None => FadeTiming::Continuous(Duration::from_secs_f64(self.fade_time_s)),
        }
    }

    pub fn composite_settings(&self, screen_width: u32, screen_height: u32) -> CompositeSettings {
        CompositeSettings {
            screen_width,
            screen_height,
            blur_radius: self.blur_radius_px,
            tint_opacity: self.tint_opacity,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick: Duration::from_secs_f64(1.0 / self.tick_hz),
            idle_tick: Duration::from_millis(self.idle_tick_ms),
            min_ready: self.min_ready,
            ..SchedulerConfig::new(self.display_time(), self.fade_timing())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(dir: &Path, body: serde_json::Value) -> PathBuf {
        let path = dir.join("config.json");
        fs::write(&path, serde_json::to_string_pretty(&body).unwrap()).unwrap();
        path
    }

    #[test]
    fn loads_original_keys_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            serde_json::json!({
                "IMAGE_FOLDER": "/srv/media",
                "DISPLAY_TIME_S": 7.5,
                "TINT_OPACITY": 0.25
            }),
        );

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.image_folder, PathBuf::from("/srv/media"));
        assert_eq!(settings.display_time(), Duration::from_millis(7_500));
        assert_eq!(settings.tint_opacity, 0.25);
        assert_eq!(settings.blur_radius_px, 30.0);
        assert_eq!(
            settings.fade_timing(),
            FadeTiming::Continuous(Duration::from_secs(2))
        );
        assert_eq!(settings.queue_capacity, 5);
        assert_eq!(settings.min_ready, 3);
        assert!(settings.enable_video);

        let sched = settings.scheduler_config();
        assert_eq!(sched.idle_tick, Duration::from_millis(50));
        assert_eq!(sched.min_ready, 3);
    }

    #[test]
    fn fade_steps_select_fixed_step_fades() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            serde_json::json!({ "IMAGE_FOLDER": "/srv/media", "FADE_STEPS": 10 }),
        );
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.fade_timing(), FadeTiming::Steps(10));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for bad in [
            serde_json::json!({ "IMAGE_FOLDER": "/m", "TINT_OPACITY": 1.5 }),
            serde_json::json!({ "IMAGE_FOLDER": "/m", "DISPLAY_TIME_S": 0 }),
            serde_json::json!({ "IMAGE_FOLDER": "/m", "MIN_READY": 6 }),
            serde_json::json!({ "IMAGE_FOLDER": "/m", "FADE_STEPS": 0 }),
            serde_json::json!({ "IMAGE_FOLDER": "/m", "DISPLAY_TIME_S": 1e30 }),
            serde_json::json!({ "IMAGE_FOLDER": "/m", "FADE_TIME_S": 1e30 }),
            serde_json::json!({ "IMAGE_FOLDER": "/m", "TICK_HZ": 1e10 }),
            serde_json::json!({ "IMAGE_FOLDER": "/m", "TICK_HZ": 0 }),
            serde_json::json!({ "IMAGE_FOLDER": "/m", "IDLE_TICK_MS": u64::MAX }),
            serde_json::json!({ "IMAGE_FOLDER": "/m", "BLUR_RADIUS_PX": 1e9 }),
        ] {
            let path = write_config(dir.path(), bad.clone());
            assert!(Settings::load(&path).is_err(), "{bad}");
        }
    }

    #[test]
    fn largest_accepted_values_build_a_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            serde_json::json!({
                "IMAGE_FOLDER": "/m",
                "DISPLAY_TIME_S": MAX_SECONDS,
                "FADE_TIME_S": MAX_SECONDS,
                "TICK_HZ": MAX_TICK_HZ,
                "IDLE_TICK_MS": MAX_IDLE_TICK_MS
            }),
        );
        let settings = Settings::load(&path).unwrap();
        let sched = settings.scheduler_config();
        assert_eq!(sched.tick, Duration::from_millis(1));
        assert_eq!(sched.display_time, Duration::from_secs(86_400));
        assert_eq!(sched.fade.planned_frames(sched.tick), 86_400_000);
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("config.json")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn missing_folder_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), serde_json::json!({ "DISPLAY_TIME_S": 3 }));
        assert!(Settings::load(&path).is_err());
    }
}

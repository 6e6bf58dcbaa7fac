// Startup configuration.
// Defaults are the sample's compile-time constants; `GINGAMI_*` environment
// variables can override them for a single run.

use std::ops::Range;
use std::time::Duration;

use crate::error::Error;

/// Size of the visible area and the backbuffer.
pub const DEFAULT_WIDTH: usize = 800;
pub const DEFAULT_HEIGHT: usize = 600;
pub const DEFAULT_BALL_COUNT: usize = 100;
/// Diameter range, end exclusive.
pub const DEFAULT_BALL_SIZE: Range<i32> = 10..100;
/// Per-axis speed range, end exclusive.
pub const DEFAULT_BALL_SPEED: Range<i32> = 1..10;

/// Everything the window and the render loop need to know before the first tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub title: String,
    pub width: usize,
    pub height: usize,
    /// Quality-optimized backbuffer (smooth edges) vs. speed-optimized.
    pub antialiasing: bool,
    /// Track frame times and overlay the count.
    pub show_fps: bool,
    pub ball_count: usize,
    pub ball_size: Range<i32>,
    pub ball_speed: Range<i32>,
    /// Fixed RNG seed; `None` seeds from OS entropy.
    pub seed: Option<u64>,
    /// Cap on render ticks per second; `None` runs the loop flat out.
    pub max_fps: Option<u32>,
    /// How long the window thread waits for the render thread on close.
    pub shutdown_timeout: Duration,
    pub render_stack_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: String::from("Gingami"),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            antialiasing: true,
            show_fps: true,
            ball_count: DEFAULT_BALL_COUNT,
            ball_size: DEFAULT_BALL_SIZE,
            ball_speed: DEFAULT_BALL_SPEED,
            seed: None,
            max_fps: None,
            shutdown_timeout: Duration::from_secs(2),
            render_stack_size: 4 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Defaults plus any `GINGAMI_*` overrides from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (variable name -> raw value), then validate.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GINGAMI_WIDTH") {
            self.width = parse_number("GINGAMI_WIDTH", &v)?;
        }
        if let Some(v) = lookup("GINGAMI_HEIGHT") {
            self.height = parse_number("GINGAMI_HEIGHT", &v)?;
        }
        if let Some(v) = lookup("GINGAMI_ANTIALIAS") {
            self.antialiasing = parse_flag("GINGAMI_ANTIALIAS", &v)?;
        }
        if let Some(v) = lookup("GINGAMI_SHOW_FPS") {
            self.show_fps = parse_flag("GINGAMI_SHOW_FPS", &v)?;
        }
        if let Some(v) = lookup("GINGAMI_BALLS") {
            self.ball_count = parse_number("GINGAMI_BALLS", &v)?;
        }
        if let Some(v) = lookup("GINGAMI_SEED") {
            self.seed = Some(parse_number("GINGAMI_SEED", &v)?);
        }
        if let Some(v) = lookup("GINGAMI_MAX_FPS") {
            let fps: u32 = parse_number("GINGAMI_MAX_FPS", &v)?;
            self.max_fps = (fps > 0).then_some(fps);
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings under which a ball could not fit on the surface.
    pub fn validate(&self) -> Result<(), Error> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "surface must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        if self.ball_size.is_empty() || self.ball_size.start < 1 {
            return Err(Error::Config(format!("bad ball size range {:?}", self.ball_size)));
        }
        if self.ball_speed.is_empty() || self.ball_speed.start < 1 {
            return Err(Error::Config(format!("bad ball speed range {:?}", self.ball_speed)));
        }
        if self.max_fps == Some(0) {
            return Err(Error::Config("max_fps must be positive; use None for unlimited".into()));
        }
        // The largest possible ball must still leave room to move on both axes.
        let smallest_side = self.width.min(self.height);
        let largest_ball = (self.ball_size.end - 1) as usize;
        if largest_ball >= smallest_side {
            return Err(Error::Config(format!(
                "balls up to {largest_ball}px do not fit a {}x{} surface",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Minimum time one tick should take, if capped.
    pub fn tick_period(&self) -> Option<Duration> {
        self.max_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_secs(1) / fps)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, Error> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: expected a number, got {raw:?}")))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, Error> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(Error::Config(format!("{key}: expected on/off, got {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_sample() {
        let config = Config::default();
        assert_eq!((config.width, config.height), (800, 600));
        assert!(config.antialiasing);
        assert!(config.show_fps);
        assert_eq!(config.ball_count, 100);
        assert_eq!(config.ball_size, 10..100);
        assert_eq!(config.ball_speed, 1..10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_applied() {
        let config = Config::default()
            .with_overrides(env(&[
                ("GINGAMI_WIDTH", "1024"),
                ("GINGAMI_HEIGHT", " 768 "),
                ("GINGAMI_ANTIALIAS", "off"),
                ("GINGAMI_SHOW_FPS", "No"),
                ("GINGAMI_BALLS", "7"),
                ("GINGAMI_SEED", "42"),
                ("GINGAMI_MAX_FPS", "30"),
            ]))
            .unwrap();

        assert_eq!((config.width, config.height), (1024, 768));
        assert!(!config.antialiasing);
        assert!(!config.show_fps);
        assert_eq!(config.ball_count, 7);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.max_fps, Some(30));
    }

    #[test]
    fn test_zero_max_fps_means_unlimited() {
        let config = Config::default()
            .with_overrides(env(&[("GINGAMI_MAX_FPS", "0")]))
            .unwrap();
        assert_eq!(config.max_fps, None);
        assert_eq!(config.tick_period(), None);
    }

    #[test]
    fn test_rejects_garbage() {
        let err = Config::default()
            .with_overrides(env(&[("GINGAMI_WIDTH", "wide")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Config::default()
            .with_overrides(env(&[("GINGAMI_ANTIALIAS", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_surface_smaller_than_ball() {
        let config = Config { width: 120, height: 99, ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { width: 120, height: 100, ..Config::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_ranges() {
        let config = Config { ball_size: 10..10, ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { ball_speed: 0..5, ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_max_fps_rejected_when_set_directly() {
        let config = Config { max_fps: Some(0), ..Config::default() };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        // and never divides by zero even if validation was skipped
        assert_eq!(config.tick_period(), None);
    }

    #[test]
    fn test_tick_period() {
        let config = Config { max_fps: Some(50), ..Config::default() };
        assert_eq!(config.tick_period(), Some(Duration::from_millis(20)));
    }
}

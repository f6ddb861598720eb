use std::env;
use std::str::FromStr;

use crate::error::{PlotError, Result};

/// Pixel dimensions of a rendered figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FigureSize {
    pub width: u32,
    pub height: u32,
}

impl FigureSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Debug, Clone)]
pub struct PlotConfig {
    pub tuning_size: FigureSize,
    pub system_identification_size: FigureSize,
    pub landscape_size: FigureSize,
    /// Expected samples per axis of landscape surfaces. `landscape` warns
    /// when a loaded comparison was evaluated at a different resolution.
    pub landscape_resolution: usize,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            tuning_size: FigureSize::new(1600, 300),
            system_identification_size: FigureSize::new(700, 760),
            landscape_size: FigureSize::new(1200, 500),
            landscape_resolution: 50,
        }
    }
}

impl PlotConfig {
    /// Defaults overridden by `CHEETAH_PLOTS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(size) = env_size("CHEETAH_PLOTS_TUNING_SIZE")? {
            config.tuning_size = size;
        }
        if let Some(size) = env_size("CHEETAH_PLOTS_SYSID_SIZE")? {
            config.system_identification_size = size;
        }
        if let Some(size) = env_size("CHEETAH_PLOTS_LANDSCAPE_SIZE")? {
            config.landscape_size = size;
        }
        if let Some(resolution) = env_parse("CHEETAH_PLOTS_RESOLUTION")? {
            config.landscape_resolution = resolution;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("tuning_size", self.tuning_size),
            ("system_identification_size", self.system_identification_size),
            ("landscape_size", self.landscape_size),
        ] {
            if size.width == 0 || size.height == 0 {
                return Err(PlotError::InvalidConfig(format!(
                    "{} must be non-zero, got {}x{}",
                    name, size.width, size.height
                )));
            }
        }

        if self.landscape_resolution == 0 {
            return Err(PlotError::InvalidConfig(
                "landscape_resolution must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PlotError::InvalidConfig(format!("{}={} is not valid", key, value))),
        Err(_) => Ok(None),
    }
}

/// Parse `WIDTHxHEIGHT`, e.g. `1600x300`.
fn parse_size(value: &str) -> Option<FigureSize> {
    let (width, height) = value.trim().split_once(|c: char| c == 'x' || c == 'X')?;
    Some(FigureSize::new(width.trim().parse().ok()?, height.trim().parse().ok()?))
}

fn env_size(key: &str) -> Result<Option<FigureSize>> {
    match env::var(key) {
        Ok(value) => parse_size(&value).map(Some).ok_or_else(|| {
            PlotError::InvalidConfig(format!("{}={} is not WIDTHxHEIGHT", key, value))
        }),
        Err(_) => Ok(None),
    }
}

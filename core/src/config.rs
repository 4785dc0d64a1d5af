use std::env;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a valid value")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    ZeroCapacity { key: &'static str },
}

/// What happens when the timestamp query pool runs out of free slots.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum QueryOverflowPolicy {
    /// Leave the command unmeasured.
    #[default]
    Skip,
    /// Create another driver query pool of the same size.
    Grow,
}

impl FromStr for QueryOverflowPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "grow" => Ok(Self::Grow),
            _ => Err(()),
        }
    }
}

/// The event that closes the active frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FrameDelimiter {
    #[default]
    Present,
    Submit,
}

impl FromStr for FrameDelimiter {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "submit" => Ok(Self::Submit),
            _ => Err(()),
        }
    }
}

/// How finely commands are timed. Coarser modes spend fewer queries and disturb the GPU less.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SamplingMode {
    /// Every command gets its own timer.
    #[default]
    PerDrawcall,
    /// Consecutive commands using the same pipeline share one timer.
    PerPipeline,
    /// Only render pass scopes and command buffers are timed.
    PerRenderPass,
    /// Only whole command buffers are timed.
    PerFrame,
}

impl SamplingMode {
    pub fn times_commands(self) -> bool {
        matches!(self, Self::PerDrawcall | Self::PerPipeline)
    }

    pub fn times_render_passes(self, scope_timing: bool) -> bool {
        match self {
            Self::PerDrawcall | Self::PerPipeline => scope_timing,
            Self::PerRenderPass => true,
            Self::PerFrame => false,
        }
    }

    pub fn times_command_buffers(self, scope_timing: bool) -> bool {
        scope_timing || self == Self::PerFrame
    }
}

impl FromStr for SamplingMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        match s.strip_prefix("per_").unwrap_or(&s) {
            "drawcall" => Ok(Self::PerDrawcall),
            "pipeline" => Ok(Self::PerPipeline),
            "render_pass" | "renderpass" => Ok(Self::PerRenderPass),
            "frame" => Ok(Self::PerFrame),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Number of finished frames kept in the history ring.
    pub history_size: usize,
    /// Number of timer slots in each driver query pool.
    pub query_pool_size: u32,
    /// Capacity of the checkpoint ring.
    pub checkpoint_count: usize,
    pub query_overflow: QueryOverflowPolicy,
    pub frame_delimiter: FrameDelimiter,
    pub sampling_mode: SamplingMode,
    /// Time render-pass scopes and whole command buffers in addition to individual commands.
    pub scope_timing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_size: 64,
            query_pool_size: 4096,
            checkpoint_count: 64,
            query_overflow: QueryOverflowPolicy::Skip,
            frame_delimiter: FrameDelimiter::Present,
            sampling_mode: SamplingMode::PerDrawcall,
            scope_timing: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from the defaults, overridden by whatever `lookup` returns for each
    /// `VKPROF_*` key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("VKPROF_HISTORY_SIZE") {
            config.history_size = parse("VKPROF_HISTORY_SIZE", &value)?;
        }
        if let Some(value) = lookup("VKPROF_QUERY_POOL_SIZE") {
            config.query_pool_size = parse("VKPROF_QUERY_POOL_SIZE", &value)?;
        }
        if let Some(value) = lookup("VKPROF_CHECKPOINT_COUNT") {
            config.checkpoint_count = parse("VKPROF_CHECKPOINT_COUNT", &value)?;
        }
        if let Some(value) = lookup("VKPROF_QUERY_OVERFLOW") {
            config.query_overflow = parse("VKPROF_QUERY_OVERFLOW", &value)?;
        }
        if let Some(value) = lookup("VKPROF_FRAME_DELIMITER") {
            config.frame_delimiter = parse("VKPROF_FRAME_DELIMITER", &value)?;
        }
        if let Some(value) = lookup("VKPROF_SAMPLING_MODE") {
            config.sampling_mode = parse("VKPROF_SAMPLING_MODE", &value)?;
        }
        if let Some(value) = lookup("VKPROF_SCOPE_TIMING") {
            config.scope_timing = match value.trim() {
                "1" | "true" | "on" => true,
                "0" | "false" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "VKPROF_SCOPE_TIMING",
                        value,
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_size == 0 {
            return Err(ConfigError::ZeroCapacity {
                key: "VKPROF_HISTORY_SIZE",
            });
        }
        if self.query_pool_size == 0 {
            return Err(ConfigError::ZeroCapacity {
                key: "VKPROF_QUERY_POOL_SIZE",
            });
        }
        if self.checkpoint_count == 0 {
            return Err(ConfigError::ZeroCapacity {
                key: "VKPROF_CHECKPOINT_COUNT",
            });
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a HashMap<&str, &str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| vars.get(key).map(|v| v.to_string())
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn overrides_from_environment() {
        let vars = HashMap::from([
            ("VKPROF_HISTORY_SIZE", "8"),
            ("VKPROF_QUERY_POOL_SIZE", " 16 "),
            ("VKPROF_QUERY_OVERFLOW", "Grow"),
            ("VKPROF_FRAME_DELIMITER", "submit"),
            ("VKPROF_SAMPLING_MODE", "per_render_pass"),
            ("VKPROF_SCOPE_TIMING", "0"),
        ]);
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.history_size, 8);
        assert_eq!(config.query_pool_size, 16);
        assert_eq!(config.checkpoint_count, 64);
        assert_eq!(config.query_overflow, QueryOverflowPolicy::Grow);
        assert_eq!(config.frame_delimiter, FrameDelimiter::Submit);
        assert_eq!(config.sampling_mode, SamplingMode::PerRenderPass);
        assert!(!config.scope_timing);
    }

    #[test]
    fn sampling_modes() {
        assert_eq!("Pipeline".parse(), Ok(SamplingMode::PerPipeline));
        assert_eq!("per_drawcall".parse(), Ok(SamplingMode::PerDrawcall));
        assert_eq!("frame".parse(), Ok(SamplingMode::PerFrame));
        assert_eq!("per_queue".parse::<SamplingMode>(), Err(()));

        assert!(SamplingMode::PerPipeline.times_commands());
        assert!(!SamplingMode::PerRenderPass.times_commands());
        assert!(SamplingMode::PerRenderPass.times_render_passes(false));
        assert!(!SamplingMode::PerFrame.times_render_passes(true));
        assert!(SamplingMode::PerFrame.times_command_buffers(false));
        assert!(!SamplingMode::PerDrawcall.times_command_buffers(false));
    }

    #[test]
    fn rejects_garbage_and_zero() {
        let vars = HashMap::from([("VKPROF_QUERY_OVERFLOW", "sometimes")]);
        assert_eq!(
            Config::from_lookup(lookup(&vars)),
            Err(ConfigError::InvalidValue {
                key: "VKPROF_QUERY_OVERFLOW",
                value: "sometimes".into()
            })
        );

        let vars = HashMap::from([("VKPROF_CHECKPOINT_COUNT", "0")]);
        assert_eq!(
            Config::from_lookup(lookup(&vars)),
            Err(ConfigError::ZeroCapacity {
                key: "VKPROF_CHECKPOINT_COUNT"
            })
        );
    }
}

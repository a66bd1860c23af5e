use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use serde::de::{self, Deserializer, Visitor};

use crate::tasks::player::PlayerSettings;
use crate::timing::{CONSTANT_TIMING, TimingTable};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Directories scanned recursively for images.
    pub photo_directories: Vec<PathBuf>,
    /// Pick a directory first, then an image inside it.
    pub weight_directories_equally: bool,
    /// How many displayed images are kept for resampling and browsing.
    pub max_in_memory: usize,
    /// Loader pool size; also how many loaded images may wait for display.
    pub max_loading_at_once: usize,
    /// Images narrower or shorter than this many pixels are skipped.
    pub image_size_min: u32,
    /// Keep the previous frame around for cross-fading.
    pub fade_enabled: bool,
    /// Whether the slideshow starts playing or paused.
    pub start_playing: bool,
    /// `constant` or the name of an entry in `timing-functions`.
    pub timing_function: String,
    /// Delay in milliseconds for the `constant` timing function.
    #[serde(deserialize_with = "deserialize_timing_constant")]
    pub timing_constant: String,
    /// Named random delay ranges.
    pub timing_functions: TimingTable,
    /// Optional deterministic seed for image selection.
    pub shuffle_seed: Option<u64>,
    /// Quiet period after a filesystem change before rescanning.
    #[serde(with = "humantime_serde")]
    pub rescan_debounce: Duration,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.photo_directories.is_empty(),
            "photo-directories must list at least one directory"
        );
        ensure!(
            self.max_in_memory > 0,
            "max-in-memory must be greater than zero"
        );
        ensure!(
            self.max_loading_at_once > 0,
            "max-loading-at-once must be greater than zero"
        );
        ensure!(
            self.image_size_min > 0,
            "image-size-min must be greater than zero"
        );
        self.timing_functions
            .validate()
            .context("invalid timing-functions")?;
        ensure!(
            self.timing_function == CONSTANT_TIMING
                || self.timing_functions.contains(&self.timing_function),
            "timing-function `{}` is neither `{}` nor one of: [{}]",
            self.timing_function,
            CONSTANT_TIMING,
            self.timing_functions.names().collect::<Vec<_>>().join(", ")
        );
        Ok(self)
    }

    /// Player knobs derived from this configuration.
    #[must_use]
    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            max_in_memory: self.max_in_memory,
            max_loading_at_once: self.max_loading_at_once,
            image_size_min: self.image_size_min,
            timing_function: self.timing_function.clone(),
            timing_constant: self.timing_constant.clone(),
            fade_enabled: self.fade_enabled,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            photo_directories: Vec::new(),
            weight_directories_equally: true,
            max_in_memory: 120,
            max_loading_at_once: 5,
            image_size_min: 200,
            fade_enabled: true,
            start_playing: true,
            timing_function: CONSTANT_TIMING.to_string(),
            timing_constant: "5000".to_string(),
            timing_functions: TimingTable::default(),
            shuffle_seed: None,
            rescan_debounce: Duration::from_millis(500),
        }
    }
}

/// Accept `timing-constant: 500` as well as `timing-constant: "500"`.
///
/// The value stays textual; parsing (and the fallback for garbage) happens
/// each time a delay is computed.
fn deserialize_timing_constant<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct ConstantVisitor;

    impl Visitor<'_> for ConstantVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a number of milliseconds as a number or string")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_owned())
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(ConstantVisitor)
}

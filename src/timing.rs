//! Delay between slideshow frames.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Result, ensure};
use rand::Rng;
use serde::Deserialize;

/// Reserved timing mode that reads the delay from the configured constant.
pub const CONSTANT_TIMING: &str = "constant";

/// Used when the constant cannot be parsed or a mode is unknown.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(1000);

/// Maps a timing mode name to the delay before the next frame.
///
/// Returns `None` for modes the provider does not know.
pub trait TimingProvider: Send + Sync {
    fn next_delay(&self, mode: &str) -> Option<Duration>;
}

impl<F> TimingProvider for F
where
    F: Fn(&str) -> Option<Duration> + Send + Sync,
{
    fn next_delay(&self, mode: &str) -> Option<Duration> {
        self(mode)
    }
}

/// Parse a millisecond constant such as `"500"` or `"2.5e3"`.
///
/// An explicit `0` is a valid delay, and so is a blank constant, which reads
/// as zero. Non-numeric and non-finite inputs are rejected; negative values
/// clamp to zero.
#[must_use]
pub fn parse_constant(raw: &str) -> Option<Duration> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Duration::ZERO);
    }
    let millis: f64 = trimmed.parse().ok()?;
    if !millis.is_finite() {
        return None;
    }
    let nanos = (millis.max(0.0) * 1_000_000.0).round();
    Some(Duration::from_nanos(nanos as u64))
}

/// Delay until the next frame for `function`.
pub fn resolve_delay(function: &str, constant: &str, provider: &dyn TimingProvider) -> Duration {
    if function == CONSTANT_TIMING {
        return parse_constant(constant).unwrap_or_else(|| {
            tracing::debug!(constant, "unparseable timing constant; using default");
            DEFAULT_FRAME_DELAY
        });
    }
    provider.next_delay(function).unwrap_or_else(|| {
        tracing::warn!(mode = function, "unknown timing function; using default");
        DEFAULT_FRAME_DELAY
    })
}

/// Uniformly random delay within `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TimingRange {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl TimingRange {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }
}

/// Named timing functions loaded from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TimingTable {
    entries: BTreeMap<String, TimingRange>,
}

impl TimingTable {
    pub fn insert(&mut self, name: impl Into<String>, range: TimingRange) {
        self.entries.insert(name.into(), range);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, range) in &self.entries {
            ensure!(
                name != CONSTANT_TIMING,
                "timing-functions may not redefine the reserved `{CONSTANT_TIMING}` mode"
            );
            ensure!(
                range.min <= range.max,
                "timing-functions.{name}: min must not exceed max"
            );
        }
        Ok(())
    }
}

impl TimingProvider for TimingTable {
    fn next_delay(&self, mode: &str) -> Option<Duration> {
        let range = self.entries.get(mode)?;
        Some(range.sample(&mut rand::rng()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_modes(_: &str) -> Option<Duration> {
        None
    }

    #[test]
    fn constant_parses_milliseconds() {
        assert_eq!(parse_constant("500"), Some(Duration::from_millis(500)));
        assert_eq!(parse_constant(" 250 "), Some(Duration::from_millis(250)));
        assert_eq!(parse_constant("2.5e3"), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn explicit_zero_is_honored() {
        assert_eq!(parse_constant("0"), Some(Duration::ZERO));
        assert_eq!(
            resolve_delay(CONSTANT_TIMING, "0", &no_modes),
            Duration::ZERO
        );
    }

    #[test]
    fn blank_constant_reads_as_zero() {
        assert_eq!(parse_constant(""), Some(Duration::ZERO));
        assert_eq!(parse_constant("   "), Some(Duration::ZERO));
        assert_eq!(
            resolve_delay(CONSTANT_TIMING, "", &no_modes),
            Duration::ZERO
        );
    }

    #[test]
    fn garbage_constant_falls_back_to_default() {
        assert_eq!(parse_constant("abc"), None);
        assert_eq!(parse_constant("NaN"), None);
        assert_eq!(
            resolve_delay(CONSTANT_TIMING, "abc", &no_modes),
            DEFAULT_FRAME_DELAY
        );
    }

    #[test]
    fn negative_constant_clamps_to_zero() {
        assert_eq!(parse_constant("-20"), Some(Duration::ZERO));
    }

    #[test]
    fn named_modes_go_to_provider() {
        let provider = |mode: &str| (mode == "fast").then_some(Duration::from_millis(42));
        assert_eq!(
            resolve_delay("fast", "abc", &provider),
            Duration::from_millis(42)
        );
        assert_eq!(resolve_delay("missing", "500", &provider), DEFAULT_FRAME_DELAY);
    }

    #[test]
    fn table_samples_within_range() {
        let mut table = TimingTable::default();
        let range = TimingRange {
            min: Duration::from_millis(100),
            max: Duration::from_millis(200),
        };
        table.insert("relaxed", range);
        table.validate().unwrap();
        for _ in 0..100 {
            let d = table.next_delay("relaxed").unwrap();
            assert!(d >= range.min && d <= range.max, "{d:?} out of range");
        }
        assert!(table.next_delay("other").is_none());
    }

    #[test]
    fn table_rejects_inverted_and_reserved_entries() {
        let mut table = TimingTable::default();
        table.insert(
            "backwards",
            TimingRange {
                min: Duration::from_secs(2),
                max: Duration::from_secs(1),
            },
        );
        assert!(table.validate().is_err());

        let mut table = TimingTable::default();
        table.insert(
            CONSTANT_TIMING,
            TimingRange {
                min: Duration::from_secs(1),
                max: Duration::from_secs(1),
            },
        );
        assert!(table.validate().is_err());
    }
}

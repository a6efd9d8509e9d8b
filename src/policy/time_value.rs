use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const SECOND: u64 = 1_000;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Millisecond-precision duration rendered the way policy documents write it
/// (`0ms`, `5s`, `20m`, `1h`, `7d`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeValue {
    millis: u64,
}

impl TimeValue {
    pub const ZERO: TimeValue = TimeValue { millis: 0 };

    pub const fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self::from_millis(secs * SECOND)
    }

    pub const fn from_minutes(minutes: u64) -> Self {
        Self::from_millis(minutes * MINUTE)
    }

    pub const fn from_hours(hours: u64) -> Self {
        Self::from_millis(hours * HOUR)
    }

    pub const fn from_days(days: u64) -> Self {
        Self::from_millis(days * DAY)
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }
}

impl From<Duration> for TimeValue {
    fn from(duration: Duration) -> Self {
        Self::from_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.millis;
        if millis == 0 {
            return write!(f, "0ms");
        }
        for (unit, suffix) in [(DAY, "d"), (HOUR, "h"), (MINUTE, "m"), (SECOND, "s")] {
            if millis % unit == 0 {
                return write!(f, "{}{suffix}", millis / unit);
            }
        }
        write!(f, "{millis}ms")
    }
}

impl FromStr for TimeValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // "ms" must be tried before "m" and "s"
        let (digits, unit) = if let Some(d) = trimmed.strip_suffix("ms") {
            (d, 1)
        } else if let Some(d) = trimmed.strip_suffix('d') {
            (d, DAY)
        } else if let Some(d) = trimmed.strip_suffix('h') {
            (d, HOUR)
        } else if let Some(d) = trimmed.strip_suffix('m') {
            (d, MINUTE)
        } else if let Some(d) = trimmed.strip_suffix('s') {
            (d, SECOND)
        } else {
            return Err(format!("Invalid time value [{s}]: missing unit"));
        };

        let value: u64 = digits
            .trim()
            .parse()
            .map_err(|_| format!("Invalid time value [{s}]"))?;
        value
            .checked_mul(unit)
            .map(Self::from_millis)
            .ok_or_else(|| format!("Time value [{s}] is too large"))
    }
}

impl Serialize for TimeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

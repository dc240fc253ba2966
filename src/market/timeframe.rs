//! Trade-bin timeframes streamed by the feed.

use std::str::FromStr;

/// Represents the interval of a `tradeBin*` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,   // 1 minute
    M5,   // 5 minutes
    H1,   // 1 hour
    D1,   // 1 day
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [Timeframe::M1, Timeframe::M5, Timeframe::H1, Timeframe::D1];

    /// Returns the duration of this timeframe in seconds
    pub fn to_seconds(&self) -> u64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::D1 => 24 * 60 * 60,
        }
    }

    /// Returns a human-readable string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::H1 => "1h",
            Timeframe::D1 => "1d",
        }
    }

    /// Name of the table carrying bins of this size, e.g. `tradeBin1m`.
    pub fn bin_table(&self) -> String {
        format!("tradeBin{}", self.as_str())
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| format!("unsupported timeframe `{}` (expected 1m, 5m, 1h or 1d)", s))
    }
}

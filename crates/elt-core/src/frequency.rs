//! Data frequency definitions.
//!
//! [`Frequency`] is the granularity requested from upstream APIs. Polygon
//! expresses it as an aggregate timespan, FRED as a one-letter code.

use serde::{Deserialize, Serialize};

/// Frequency/granularity of time series data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    /// Daily bars or observations.
    #[default]
    Daily,
    /// Weekly bars or observations.
    Weekly,
    /// Monthly bars or observations.
    Monthly,
    /// Quarterly bars or observations.
    Quarterly,
    /// Annual bars or observations.
    Annual,
}

impl Frequency {
    /// Polygon aggregate timespan for this frequency.
    #[must_use]
    pub const fn polygon_timespan(&self) -> &'static str {
        match self {
            Self::Daily => "day",
            Self::Weekly => "week",
            Self::Monthly => "month",
            Self::Quarterly => "quarter",
            Self::Annual => "year",
        }
    }

    /// FRED `frequency` query parameter for this frequency.
    #[must_use]
    pub const fn fred_code(&self) -> &'static str {
        match self {
            Self::Daily => "d",
            Self::Weekly => "w",
            Self::Monthly => "m",
            Self::Quarterly => "q",
            Self::Annual => "a",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_codes() {
        assert_eq!(Frequency::default(), Frequency::Daily);
        assert_eq!(Frequency::Daily.polygon_timespan(), "day");
        assert_eq!(Frequency::Annual.polygon_timespan(), "year");
        assert_eq!(Frequency::Daily.fred_code(), "d");
        assert_eq!(Frequency::Quarterly.fred_code(), "q");
    }
}

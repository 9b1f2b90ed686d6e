//! Time buckets (ISO weeks and calendar months)
//!
//! A [`BucketLayout`] partitions an inclusive date window into half-open
//! buckets. The first and last buckets are clipped to the window, so the
//! buckets cover it exactly. Mapping a date to its bucket is O(1).

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Bucket size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Week,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }
}

/// Which granularities a report computes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GranularitySelection {
    Week,
    Month,
    #[default]
    Both,
}

impl GranularitySelection {
    pub fn granularities(&self) -> &'static [Granularity] {
        match self {
            GranularitySelection::Week => &[Granularity::Week],
            GranularitySelection::Month => &[Granularity::Month],
            GranularitySelection::Both => &[Granularity::Week, Granularity::Month],
        }
    }

    pub fn includes(&self, granularity: Granularity) -> bool {
        self.granularities().contains(&granularity)
    }
}

impl std::str::FromStr for GranularitySelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(GranularitySelection::Week),
            "month" => Ok(GranularitySelection::Month),
            "both" => Ok(GranularitySelection::Both),
            _ => Err(format!("unknown granularity: {} (week, month, both)", s)),
        }
    }
}

/// Identifier of a calendar period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeriodKey {
    /// ISO week (ISO week-numbering year, week 1-53)
    Week { year: i32, week: u32 },
    /// Calendar month (year, month 1-12)
    Month { year: i32, month: u32 },
}

impl PeriodKey {
    /// Period containing `date`
    pub fn containing(date: NaiveDate, granularity: Granularity) -> Self {
        match granularity {
            Granularity::Week => {
                let iso = date.iso_week();
                PeriodKey::Week {
                    year: iso.year(),
                    week: iso.week(),
                }
            }
            Granularity::Month => PeriodKey::Month {
                year: date.year(),
                month: date.month(),
            },
        }
    }
}

/// `2025-W03` for weeks, `2025-01` for months
impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodKey::Week { year, week } => write!(f, "{}-W{:02}", year, week),
            PeriodKey::Month { year, month } => write!(f, "{}-{:02}", year, month),
        }
    }
}

/// A half-open date interval `[start, end)` for one period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBucket {
    pub key: PeriodKey,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeBucket {
    pub fn label(&self) -> String {
        self.key.to_string()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

/// The buckets partitioning a window at one granularity.
#[derive(Debug, Clone)]
pub struct BucketLayout {
    granularity: Granularity,
    start: NaiveDate,
    end: NaiveDate,
    buckets: Vec<TimeBucket>,
}

impl BucketLayout {
    /// Partition the inclusive window `[start, end]`.
    ///
    /// Returns an empty layout when `start > end`.
    pub fn new(granularity: Granularity, start: NaiveDate, end: NaiveDate) -> Self {
        let mut buckets = Vec::new();
        if start <= end {
            // The day after NaiveDate::MAX is unrepresentable
            let stop = end.succ_opt().unwrap_or(NaiveDate::MAX);
            let mut period_start = period_start(start, granularity);
            while period_start <= end {
                let next = next_period_start(period_start, granularity);
                buckets.push(TimeBucket {
                    key: PeriodKey::containing(period_start, granularity),
                    start: period_start.max(start),
                    end: next.map_or(stop, |n| n.min(stop)),
                });
                match next {
                    Some(n) => period_start = n,
                    None => break,
                }
            }
        }

        Self {
            granularity,
            start,
            end,
            buckets,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn buckets(&self) -> &[TimeBucket] {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Index of the bucket containing `date`, if it lies in the window.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        if self.buckets.is_empty() || date < self.start || date > self.end {
            return None;
        }
        let first = period_start(self.start, self.granularity);
        let index = match self.granularity {
            Granularity::Week => (period_start(date, Granularity::Week) - first).num_days() / 7,
            Granularity::Month => {
                let months = |d: NaiveDate| i64::from(d.year()) * 12 + i64::from(d.month0());
                months(date) - months(first)
            }
        };
        usize::try_from(index).ok().filter(|i| *i < self.buckets.len())
    }
}

/// First day of the period containing `date`
pub fn period_start(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Week => {
            date.checked_sub_signed(Duration::days(i64::from(
                date.weekday().num_days_from_monday(),
            )))
            .unwrap_or(date)
        }
        Granularity::Month => date.with_day(1).unwrap_or(date),
    }
}

fn next_period_start(start: NaiveDate, granularity: Granularity) -> Option<NaiveDate> {
    match granularity {
        Granularity::Week => start.checked_add_signed(Duration::days(7)),
        Granularity::Month => {
            let (year, month) = if start.month() == 12 {
                (start.year() + 1, 1)
            } else {
                (start.year(), start.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1)
        }
    }
}

/// Monday of an ISO week, for building test dates and CLI input
pub fn iso_week_start(year: i32, week: u32) -> Option<NaiveDate> {
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_labels() {
        assert_eq!(
            PeriodKey::containing(date(2025, 1, 15), Granularity::Week).to_string(),
            "2025-W03"
        );
        assert_eq!(
            PeriodKey::containing(date(2025, 1, 15), Granularity::Month).to_string(),
            "2025-01"
        );
        // Dec 30 2024 belongs to ISO week 1 of 2025
        assert_eq!(
            PeriodKey::containing(date(2024, 12, 30), Granularity::Week).to_string(),
            "2025-W01"
        );
    }

    #[test]
    fn test_weeks_partition_window() {
        let layout = BucketLayout::new(Granularity::Week, date(2025, 1, 1), date(2025, 1, 20));
        let labels: Vec<String> = layout.buckets().iter().map(|b| b.label()).collect();
        assert_eq!(labels, vec!["2025-W01", "2025-W02", "2025-W03", "2025-W04"]);

        // Clipped to the window, contiguous, no overlap
        assert_eq!(layout.buckets()[0].start, date(2025, 1, 1));
        assert_eq!(layout.buckets()[3].end, date(2025, 1, 21));
        for pair in layout.buckets().windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_months_partition_window() {
        let layout = BucketLayout::new(Granularity::Month, date(2024, 11, 15), date(2025, 2, 3));
        let labels: Vec<String> = layout.buckets().iter().map(|b| b.label()).collect();
        assert_eq!(labels, vec!["2024-11", "2024-12", "2025-01", "2025-02"]);
        assert_eq!(layout.buckets()[0].start, date(2024, 11, 15));
        assert_eq!(layout.buckets()[1].start, date(2024, 12, 1));
        assert_eq!(layout.buckets()[3].end, date(2025, 2, 4));
    }

    #[test]
    fn test_index_of_matches_contains() {
        for granularity in [Granularity::Week, Granularity::Month] {
            let start = date(2024, 12, 20);
            let end = date(2025, 3, 10);
            let layout = BucketLayout::new(granularity, start, end);
            let mut day = start;
            while day <= end {
                let index = layout.index_of(day).unwrap();
                assert!(layout.buckets()[index].contains(day), "{} {:?}", day, granularity);
                day += Duration::days(1);
            }
            assert_eq!(layout.index_of(start - Duration::days(1)), None);
            assert_eq!(layout.index_of(end + Duration::days(1)), None);
        }
    }

    #[test]
    fn test_single_day_and_inverted_window() {
        let layout = BucketLayout::new(Granularity::Week, date(2025, 1, 8), date(2025, 1, 8));
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.index_of(date(2025, 1, 8)), Some(0));

        let layout = BucketLayout::new(Granularity::Month, date(2025, 2, 1), date(2025, 1, 1));
        assert!(layout.is_empty());
        assert_eq!(layout.index_of(date(2025, 1, 15)), None);
    }

    #[test]
    fn test_window_ending_on_last_representable_day() {
        let end = NaiveDate::MAX;
        let start = end.checked_sub_signed(Duration::days(40)).unwrap();
        for granularity in [Granularity::Week, Granularity::Month] {
            let layout = BucketLayout::new(granularity, start, end);
            assert!(!layout.is_empty());
            assert_eq!(layout.buckets().last().unwrap().end, NaiveDate::MAX);
            assert_eq!(layout.index_of(end), Some(layout.len() - 1));
            assert_eq!(layout.index_of(start), Some(0));
        }
    }

    #[test]
    fn test_iso_week_start() {
        assert_eq!(iso_week_start(2025, 1), Some(date(2024, 12, 30)));
        assert_eq!(iso_week_start(2025, 3), Some(date(2025, 1, 13)));
    }

    #[test]
    fn test_selection_parse() {
        assert_eq!("both".parse::<GranularitySelection>(), Ok(GranularitySelection::Both));
        assert!(GranularitySelection::Week.includes(Granularity::Week));
        assert!(!GranularitySelection::Week.includes(Granularity::Month));
        assert!("daily".parse::<GranularitySelection>().is_err());
    }
}

//! Per-type event statistics over a time range.
//!
//! Aggregates events by type name into count, total own time (scope
//! duration minus time spent in child scopes) and mean own time, then
//! orders the entries per the caller's [`SortMode`].

use rustc_hash::FxHashMap;

/// Ordering applied to statistics entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    /// No particular order.
    Any,
    /// Most occurrences first.
    Count,
    /// Largest total own time first.
    TotalTime,
    /// Largest mean own time first.
    MeanTime,
}

/// Aggregate for one event type name.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TypeStatistics {
    /// Full event type name.
    pub name: String,
    /// Occurrences in the queried range.
    pub count: u64,
    /// Total own time in milliseconds. Zero for instance-only types.
    pub total_time: u64,
    /// `total_time / count`.
    pub mean_time: f64,
}

#[derive(Default)]
struct Entry {
    count: u64,
    total_time: u64,
}

/// Accumulates per-type samples and produces a sorted table.
#[derive(Default)]
pub struct StatisticsBuilder {
    entries: FxHashMap<String, Entry>,
}

impl StatisticsBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        StatisticsBuilder::default()
    }

    /// Record one event occurrence. `own_time` is zero for instances.
    pub fn record(&mut self, name: &str, own_time: u64) {
        let entry = self.entries.entry(name.to_owned()).or_default();
        entry.count += 1;
        entry.total_time += own_time;
    }

    /// Produce the sorted statistics table.
    pub fn finish(self, sort: SortMode) -> Vec<TypeStatistics> {
        let mut table: Vec<TypeStatistics> = self
            .entries
            .into_iter()
            .map(|(name, entry)| TypeStatistics {
                name,
                count: entry.count,
                total_time: entry.total_time,
                mean_time: entry.total_time as f64 / entry.count as f64,
            })
            .collect();
        match sort {
            SortMode::Any => {}
            SortMode::Count => {
                table.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)))
            }
            SortMode::TotalTime => table.sort_by(|a, b| {
                b.total_time
                    .cmp(&a.total_time)
                    .then_with(|| a.name.cmp(&b.name))
            }),
            SortMode::MeanTime => table.sort_by(|a, b| {
                b.mean_time
                    .partial_cmp(&a.mean_time)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.name.cmp(&b.name))
            }),
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_sort() {
        let mut builder = StatisticsBuilder::new();
        builder.record("app#frame", 10);
        builder.record("app#frame", 12);
        builder.record("gc#collect", 100);
        let table = builder.finish(SortMode::Count);
        assert_eq!(table[0].name, "app#frame");
        assert_eq!(table[0].count, 2);
        assert_eq!(table[0].total_time, 22);
        assert_eq!(table[1].name, "gc#collect");
    }

    #[test]
    fn test_total_time_sort() {
        let mut builder = StatisticsBuilder::new();
        builder.record("app#frame", 10);
        builder.record("app#frame", 12);
        builder.record("gc#collect", 100);
        let table = builder.finish(SortMode::TotalTime);
        assert_eq!(table[0].name, "gc#collect");
    }

    #[test]
    fn test_mean_time() {
        let mut builder = StatisticsBuilder::new();
        builder.record("a#x", 10);
        builder.record("a#x", 20);
        let table = builder.finish(SortMode::MeanTime);
        assert!((table[0].mean_time - 15.0).abs() < f64::EPSILON);
    }
}

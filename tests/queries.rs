//! Query-surface tests over ingested traces: indexes, summaries,
//! statistics and filters.

mod common;

use common::TraceWriter;
use tracedb::prelude::*;

const INSTANCE: u8 = 0;
const SCOPE: u8 = 1;

/// 3 instance events "A" at t = 10/20/30 plus a scope "B" over [5, 40)
/// and a second scope "B" over [45, 48), all in the default zone.
fn mixed_trace() -> EventDatabase {
    let mut w = TraceWriter::new();
    w.define(16, INSTANCE, 0, "A", "");
    w.define(17, SCOPE, 0, "B", "");
    w.record(17, 5);
    w.record(16, 10);
    w.record(16, 20);
    w.record(16, 30);
    w.leave(40);
    w.record(17, 45);
    w.leave(48);

    let mut db = EventDatabase::new();
    db.feed(w.bytes()).unwrap();
    db.finish().unwrap();
    db
}

#[test]
fn test_acceptance_scenario() {
    let mut db = mixed_trace();
    assert_eq!(db.create_event_index("A").unwrap().count(), 3);

    let default_zone = db.zones().next().map(|(id, _)| id).unwrap();
    assert_eq!(db.zone_index(default_zone).unwrap().count(), 5);

    assert_eq!(db.query_summary(0, 50).total_event_count, 5);

    let mut buckets = Vec::new();
    db.for_each_summary(0, 50, Granularity::Decisecond, |b| buckets.push(*b));
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].total_event_count, 5);
}

#[test]
fn test_summary_additivity_at_every_split() {
    let db = mixed_trace();
    let whole = db.query_summary(0, 60).total_event_count;
    assert_eq!(whole, 5);
    for m in 0..=60 {
        let left = db.query_summary(0, m).total_event_count;
        let right = db.query_summary(m, 60).total_event_count;
        assert_eq!(left + right, whole, "split at {m}");
    }
}

#[test]
fn test_summary_counts_by_class() {
    let db = mixed_trace();
    let summary = db.query_summary(0, 60);
    assert_eq!(summary.instance_count, 3);
    assert_eq!(summary.scope_count, 2);
}

#[test]
fn test_full_span_round_trip() {
    let db = mixed_trace();
    let end = db.last_event_time().unwrap() + 1;
    let summary = db.query_summary(0, end);
    assert_eq!(summary.total_event_count as usize, db.event_count());
}

#[test]
fn test_time_range_index_holds_scopes_in_order() {
    let mut db = mixed_trace();
    let default_zone = db.zones().next().map(|(id, _)| id).unwrap();
    let range_ids = db.time_range_index(default_zone).unwrap().ids().to_vec();
    assert_eq!(range_ids.len(), 2);
    // Ids are chronological, so range starts are non-decreasing.
    let starts: Vec<_> = range_ids
        .iter()
        .map(|&id| db.store().record(id).unwrap().start_time)
        .collect();
    let mut sorted = starts.clone();
    sorted.sort_unstable();
    assert_eq!(starts, sorted);
}

#[test]
fn test_index_membership_is_exact() {
    let mut db = mixed_trace();
    let a_ids: Vec<_> = db.create_event_index("A").unwrap().ids().to_vec();
    for id in 1..=db.event_count() as EventId {
        let rec = db.event(id).unwrap();
        let name = &db.event_types().get(rec.type_id).unwrap().name;
        assert_eq!(a_ids.contains(&id), name == "A");
    }
}

#[test]
fn test_forest_chains_terminate() {
    let db = mixed_trace();
    for id in 1..=db.event_count() as EventId {
        // Parent chain reaches depth 0.
        let mut cursor = id;
        let mut hops = 0;
        while let Some(parent) = db.store().parent(cursor) {
            cursor = parent;
            hops += 1;
            assert!(hops <= db.event_count(), "parent cycle at {id}");
        }
        assert_eq!(db.event(cursor).unwrap().depth, 0);

        // Sibling chain reaches the nil terminator.
        let mut cursor = id;
        let mut hops = 0;
        while let Some(next) = db.store().next_sibling(cursor) {
            cursor = next;
            hops += 1;
            assert!(hops <= db.event_count(), "sibling cycle at {id}");
        }
    }
}

#[test]
fn test_statistics_ranking() {
    let mut w = TraceWriter::new();
    w.define(16, SCOPE, 0, "app#render", "");
    w.define(17, SCOPE, 0, "app#layout", "");
    w.record(16, 0); // render [0, 100) with layout [10, 90) inside
    w.record(17, 10);
    w.leave(90);
    w.leave(100);

    let mut db = EventDatabase::new();
    db.feed(w.bytes()).unwrap();
    db.finish().unwrap();

    let by_total = db.query_statistics(0, 200, SortMode::TotalTime);
    assert_eq!(by_total[0].name, "app#layout");
    assert_eq!(by_total[0].total_time, 80);
    assert_eq!(by_total[1].name, "app#render");
    assert_eq!(by_total[1].total_time, 20, "own time excludes nested layout");

    let by_count = db.query_statistics(0, 200, SortMode::Count);
    assert_eq!(by_count.len(), 2);
    assert_eq!(by_count[0].count, 1);
}

#[test]
fn test_statistics_respect_time_range() {
    let db = mixed_trace();
    let table = db.query_statistics(0, 15, SortMode::Count);
    // Only scope B at t=5 and instance A at t=10 started in range.
    let a = table.iter().find(|e| e.name == "A").unwrap();
    assert_eq!(a.count, 1);
    let b = table.iter().find(|e| e.name == "B").unwrap();
    assert_eq!(b.count, 1);
}

#[test]
fn test_filters_scope_queries() {
    let mut w = TraceWriter::new();
    w.define(16, INSTANCE, 0, "app#tick", "");
    w.define(17, INSTANCE, 0, "gc#collect", "");
    w.record(16, 10);
    w.record(17, 20);
    w.record(16, 30);

    let mut db = EventDatabase::new();
    db.add_filter(Filter::exclude(FilterTarget::Provider("gc".into())));
    db.feed(w.bytes()).unwrap();
    db.finish().unwrap();

    // The canonical store keeps everything; views do not.
    assert_eq!(db.event_count(), 3);
    assert_eq!(db.query_summary(0, 100).total_event_count, 2);
    assert_eq!(db.create_event_index("gc#collect").unwrap().count(), 0);
    assert_eq!(db.create_event_index("app#tick").unwrap().count(), 2);
}

#[test]
fn test_queries_outside_data_are_empty() {
    let db = mixed_trace();
    assert!(db.query_summary(10_000, 20_000).is_empty());
    let mut called = false;
    db.for_each_summary(10_000, 20_000, Granularity::Second, |_| called = true);
    assert!(!called);
    assert!(db.query_statistics(10_000, 20_000, SortMode::Any).is_empty());
}

#[test]
fn test_empty_database_queries() {
    let db = EventDatabase::new();
    assert_eq!(db.event_count(), 0);
    assert_eq!(db.first_event_time(), None);
    assert!(db.query_summary(0, 1000).is_empty());
    assert_eq!(db.event(1), None);
}

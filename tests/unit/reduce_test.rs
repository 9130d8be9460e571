//! Reduce suites: mark-delimited batching, epoch advancement (including
//! chunked advancement through the scheduler), trailing windows, and
//! group lifecycle across epochs.

use fluxion::fluxion::procs::{
    CollectSink, EmitOptions, EmitProc, ReduceOptions, ReduceProc, ReducerSpec,
};
use fluxion::fluxion::runtime::graph::Proc;
use fluxion::fluxion::runtime::program::Program;
use fluxion::fluxion::runtime::time::{Moment, Span};
use fluxion::fluxion::runtime::types::{Point, Value};

use super::common::{keyed, pt, rig, times_and};

fn count_reduce(options: ReduceOptions) -> ReduceProc {
    ReduceProc::new(
        options,
        vec![ReducerSpec::builtin("n", "count", None).unwrap()],
    )
    .unwrap()
}

#[test]
fn mark_delimited_batches_flush_per_mark() {
    let (ups, _reduce, sink) = rig(count_reduce(ReduceOptions::default()), 1);
    ups[0]
        .borrow_mut()
        .consume(vec![pt(1, "v", 1.0), pt(2, "v", 2.0)], 0);
    ups[0].borrow_mut().consume_mark(Moment::from_millis(10), 0);
    ups[0].borrow_mut().consume(vec![pt(12, "v", 3.0)], 0);
    ups[0].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    // First batch: 2 points stamped with the batch start, then the mark,
    // then the final batch at eof.
    assert_eq!(times_and(sink.points(), "n"), vec![(1, 2.0), (10, 1.0)]);
    assert_eq!(sink.marks().to_vec(), vec![Moment::from_millis(10)]);
    assert!(sink.saw_eof());
}

#[test]
fn empty_ungrouped_stream_still_reports_zero() {
    let (ups, _reduce, sink) = rig(count_reduce(ReduceOptions::default()), 1);
    ups[0].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    assert_eq!(sink.points().len(), 1);
    assert_eq!(sink.points()[0].get("n"), Some(&Value::Number(0.0)));
    // No batch ever started, so the result is timeless.
    assert_eq!(sink.points()[0].time(), None);
}

#[test]
fn epoch_batching_emits_own_marks_and_stamps_epoch_starts() {
    let (ups, _reduce, sink) = rig(
        count_reduce(ReduceOptions {
            every: Some(Span::seconds(10)),
            ..Default::default()
        }),
        1,
    );
    ups[0].borrow_mut().consume(
        vec![pt(1_000, "v", 1.0), pt(2_000, "v", 2.0), pt(15_000, "v", 3.0)],
        0,
    );
    // Upstream marks are swallowed in epoch mode.
    ups[0].borrow_mut().consume_mark(Moment::from_millis(16_000), 0);
    ups[0].borrow_mut().consume(vec![pt(23_000, "v", 4.0)], 0);
    ups[0].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    assert_eq!(
        times_and(sink.points(), "n"),
        vec![(0, 2.0), (10_000, 1.0), (20_000, 1.0)]
    );
    assert_eq!(
        sink.marks().to_vec(),
        vec![Moment::from_millis(10_000), Moment::from_millis(20_000)]
    );
}

#[test]
fn group_by_emits_one_row_per_key_in_allocation_order() {
    let (ups, _reduce, sink) = rig(
        ReduceProc::new(
            ReduceOptions {
                by: vec!["k".into()],
                ..Default::default()
            },
            vec![
                ReducerSpec::builtin("n", "count", None).unwrap(),
                ReducerSpec::builtin("total", "sum", Some("v")).unwrap(),
            ],
        )
        .unwrap(),
        1,
    );
    ups[0].borrow_mut().consume(
        vec![
            keyed(1, "b", 10.0),
            keyed(2, "a", 1.0),
            keyed(3, "b", 20.0),
        ],
        0,
    );
    ups[0].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    let rows: Vec<(String, f64, f64)> = sink
        .points()
        .iter()
        .map(|p| {
            let k = match p.get("k") {
                Some(Value::String(s)) => s.clone(),
                other => panic!("bad key {:?}", other),
            };
            let n = match p.get("n") {
                Some(Value::Number(n)) => *n,
                _ => f64::NAN,
            };
            let total = match p.get("total") {
                Some(Value::Number(n)) => *n,
                _ => f64::NAN,
            };
            (k, n, total)
        })
        .collect();
    // "b" was seen first, so its group id (and output row) comes first.
    assert_eq!(rows, vec![("b".into(), 2.0, 30.0), ("a".into(), 1.0, 1.0)]);
}

#[test]
fn forget_drops_idle_groups_between_epochs() {
    let run = |forget: bool| -> Vec<usize> {
        let (ups, _reduce, sink) = rig(
            count_reduce(ReduceOptions {
                by: vec!["k".into()],
                every: Some(Span::seconds(10)),
                forget,
                ..Default::default()
            }),
            1,
        );
        ups[0].borrow_mut().consume(vec![keyed(1_000, "a", 1.0)], 0);
        // Next epoch has only "b" traffic; the one after flushes at eof.
        ups[0].borrow_mut().consume(vec![keyed(11_000, "b", 1.0)], 0);
        ups[0].borrow_mut().consume(vec![keyed(21_000, "b", 1.0)], 0);
        ups[0].borrow_mut().consume_eof(0);
        let sink = sink.borrow();
        // Rows per flushed epoch.
        let mut per_epoch = Vec::new();
        let mut epoch_times: Vec<i64> = sink
            .points()
            .iter()
            .map(|p| p.time().unwrap().millis())
            .collect();
        epoch_times.dedup();
        for t in &epoch_times {
            per_epoch.push(
                sink.points()
                    .iter()
                    .filter(|p| p.time().unwrap().millis() == *t)
                    .count(),
            );
        }
        per_epoch
    };

    // With forget, each epoch reports only the groups that saw data.
    assert_eq!(run(true), vec![1, 1, 1]);
    // Without forget, groups persist and idle ones report zero rows too.
    assert_eq!(run(false), vec![1, 2, 2]);
}

#[test]
fn windowed_sum_tracks_the_trailing_span() {
    let (ups, _reduce, sink) = rig(
        ReduceProc::new(
            ReduceOptions {
                every: Some(Span::seconds(4)),
                over: Some(Span::seconds(10)),
                ..Default::default()
            },
            vec![ReducerSpec::builtin("total", "sum", Some("v")).unwrap()],
        )
        .unwrap(),
        1,
    );
    ups[0].borrow_mut().consume(
        vec![pt(0, "v", 1.0), pt(5_000, "v", 2.0), pt(12_000, "v", 4.0)],
        0,
    );
    ups[0].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    // Epoch flushes see the window content before the epoch's first point:
    //   at 4s: {0}         -> 1
    //   at 8s: {0,5}       -> 3
    //   at 12s: {5}        -> 2  (t=0 has left the 10s window)
    // and the final eof flush sees {5,12} -> 6, matching a window
    // evaluated at t=12: [2s, 12s] excludes t=0.
    assert_eq!(
        times_and(sink.points(), "total"),
        vec![(0, 1.0), (4_000, 3.0), (8_000, 2.0), (12_000, 6.0)]
    );
}

#[test]
fn chunked_epoch_advancement_is_transparent() {
    // One batch jumps 50,000 epoch boundaries; advancement must defer to
    // the scheduler repeatedly and still produce exactly one row and one
    // mark per epoch, identical to synchronous execution.
    let mut program = Program::new();
    let source = program.add(
        EmitProc::new(EmitOptions {
            points: Some(vec![pt(500, "v", 1.0), pt(50_000_500, "v", 1.0)]),
            ..Default::default()
        })
        .unwrap(),
    );
    let reduce = program.add(count_reduce(ReduceOptions {
        every: Some(Span::seconds(1)),
        ..Default::default()
    }));
    let sink = program.add(CollectSink::new());
    program.connect(&source, &reduce).unwrap();
    program.connect(&reduce, &sink).unwrap();
    program.start().unwrap();
    program.run().unwrap();

    let sink = sink.borrow();
    assert_eq!(sink.marks().len(), 50_000);
    assert_eq!(sink.points().len(), 50_001);
    let rows = times_and(sink.points(), "n");
    // The first epoch holds the first point, every idle epoch reports
    // zero, and the final epoch holds the second point.
    assert_eq!(rows[0], (0, 1.0));
    assert!(rows[1..50_000].iter().all(|(_, n)| *n == 0.0));
    assert_eq!(rows[50_000], (50_000_000, 1.0));
    // Epoch stamps advance uniformly.
    assert_eq!(rows[1].0, 1_000);
    assert_eq!(rows[49_999].0, 49_999_000);
    assert!(sink.saw_eof());
}

#[test]
fn timeless_points_warn_in_epoch_mode() {
    let mut program = Program::new();
    let source = program.add(
        EmitProc::new(EmitOptions {
            points: Some(vec![
                Point::new().with("v", Value::Number(1.0)),
                pt(1_000, "v", 2.0),
            ]),
            ..Default::default()
        })
        .unwrap(),
    );
    let reduce = program.add(count_reduce(ReduceOptions {
        every: Some(Span::seconds(10)),
        ..Default::default()
    }));
    let sink = program.add(CollectSink::new());
    program.connect(&source, &reduce).unwrap();
    program.connect(&reduce, &sink).unwrap();
    program.start().unwrap();
    program.run().unwrap();

    assert_eq!(program.warnings().len(), 1);
    let sink = sink.borrow();
    // Only the timed point counts.
    assert_eq!(times_and(sink.points(), "n"), vec![(0, 1.0)]);
}

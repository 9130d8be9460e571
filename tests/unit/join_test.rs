//! Temporal join suites: arrival-order independence, causality, strict
//! output monotonicity, and the zip/outer/table/max_offset modes.

use fluxion::fluxion::procs::{JoinOptions, JoinProc};
use fluxion::fluxion::runtime::graph::Proc;
use fluxion::fluxion::runtime::time::{Moment, Span};
use fluxion::fluxion::runtime::types::{Point, Value};

use super::common::{keyed, rig, times_and};

fn join_on_k(extra: JoinOptions) -> JoinProc {
    JoinProc::new(JoinOptions {
        fields: vec!["k".into()],
        ..extra
    })
    .unwrap()
}

fn number(point: &Point, field: &str) -> f64 {
    match point.get(field) {
        Some(Value::Number(n)) => *n,
        other => panic!("expected number in {}, got {:?}", field, other),
    }
}

#[test]
fn two_inputs_same_instant_join_once() {
    // The canonical scenario: A={time:1,k:x,v:1}, B={time:1,k:x,v:2} on k
    // produces exactly {time:1,k:x,v:2} once both inputs reach eof.
    let (ups, _join, sink) = rig(join_on_k(JoinOptions::default()), 2);
    ups[0].borrow_mut().consume(vec![keyed(1, "x", 1.0)], 0);
    ups[1].borrow_mut().consume(vec![keyed(1, "x", 2.0)], 0);
    ups[0].borrow_mut().consume_eof(0);
    ups[1].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    assert!(sink.saw_eof());
    assert_eq!(sink.points().len(), 1);
    let out = &sink.points()[0];
    assert_eq!(out.time(), Some(Moment::from_millis(1)));
    assert_eq!(out.get("k"), Some(&Value::String("x".into())));
    // Last-write union: the second edge's fields win.
    assert_eq!(number(out, "v"), 2.0);
}

#[test]
fn rolling_nearest_match_rejoins_followers() {
    let (ups, _join, sink) = rig(join_on_k(JoinOptions::default()), 2);
    ups[0]
        .borrow_mut()
        .consume(vec![keyed(1, "x", 1.0), keyed(5, "x", 5.0)], 0);
    ups[1]
        .borrow_mut()
        .consume(vec![keyed(3, "x", 30.0), keyed(7, "x", 70.0)], 0);
    ups[0].borrow_mut().consume_eof(0);
    ups[1].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    // Each round joins the leader with the newest usable counterpart:
    // (A1,B3)@3, (A5,B3)@5, (A5,B7)@7.
    assert_eq!(
        times_and(sink.points(), "v"),
        vec![(3, 30.0), (5, 30.0), (7, 70.0)]
    );
    assert!(sink.saw_eof());
}

#[test]
fn zip_joins_each_group_at_most_once() {
    let (ups, _join, sink) = rig(
        join_on_k(JoinOptions {
            zip: true,
            ..Default::default()
        }),
        2,
    );
    ups[0]
        .borrow_mut()
        .consume(vec![keyed(1, "x", 1.0), keyed(5, "x", 5.0)], 0);
    ups[1]
        .borrow_mut()
        .consume(vec![keyed(3, "x", 30.0), keyed(7, "x", 70.0)], 0);
    ups[0].borrow_mut().consume_eof(0);
    ups[1].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    assert_eq!(
        times_and(sink.points(), "v"),
        vec![(3, 30.0), (7, 70.0)]
    );
}

#[test]
fn output_is_independent_of_arrival_interleaving() {
    let a_points = vec![keyed(1, "x", 1.0), keyed(5, "x", 5.0), keyed(9, "y", 9.0)];
    let b_points = vec![keyed(3, "x", 30.0), keyed(7, "y", 70.0)];

    let run = |a_first: bool, pointwise: bool| -> Vec<String> {
        let (ups, _join, sink) = rig(join_on_k(JoinOptions::default()), 2);
        if pointwise {
            // Alternate single points across the edges.
            let mut ai = a_points.clone().into_iter();
            let mut bi = b_points.clone().into_iter();
            loop {
                let a = ai.next();
                let b = bi.next();
                if a.is_none() && b.is_none() {
                    break;
                }
                if let Some(p) = a {
                    ups[0].borrow_mut().consume(vec![p], 0);
                }
                if let Some(p) = b {
                    ups[1].borrow_mut().consume(vec![p], 0);
                }
            }
        } else if a_first {
            ups[0].borrow_mut().consume(a_points.clone(), 0);
            ups[1].borrow_mut().consume(b_points.clone(), 0);
        } else {
            ups[1].borrow_mut().consume(b_points.clone(), 0);
            ups[0].borrow_mut().consume(a_points.clone(), 0);
        }
        ups[0].borrow_mut().consume_eof(0);
        ups[1].borrow_mut().consume_eof(0);
        let mut out: Vec<String> = sink
            .borrow()
            .points()
            .iter()
            .map(|p| serde_json::to_string(p).unwrap())
            .collect();
        out.sort();
        out
    };

    let baseline = run(true, false);
    assert!(!baseline.is_empty());
    assert_eq!(run(false, false), baseline);
    assert_eq!(run(true, true), baseline);
}

#[test]
fn output_timestamps_are_strictly_increasing() {
    let (ups, _join, sink) = rig(join_on_k(JoinOptions::default()), 2);
    for ms in [1, 4, 9, 16] {
        ups[0]
            .borrow_mut()
            .consume(vec![keyed(ms, "x", ms as f64)], 0);
        ups[1]
            .borrow_mut()
            .consume(vec![keyed(ms + 1, "x", (ms + 1) as f64)], 0);
    }
    ups[0].borrow_mut().consume_eof(0);
    ups[1].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    let times: Vec<i64> = sink
        .points()
        .iter()
        .map(|p| p.time().unwrap().millis())
        .collect();
    for pair in times.windows(2) {
        assert!(pair[0] < pair[1], "not strictly increasing: {:?}", times);
    }
}

#[test]
fn join_results_never_precede_their_inputs() {
    let (ups, _join, sink) = rig(join_on_k(JoinOptions::default()), 2);
    // A batched edge: points inside the batch carry earlier times than the
    // closing mark that stamps the group.
    ups[0].borrow_mut().consume_mark(Moment::from_millis(0), 0);
    ups[0]
        .borrow_mut()
        .consume(vec![keyed(3, "x", 3.0), keyed(7, "x", 7.0)], 0);
    ups[0].borrow_mut().consume_mark(Moment::from_millis(10), 0);
    ups[1].borrow_mut().consume(vec![keyed(10, "x", 100.0)], 0);
    ups[0].borrow_mut().consume_eof(0);
    ups[1].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    assert!(!sink.points().is_empty());
    for out in sink.points() {
        let t = out.time().unwrap();
        // Contributing points are at 3, 7, and 10.
        assert!(t >= Moment::from_millis(10));
    }
    // The leading batched edge closes the result batch with a mark.
    assert!(sink.marks().contains(&Moment::from_millis(10)));
}

#[test]
fn outer_preserves_unmatched_rows() {
    let (ups, _join, sink) = rig(
        join_on_k(JoinOptions {
            outer: Some(0),
            ..Default::default()
        }),
        2,
    );
    ups[0].borrow_mut().consume(
        vec![keyed(1, "x", 1.0), keyed(5, "y", 5.0), keyed(9, "x", 9.0)],
        0,
    );
    ups[1].borrow_mut().consume(vec![keyed(3, "x", 30.0)], 0);
    ups[0].borrow_mut().consume_eof(0);
    ups[1].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    let rows = times_and(sink.points(), "v");
    // t=1: x precedes any right-side data, passes unmatched with its own v.
    // t=5: y never matches, passes unmatched.
    // t=9: x matches the t=3 right row; its fields win the union.
    assert_eq!(rows, vec![(1, 1.0), (5, 5.0), (9, 30.0)]);
    assert!(sink.saw_eof());
}

#[test]
fn tables_match_best_available_version_and_never_gate_eof() {
    let (ups, _join, sink) = rig(
        join_on_k(JoinOptions {
            tables: vec![1],
            ..Default::default()
        }),
        2,
    );
    // Table versions: v=100 closed at 5, superseded by v=200 closed at 15.
    ups[1].borrow_mut().consume(
        vec![Point::new()
            .with("k", Value::String("x".into()))
            .with("v", Value::Number(100.0))],
        0,
    );
    ups[1].borrow_mut().consume_mark(Moment::from_millis(5), 0);
    ups[1].borrow_mut().consume(
        vec![Point::new()
            .with("k", Value::String("x".into()))
            .with("v", Value::Number(200.0))],
        0,
    );
    ups[1].borrow_mut().consume_mark(Moment::from_millis(15), 0);

    ups[0]
        .borrow_mut()
        .consume(vec![keyed(7, "x", 7.0), keyed(20, "x", 20.0)], 0);
    // The stream edge finishes; the table edge never sends eof.
    ups[0].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    assert_eq!(
        times_and(sink.points(), "v"),
        vec![(7, 100.0), (20, 200.0)]
    );
    assert!(sink.saw_eof(), "table edges must not gate eof");
}

#[test]
fn max_offset_expires_stale_followers() {
    let (ups, _join, sink) = rig(
        join_on_k(JoinOptions {
            max_offset: Some(Span::seconds(10)),
            ..Default::default()
        }),
        2,
    );
    ups[0].borrow_mut().consume(vec![keyed(1, "x", 1.0)], 0);
    ups[1]
        .borrow_mut()
        .consume(vec![keyed(100_000, "x", 100.0)], 0);
    ups[0].borrow_mut().consume_eof(0);
    ups[1].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    assert!(
        sink.points().is_empty(),
        "a follower 100s older than the leader must not match"
    );
    assert!(sink.saw_eof());
}

#[test]
fn late_configuration_errors_surface_at_start() {
    // outer referencing an edge that was never wired is only detectable
    // once all edges are known.
    let join = JoinProc::new(JoinOptions {
        outer: Some(3),
        ..Default::default()
    })
    .unwrap();
    let (_ups, join, _sink) = {
        use fluxion::fluxion::procs::PassProc;
        use fluxion::fluxion::runtime::graph::{self, ProcHandle};
        use std::cell::RefCell;
        use std::rc::Rc;
        let node = Rc::new(RefCell::new(join));
        let node_h: ProcHandle = node.clone();
        let mut ups = Vec::new();
        for _ in 0..2 {
            let up: ProcHandle = Rc::new(RefCell::new(PassProc::new()));
            graph::connect(&up, &node_h).unwrap();
            ups.push(up);
        }
        (ups, node, ())
    };
    assert!(join.borrow_mut().start().is_err());

    // Fewer than two inputs is also a start-time error.
    let lonely = JoinProc::new(JoinOptions::default()).unwrap();
    let mut lonely = lonely;
    assert!(lonely.start().is_err());
}

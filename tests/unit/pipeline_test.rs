//! End-to-end graph suites: program validation and drive loop, per-group
//! procs, fragment combination, and warning collection.

use fluxion::fluxion::procs::{
    CollectSink, EmitOptions, EmitProc, FilterProc, HeadProc, PassProc, PutProc, SortColumn,
    SortOptions, SortProc, TakeMode, UniqProc,
};
use fluxion::fluxion::runtime::error::RuntimeError;
use fluxion::fluxion::runtime::graph::Proc;
use fluxion::fluxion::runtime::program::Program;
use fluxion::fluxion::runtime::time::{Moment, Span};
use fluxion::fluxion::runtime::types::{Point, Value};

use super::common::{keyed, pt, rig};

#[test]
fn filter_drops_points_and_warns_on_type_errors() {
    let mut program = Program::new();
    let source = program.add(
        EmitProc::new(EmitOptions {
            points: Some(vec![
                pt(1, "v", 5.0),
                pt(2, "v", 50.0),
                Point::new()
                    .with("v", Value::String("bad".into()))
                    .at(Moment::from_millis(3)),
            ]),
            ..Default::default()
        })
        .unwrap(),
    );
    let filter = program.add(FilterProc::new(Box::new(|p: &Point| match p.get("v") {
        Some(Value::Number(n)) => Ok(*n > 10.0),
        Some(other) => Err(RuntimeError::type_error("number", other.type_name())),
        None => Ok(false),
    })));
    let sink = program.add(CollectSink::new());
    program.connect(&source, &filter).unwrap();
    program.connect(&filter, &sink).unwrap();
    program.start().unwrap();
    program.run().unwrap();

    let warnings = program.warnings().snapshot();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].proc, "filter");
    let sink = sink.borrow();
    assert_eq!(sink.points().len(), 1);
    assert_eq!(sink.points()[0].get("v"), Some(&Value::Number(50.0)));
}

#[test]
fn put_computes_new_fields_per_point() {
    let mut program = Program::new();
    let source = program.add(
        EmitProc::new(EmitOptions {
            points: Some(vec![pt(1, "v", 3.0), pt(2, "v", 4.0)]),
            ..Default::default()
        })
        .unwrap(),
    );
    let put = program.add(PutProc::new(Box::new(|p: &mut Point| {
        let squared = match p.get("v") {
            Some(v) => v.multiply(v)?,
            None => Value::Null,
        };
        p.set("v2", squared);
        Ok(())
    })));
    let sink = program.add(CollectSink::new());
    program.connect(&source, &put).unwrap();
    program.connect(&put, &sink).unwrap();
    program.start().unwrap();
    program.run().unwrap();

    let sink = sink.borrow();
    let squares: Vec<f64> = sink
        .points()
        .iter()
        .map(|p| match p.get("v2") {
            Some(Value::Number(n)) => *n,
            other => panic!("bad v2: {:?}", other),
        })
        .collect();
    assert_eq!(squares, vec![9.0, 16.0]);
}

#[test]
fn head_and_skip_split_the_stream_per_group() {
    let points = vec![
        keyed(1, "a", 1.0),
        keyed(2, "a", 2.0),
        keyed(3, "b", 3.0),
        keyed(4, "a", 4.0),
        keyed(5, "b", 5.0),
    ];

    let (ups, _head, head_sink) = rig(
        HeadProc::new(TakeMode::Head, 1, vec!["k".into()]).unwrap(),
        1,
    );
    ups[0].borrow_mut().consume(points.clone(), 0);
    ups[0].borrow_mut().consume_eof(0);
    let head_sink = head_sink.borrow();
    let kept: Vec<i64> = head_sink
        .points()
        .iter()
        .map(|p| p.time().unwrap().millis())
        .collect();
    // First point of "a" and first of "b".
    assert_eq!(kept, vec![1, 3]);

    let (ups, _skip, skip_sink) = rig(
        HeadProc::new(TakeMode::Skip, 1, vec!["k".into()]).unwrap(),
        1,
    );
    ups[0].borrow_mut().consume(points, 0);
    ups[0].borrow_mut().consume_eof(0);
    let skip_sink = skip_sink.borrow();
    let kept: Vec<i64> = skip_sink
        .points()
        .iter()
        .map(|p| p.time().unwrap().millis())
        .collect();
    assert_eq!(kept, vec![2, 4, 5]);
}

#[test]
fn head_counters_reset_at_batch_boundaries() {
    let (ups, _head, sink) = rig(HeadProc::new(TakeMode::Head, 1, Vec::new()).unwrap(), 1);
    ups[0]
        .borrow_mut()
        .consume(vec![pt(1, "v", 1.0), pt(2, "v", 2.0)], 0);
    ups[0].borrow_mut().consume_mark(Moment::from_millis(10), 0);
    ups[0]
        .borrow_mut()
        .consume(vec![pt(11, "v", 3.0), pt(12, "v", 4.0)], 0);
    ups[0].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    let kept: Vec<i64> = sink
        .points()
        .iter()
        .map(|p| p.time().unwrap().millis())
        .collect();
    assert_eq!(kept, vec![1, 11]);
    assert_eq!(sink.marks().to_vec(), vec![Moment::from_millis(10)]);
}

#[test]
fn sort_orders_batches_and_strips_time() {
    let (ups, _sort, sink) = rig(
        SortProc::new(SortOptions {
            columns: vec![SortColumn::desc("v")],
            by: Vec::new(),
            limit: None,
        })
        .unwrap(),
        1,
    );
    ups[0].borrow_mut().consume(
        vec![pt(1, "v", 2.0), pt(2, "v", 9.0), pt(3, "v", 5.0)],
        0,
    );
    ups[0].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    let values: Vec<f64> = sink
        .points()
        .iter()
        .map(|p| match p.get("v") {
            Some(Value::Number(n)) => *n,
            other => panic!("bad v: {:?}", other),
        })
        .collect();
    assert_eq!(values, vec![9.0, 5.0, 2.0]);
    assert!(sink.points().iter().all(|p| p.time().is_none()));
}

#[test]
fn sort_buffer_overflow_warns_and_drops() {
    let mut program = Program::new();
    let source = program.add(
        EmitProc::new(EmitOptions {
            points: Some(vec![
                pt(1, "v", 1.0),
                pt(2, "v", 2.0),
                pt(3, "v", 3.0),
                pt(4, "v", 4.0),
            ]),
            ..Default::default()
        })
        .unwrap(),
    );
    let sort = program.add(
        SortProc::new(SortOptions {
            columns: vec![SortColumn::asc("v")],
            by: Vec::new(),
            limit: Some(2),
        })
        .unwrap(),
    );
    let sink = program.add(CollectSink::new());
    program.connect(&source, &sort).unwrap();
    program.connect(&sort, &sink).unwrap();
    program.start().unwrap();
    program.run().unwrap();

    assert_eq!(program.warnings().len(), 1);
    assert_eq!(sink.borrow().points().len(), 2);
}

#[test]
fn uniq_collapses_consecutive_duplicates() {
    let (ups, _uniq, sink) = rig(
        UniqProc::new(vec!["v".into()], Vec::new()).unwrap(),
        1,
    );
    ups[0].borrow_mut().consume(
        vec![
            pt(1, "v", 1.0),
            pt(2, "v", 1.0),
            pt(3, "v", 2.0),
            pt(4, "v", 1.0),
        ],
        0,
    );
    // State resets at the boundary: the duplicate passes again.
    ups[0].borrow_mut().consume_mark(Moment::from_millis(10), 0);
    ups[0].borrow_mut().consume(vec![pt(11, "v", 1.0)], 0);
    ups[0].borrow_mut().consume_eof(0);

    let sink = sink.borrow();
    let kept: Vec<i64> = sink
        .points()
        .iter()
        .map(|p| p.time().unwrap().millis())
        .collect();
    assert_eq!(kept, vec![1, 3, 4, 11]);
}

#[test]
fn combined_fragments_merge_into_one_sink() {
    let mut program = Program::new();
    let left = program.add(
        EmitProc::new(EmitOptions {
            from: Some(Moment::from_millis(0)),
            every: Span::seconds(1),
            limit: Some(3),
            ..Default::default()
        })
        .unwrap(),
    );
    let right = program.add(
        EmitProc::new(EmitOptions {
            from: Some(Moment::from_millis(500)),
            every: Span::seconds(1),
            limit: Some(3),
            ..Default::default()
        })
        .unwrap(),
    );
    let junction = program.add(PassProc::new());
    let sink = program.add(CollectSink::new());
    program.connect(&left, &junction).unwrap();
    program.connect(&right, &junction).unwrap();
    program.connect(&junction, &sink).unwrap();
    program.start().unwrap();
    program.run().unwrap();

    let sink = sink.borrow();
    assert_eq!(sink.points().len(), 6);
    // One eof, only after both sources finished.
    assert!(sink.saw_eof());
}

#[test]
fn deactivate_is_idempotent() {
    let mut program = Program::new();
    let source = program.add(
        EmitProc::new(EmitOptions {
            from: Some(Moment::from_millis(0)),
            limit: Some(1),
            ..Default::default()
        })
        .unwrap(),
    );
    let sink = program.add(CollectSink::new());
    program.connect(&source, &sink).unwrap();
    program.start().unwrap();
    program.run().unwrap();
    program.deactivate();
    // A second traversal with a fresh generation is safe.
    program.deactivate();
}

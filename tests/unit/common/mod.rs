//! Shared helpers for the unit suites.

use std::cell::RefCell;
use std::rc::Rc;

use fluxion::fluxion::procs::{CollectSink, PassProc};
use fluxion::fluxion::runtime::graph::{self, Proc, ProcHandle};
use fluxion::fluxion::runtime::time::Moment;
use fluxion::fluxion::runtime::types::{Point, Value};

/// A point with a timestamp and one numeric field
pub fn pt(ms: i64, field: &str, value: f64) -> Point {
    Point::new()
        .with(field, Value::Number(value))
        .at(Moment::from_millis(ms))
}

/// A point with a timestamp, a string key, and a numeric value
pub fn keyed(ms: i64, key: &str, value: f64) -> Point {
    Point::new()
        .with("k", Value::String(key.into()))
        .with("v", Value::Number(value))
        .at(Moment::from_millis(ms))
}

/// Extract (millis, field-as-number) pairs from collected points
pub fn times_and(points: &[Point], field: &str) -> Vec<(i64, f64)> {
    points
        .iter()
        .map(|p| {
            let t = p.time().map(|m| m.millis()).unwrap_or(-1);
            let v = match p.get(field) {
                Some(Value::Number(n)) => *n,
                _ => f64::NAN,
            };
            (t, v)
        })
        .collect()
}

/// Wire a proc between N synthetic upstream edges and a collecting sink,
/// returning (upstream handles, the proc handle, the sink).
///
/// The upstream passes exist only to register input edges; tests drive the
/// proc by consuming on them, which exercises the real propagation path.
pub fn rig<P: Proc + 'static>(
    proc_: P,
    inputs: usize,
) -> (
    Vec<Rc<RefCell<PassProc>>>,
    Rc<RefCell<P>>,
    Rc<RefCell<CollectSink>>,
) {
    let node = Rc::new(RefCell::new(proc_));
    let sink = Rc::new(RefCell::new(CollectSink::new()));
    let node_h: ProcHandle = node.clone();
    let sink_h: ProcHandle = sink.clone();
    let mut ups = Vec::new();
    for _ in 0..inputs {
        let up = Rc::new(RefCell::new(PassProc::new()));
        let up_h: ProcHandle = up.clone();
        graph::connect(&up_h, &node_h).expect("wire upstream");
        ups.push(up);
    }
    graph::connect(&node_h, &sink_h).expect("wire sink");
    node.borrow_mut().start().expect("start proc");
    (ups, node, sink)
}

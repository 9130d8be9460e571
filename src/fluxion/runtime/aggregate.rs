//! Aggregator library.
//!
//! An [`Aggregator`] folds a stream of points into one result value. The
//! reduce proc instantiates one aggregator per output field per group via
//! an [`AggregatorFactory`]; the window layer wraps factories to add
//! trailing-window retention.
//!
//! Incremental aggregators additionally support `expire`: removing a
//! point's contribution as it falls out of a window. Aggregators without a
//! true incremental expire (min, max, distinct counts) are replay-only:
//! the window layer rebuilds them from its buffer instead.

use std::collections::HashMap;
use std::rc::Rc;

use super::error::{RuntimeError, RuntimeResult};
use super::time::Moment;
use super::types::{Point, Value};

/// Folds points into a single result value.
pub trait Aggregator {
    /// Fold one point in
    fn update(&mut self, point: &Point);

    /// Remove one point's contribution. Only meaningful when
    /// [`Aggregator::can_expire`] is true; the default is a no-op.
    fn expire(&mut self, point: &Point) {
        let _ = point;
    }

    /// True for aggregators with a true incremental expire
    fn can_expire(&self) -> bool {
        false
    }

    /// Time has advanced; only windowed wrappers care.
    fn advance(&mut self, time: &Moment) {
        let _ = time;
    }

    /// The current aggregate value
    fn result(&self) -> Value;

    /// Forget everything, ready for the next epoch
    fn reset(&mut self);
}

/// Zero-argument factory producing fresh aggregator instances
pub type AggregatorFactory = Rc<dyn Fn() -> Box<dyn Aggregator>>;

/// Resolve a builtin aggregator by name.
///
/// `field` is the point field the aggregate folds over; `count` accepts a
/// missing field and then counts every point. Unknown names are a
/// configuration error.
pub fn builtin_factory(name: &str, field: Option<&str>) -> RuntimeResult<AggregatorFactory> {
    let field_owned = field.map(|f| f.to_string());
    let require_field = |name: &str| -> RuntimeResult<String> {
        field_owned
            .clone()
            .ok_or_else(|| RuntimeError::config_error(name, "aggregator requires a field"))
    };
    let factory: AggregatorFactory = match name {
        "count" => {
            let field = field_owned.clone();
            Rc::new(move || Box::new(Count::new(field.clone())) as Box<dyn Aggregator>)
        }
        "sum" => {
            let field = require_field("sum")?;
            Rc::new(move || Box::new(Sum::new(field.clone())) as Box<dyn Aggregator>)
        }
        "avg" => {
            let field = require_field("avg")?;
            Rc::new(move || Box::new(Avg::new(field.clone())) as Box<dyn Aggregator>)
        }
        "min" => {
            let field = require_field("min")?;
            Rc::new(move || Box::new(Extremum::new(field.clone(), false)) as Box<dyn Aggregator>)
        }
        "max" => {
            let field = require_field("max")?;
            Rc::new(move || Box::new(Extremum::new(field.clone(), true)) as Box<dyn Aggregator>)
        }
        "first" => {
            let field = require_field("first")?;
            Rc::new(move || Box::new(First::new(field.clone())) as Box<dyn Aggregator>)
        }
        "last" => {
            let field = require_field("last")?;
            Rc::new(move || Box::new(Last::new(field.clone())) as Box<dyn Aggregator>)
        }
        "count_unique" => {
            let field = require_field("count_unique")?;
            Rc::new(move || Box::new(CountUnique::new(field.clone())) as Box<dyn Aggregator>)
        }
        other => {
            return Err(RuntimeError::config_error(
                "reduce",
                format!("unknown aggregator '{}'", other),
            ))
        }
    };
    Ok(factory)
}

/// Count of points, or of non-null values of a field.
struct Count {
    field: Option<String>,
    n: i64,
}

impl Count {
    fn new(field: Option<String>) -> Self {
        Count { field, n: 0 }
    }

    fn counts(&self, point: &Point) -> bool {
        match &self.field {
            None => true,
            Some(f) => !matches!(point.get(f), None | Some(Value::Null)),
        }
    }
}

impl Aggregator for Count {
    fn update(&mut self, point: &Point) {
        if self.counts(point) {
            self.n += 1;
        }
    }

    fn expire(&mut self, point: &Point) {
        if self.counts(point) {
            self.n -= 1;
        }
    }

    fn can_expire(&self) -> bool {
        true
    }

    fn result(&self) -> Value {
        Value::Number(self.n as f64)
    }

    fn reset(&mut self) {
        self.n = 0;
    }
}

/// Sum of a numeric field; non-numeric values contribute nothing.
struct Sum {
    field: String,
    total: f64,
    seen: bool,
}

impl Sum {
    fn new(field: String) -> Self {
        Sum {
            field,
            total: 0.0,
            seen: false,
        }
    }
}

impl Aggregator for Sum {
    fn update(&mut self, point: &Point) {
        if let Some(n) = point.get(&self.field).and_then(Value::as_number) {
            self.total += n;
            self.seen = true;
        }
    }

    fn expire(&mut self, point: &Point) {
        if let Some(n) = point.get(&self.field).and_then(Value::as_number) {
            self.total -= n;
        }
    }

    fn can_expire(&self) -> bool {
        true
    }

    fn result(&self) -> Value {
        if self.seen {
            Value::Number(self.total)
        } else {
            Value::Null
        }
    }

    fn reset(&mut self) {
        self.total = 0.0;
        self.seen = false;
    }
}

/// Arithmetic mean of a numeric field.
struct Avg {
    field: String,
    total: f64,
    n: i64,
}

impl Avg {
    fn new(field: String) -> Self {
        Avg {
            field,
            total: 0.0,
            n: 0,
        }
    }
}

impl Aggregator for Avg {
    fn update(&mut self, point: &Point) {
        if let Some(v) = point.get(&self.field).and_then(Value::as_number) {
            self.total += v;
            self.n += 1;
        }
    }

    fn expire(&mut self, point: &Point) {
        if let Some(v) = point.get(&self.field).and_then(Value::as_number) {
            self.total -= v;
            self.n -= 1;
        }
    }

    fn can_expire(&self) -> bool {
        true
    }

    fn result(&self) -> Value {
        if self.n == 0 {
            Value::Null
        } else {
            Value::Number(self.total / self.n as f64)
        }
    }

    fn reset(&mut self) {
        self.total = 0.0;
        self.n = 0;
    }
}

/// Min/max over any comparable field values. Replay-only: removing the
/// current extremum would require the full value history.
struct Extremum {
    field: String,
    want_max: bool,
    best: Option<Value>,
}

impl Extremum {
    fn new(field: String, want_max: bool) -> Self {
        Extremum {
            field,
            want_max,
            best: None,
        }
    }
}

impl Aggregator for Extremum {
    fn update(&mut self, point: &Point) {
        let Some(value) = point.get(&self.field) else {
            return;
        };
        if matches!(value, Value::Null) {
            return;
        }
        let better = match &self.best {
            None => true,
            Some(best) => {
                let ord = value.total_cmp(best);
                if self.want_max {
                    ord == std::cmp::Ordering::Greater
                } else {
                    ord == std::cmp::Ordering::Less
                }
            }
        };
        if better {
            self.best = Some(value.clone());
        }
    }

    fn result(&self) -> Value {
        self.best.clone().unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.best = None;
    }
}

/// First non-missing value wins, then never changes.
struct First {
    field: String,
    value: Option<Value>,
}

impl First {
    fn new(field: String) -> Self {
        First { field, value: None }
    }
}

impl Aggregator for First {
    fn update(&mut self, point: &Point) {
        if self.value.is_none() {
            if let Some(v) = point.get(&self.field) {
                self.value = Some(v.clone());
            }
        }
    }

    fn result(&self) -> Value {
        self.value.clone().unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.value = None;
    }
}

/// Always updated; the latest value wins.
struct Last {
    field: String,
    value: Option<Value>,
}

impl Last {
    fn new(field: String) -> Self {
        Last { field, value: None }
    }
}

impl Aggregator for Last {
    fn update(&mut self, point: &Point) {
        if let Some(v) = point.get(&self.field) {
            self.value = Some(v.clone());
        }
    }

    fn result(&self) -> Value {
        self.value.clone().unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.value = None;
    }
}

/// Exact distinct count over a field; nulls do not count.
struct CountUnique {
    field: String,
    seen: HashMap<Value, u64>,
}

impl CountUnique {
    fn new(field: String) -> Self {
        CountUnique {
            field,
            seen: HashMap::new(),
        }
    }
}

impl Aggregator for CountUnique {
    fn update(&mut self, point: &Point) {
        match point.get(&self.field) {
            None | Some(Value::Null) => {}
            Some(v) => {
                *self.seen.entry(v.clone()).or_insert(0) += 1;
            }
        }
    }

    fn result(&self) -> Value {
        Value::Number(self.seen.len() as f64)
    }

    fn reset(&mut self) {
        self.seen.clear();
    }
}

//! In-memory option tree backed by `serde_json`.
//!
//! Objects are containers, arrays of objects are repeated siblings and arrays of numbers are list
//! values. `null`, `true` and `{}` mark presence-only options; `false` is treated as absent.

use serde_json::Value;

use super::{OptionStore, OptionValue};
use crate::error::KError;

#[derive(Debug, Clone)]
pub struct OptionTree {
    root: Value,
}

fn parse_segment(seg: &str) -> Option<(&str, Option<usize>)> {
    match seg.find('[') {
        Some(open) if seg.ends_with(']') => {
            let idx = seg[open + 1..seg.len() - 1].trim().parse().ok()?;
            Some((&seg[..open], Some(idx)))
        }
        Some(_) => None,
        None => Some((seg, None)),
    }
}

fn is_repeated(v: &Value) -> bool {
    matches!(v, Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object))
}

fn select(child: &Value, idx: Option<usize>) -> Option<&Value> {
    if is_repeated(child) {
        let Value::Array(items) = child else { return None };
        items.get(idx.unwrap_or(0))
    } else {
        match idx {
            None | Some(0) => Some(child),
            Some(_) => None,
        }
    }
}

impl OptionTree {
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn from_json_str(s: &str) -> Result<Self, KError> {
        let root = serde_json::from_str(s).map_err(|e| KError::invalid("<root>", e.to_string()))?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> Option<&Value> {
        let mut node = &self.root;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            let (name, idx) = parse_segment(seg)?;
            let child = node.as_object()?.get(name)?;
            node = select(child, idx)?;
        }
        match node {
            Value::Bool(false) => None,
            _ => Some(node),
        }
    }
}

impl OptionStore for OptionTree {
    fn have_option(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    fn option_count(&self, path: &str) -> usize {
        let (parent, last) = match path.rsplit_once('/') {
            Some((p, l)) => (self.resolve(p), l),
            None => (Some(&self.root), path),
        };
        let Some((name, _)) = parse_segment(last) else { return 0 };
        match parent.and_then(Value::as_object).and_then(|o| o.get(name)) {
            None | Some(Value::Bool(false)) => 0,
            Some(Value::Array(items)) if items.is_empty() => 0,
            Some(v @ Value::Array(items)) if is_repeated(v) => items.len(),
            Some(_) => 1,
        }
    }

    fn get_value(&self, path: &str) -> Option<OptionValue> {
        match self.resolve(path)? {
            Value::Null | Value::Bool(_) | Value::Object(_) => Some(OptionValue::Flag),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(OptionValue::Int(i)),
                None => n.as_f64().map(OptionValue::Real),
            },
            Value::String(s) => Some(OptionValue::Str(s.clone())),
            Value::Array(items) => {
                let ints: Option<Vec<i64>> = items.iter().map(Value::as_i64).collect();
                if let Some(ints) = ints {
                    return Some(OptionValue::IntList(ints));
                }
                let reals: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
                reals.map(OptionValue::RealList)
            }
        }
    }
}

//! Accumulator folds.
//!
//! Shards reduce locally and the coordinator folds the shard values with the
//! same function and seed, so a reduce only gives the sequential answer when
//! it is associative and its seed is an identity. Everything registered here
//! is, given the matching seed (`0` for `sum`, `1` for `product`, `""` for
//! `concat`, a bound for `min`/`max`).

use std::cmp::Ordering;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::num::Num;
use crate::ReduceFn;

pub fn try_named(name: &str) -> Option<(&'static str, usize, ReduceFn)> {
    let entry: (&'static str, usize, ReduceFn) = match name {
        "sum" => ("sum", 0, sum),
        "product" => ("product", 0, product),
        "min" => ("min", 0, min),
        "max" => ("max", 0, max),
        "concat" => ("concat", 0, concat),
        _ => return None,
    };
    Some(entry)
}

fn sum(accumulator: Value, element: &Value, _args: &[Value]) -> Result<Value> {
    Num::from_value(&accumulator)?
        .add(Num::from_value(element)?)
        .into_value()
}

fn product(accumulator: Value, element: &Value, _args: &[Value]) -> Result<Value> {
    Num::from_value(&accumulator)?
        .mul(Num::from_value(element)?)
        .into_value()
}

fn min(accumulator: Value, element: &Value, _args: &[Value]) -> Result<Value> {
    let ordering = Num::from_value(element)?.compare(Num::from_value(&accumulator)?)?;
    Ok(match ordering {
        Ordering::Less => element.clone(),
        _ => accumulator,
    })
}

fn max(accumulator: Value, element: &Value, _args: &[Value]) -> Result<Value> {
    let ordering = Num::from_value(element)?.compare(Num::from_value(&accumulator)?)?;
    Ok(match ordering {
        Ordering::Greater => element.clone(),
        _ => accumulator,
    })
}

fn concat(accumulator: Value, element: &Value, _args: &[Value]) -> Result<Value> {
    match (accumulator, element) {
        (Value::String(mut acc), Value::String(s)) => {
            acc.push_str(s);
            Ok(Value::String(acc))
        }
        (acc, el) => bail!("`concat` needs strings, got {acc} and {el}"),
    }
}

//! Predicates over an element and its dataset position.

use std::cmp::Ordering;

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::num::Num;
use crate::{arg, FilterFn};

pub fn try_named(name: &str) -> Option<(&'static str, usize, FilterFn)> {
    let entry: (&'static str, usize, FilterFn) = match name {
        "even" => ("even", 0, even),
        "odd" => ("odd", 0, odd),
        "gt" => ("gt", 1, gt),
        "gte" => ("gte", 1, gte),
        "lt" => ("lt", 1, lt),
        "lte" => ("lte", 1, lte),
        "eq" => ("eq", 1, eq),
        "ne" => ("ne", 1, ne),
        "index_even" => ("index_even", 0, index_even),
        "index_below" => ("index_below", 1, index_below),
        "eq_or_index" => ("eq_or_index", 2, eq_or_index),
        _ => return None,
    };
    Some(entry)
}

fn even(element: &Value, _index: usize, _args: &[Value]) -> Result<bool> {
    Ok(Num::from_value(element)?.is_even())
}

fn odd(element: &Value, _index: usize, _args: &[Value]) -> Result<bool> {
    Ok(!Num::from_value(element)?.is_even())
}

fn compare_to_arg(element: &Value, args: &[Value]) -> Result<Ordering> {
    Num::from_value(element)?.compare(Num::from_value(arg(args, 0)?)?)
}

fn gt(element: &Value, _index: usize, args: &[Value]) -> Result<bool> {
    Ok(compare_to_arg(element, args)? == Ordering::Greater)
}

fn gte(element: &Value, _index: usize, args: &[Value]) -> Result<bool> {
    Ok(compare_to_arg(element, args)? != Ordering::Less)
}

fn lt(element: &Value, _index: usize, args: &[Value]) -> Result<bool> {
    Ok(compare_to_arg(element, args)? == Ordering::Less)
}

fn lte(element: &Value, _index: usize, args: &[Value]) -> Result<bool> {
    Ok(compare_to_arg(element, args)? != Ordering::Greater)
}

fn eq(element: &Value, _index: usize, args: &[Value]) -> Result<bool> {
    Ok(element == arg(args, 0)?)
}

fn ne(element: &Value, _index: usize, args: &[Value]) -> Result<bool> {
    Ok(element != arg(args, 0)?)
}

fn index_even(_element: &Value, index: usize, _args: &[Value]) -> Result<bool> {
    Ok(index % 2 == 0)
}

fn index_arg(args: &[Value], i: usize) -> Result<u64> {
    arg(args, i)?
        .as_u64()
        .ok_or_else(|| anyhow!("argument {i} must be a non-negative integer index"))
}

fn index_below(_element: &Value, index: usize, args: &[Value]) -> Result<bool> {
    Ok((index as u64) < index_arg(args, 0)?)
}

/// Keep the element equal to the first argument, or the one sitting at the
/// index given by the second.
fn eq_or_index(element: &Value, index: usize, args: &[Value]) -> Result<bool> {
    Ok(element == arg(args, 0)? || index as u64 == index_arg(args, 1)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, element: Value, index: usize, args: &[Value]) -> bool {
        let (_, _, f) = try_named(name).unwrap();
        f(&element, index, args).unwrap()
    }

    #[test]
    fn comparisons() {
        assert!(call("gt", json!(5), 0, &[json!(3)]));
        assert!(!call("gt", json!(3), 0, &[json!(3)]));
        assert!(call("gte", json!(3), 0, &[json!(3)]));
        assert!(call("lt", json!(2.5), 0, &[json!(3)]));
        assert!(call("lte", json!(3), 0, &[json!(3.0)]));
        assert!(call("eq", json!("a"), 0, &[json!("a")]));
        assert!(call("ne", json!("a"), 0, &[json!("b")]));
    }

    #[test]
    fn index_predicates() {
        assert!(call("index_even", json!(null), 4, &[]));
        assert!(!call("index_even", json!(null), 5, &[]));
        assert!(call("index_below", json!(null), 1, &[json!(2)]));
        assert!(!call("index_below", json!(null), 2, &[json!(2)]));
        assert!(call("eq_or_index", json!(325), 0, &[json!(325), json!(2)]));
        assert!(call("eq_or_index", json!(1), 2, &[json!(325), json!(2)]));
        assert!(!call("eq_or_index", json!(1), 1, &[json!(325), json!(2)]));
    }

    #[test]
    fn parity_needs_numbers() {
        let (_, _, f) = try_named("even").unwrap();
        assert!(f(&json!("2"), 0, &[]).is_err());
        assert!(call("odd", json!(3), 0, &[]));
    }
}

//! Element-to-element functions.

use anyhow::{anyhow, bail, Result};
use serde_json::Value;

use crate::num::Num;
use crate::{arg, MapFn};

pub fn try_named(name: &str) -> Option<(&'static str, usize, MapFn)> {
    let entry: (&'static str, usize, MapFn) = match name {
        "identity" => ("identity", 0, identity),
        "double" => ("double", 0, double),
        "square" => ("square", 0, square),
        "negate" => ("negate", 0, negate),
        "increment" => ("increment", 0, increment),
        "add" => ("add", 1, add),
        "multiply" => ("multiply", 1, multiply),
        "to_string" => ("to_string", 0, to_string),
        "length" => ("length", 0, length),
        "field" => ("field", 1, field),
        _ => return None,
    };
    Some(entry)
}

fn identity(element: &Value, _args: &[Value]) -> Result<Value> {
    Ok(element.clone())
}

fn double(element: &Value, _args: &[Value]) -> Result<Value> {
    Num::from_value(element)?.mul(Num::Int(2)).into_value()
}

fn square(element: &Value, _args: &[Value]) -> Result<Value> {
    let n = Num::from_value(element)?;
    n.mul(n).into_value()
}

fn negate(element: &Value, _args: &[Value]) -> Result<Value> {
    Num::from_value(element)?.neg().into_value()
}

fn increment(element: &Value, _args: &[Value]) -> Result<Value> {
    Num::from_value(element)?.add(Num::Int(1)).into_value()
}

fn add(element: &Value, args: &[Value]) -> Result<Value> {
    let n = Num::from_value(arg(args, 0)?)?;
    Num::from_value(element)?.add(n).into_value()
}

fn multiply(element: &Value, args: &[Value]) -> Result<Value> {
    let n = Num::from_value(arg(args, 0)?)?;
    Num::from_value(element)?.mul(n).into_value()
}

fn to_string(element: &Value, _args: &[Value]) -> Result<Value> {
    match element {
        Value::String(_) => Ok(element.clone()),
        other => Ok(Value::String(other.to_string())),
    }
}

/// Characters of a string, items of an array, or keys of an object.
fn length(element: &Value, _args: &[Value]) -> Result<Value> {
    let len = match element {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(fields) => fields.len(),
        other => bail!("`length` needs a string, array or object, got {other}"),
    };
    Ok(Value::from(len))
}

/// The named field of an object, or null when it is absent.
fn field(element: &Value, args: &[Value]) -> Result<Value> {
    let key = arg(args, 0)?
        .as_str()
        .ok_or_else(|| anyhow!("`field` needs a string key"))?;
    match element {
        Value::Object(fields) => Ok(fields.get(key).cloned().unwrap_or(Value::Null)),
        other => bail!("`field` needs an object, got {other}"),
    }
}

use std::cmp::Ordering;

use anyhow::{anyhow, bail, Result};
use serde_json::{Number, Value};

/// A JSON number, kept integral as long as the arithmetic allows.
///
/// Integers are held wide enough for every `i64` and `u64` JSON carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Num {
    Int(i128),
    Float(f64),
}

impl Num {
    pub fn from_value(value: &Value) -> Result<Num> {
        let Value::Number(n) = value else {
            bail!("expected a number, got {value}");
        };
        if let Some(i) = n.as_i64() {
            return Ok(Num::Int(i.into()));
        }
        if let Some(u) = n.as_u64() {
            return Ok(Num::Int(u.into()));
        }
        n.as_f64()
            .map(Num::Float)
            .ok_or_else(|| anyhow!("{n} is not a usable number"))
    }

    pub fn into_value(self) -> Result<Value> {
        match self {
            Num::Int(i) => {
                if let Ok(small) = i64::try_from(i) {
                    Ok(Value::from(small))
                } else if let Ok(big) = u64::try_from(i) {
                    Ok(Value::from(big))
                } else {
                    Num::Float(i as f64).into_value()
                }
            }
            Num::Float(f) => Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| anyhow!("{f} cannot be represented in JSON")),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    pub fn add(self, other: Num) -> Num {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => a
                .checked_add(b)
                .map_or(Num::Float(a as f64 + b as f64), Num::Int),
            (a, b) => Num::Float(a.as_f64() + b.as_f64()),
        }
    }

    pub fn mul(self, other: Num) -> Num {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => a
                .checked_mul(b)
                .map_or(Num::Float(a as f64 * b as f64), Num::Int),
            (a, b) => Num::Float(a.as_f64() * b.as_f64()),
        }
    }

    pub fn neg(self) -> Num {
        match self {
            Num::Int(i) => i.checked_neg().map_or(Num::Float(-(i as f64)), Num::Int),
            Num::Float(f) => Num::Float(-f),
        }
    }

    pub fn is_even(self) -> bool {
        match self {
            Num::Int(i) => i % 2 == 0,
            Num::Float(f) => f % 2.0 == 0.0,
        }
    }

    pub fn compare(self, other: Num) -> Result<Ordering> {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => Ok(a.cmp(&b)),
            (a, b) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(|| anyhow!("cannot order {a:?} and {b:?}")),
        }
    }
}

//! Scalar SQL functions.
//!
//! Functions receive their already-evaluated parameter columns and produce
//! one output value per row. RANDOM, RAND, NORMAL and RANDOM_STRING are
//! non-deterministic and evaluated per row; the optimizer never folds them.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::errors::{Error, Result};
use crate::value::{Value, ValueType};

/// Apply a named scalar function across `row_count` rows.
///
/// `parameters[p][r]` is the value of parameter `p` at row `r`.
pub fn apply(
    name: &str,
    parameters: &[Vec<Value>],
    row_count: usize,
) -> Result<(Vec<Value>, ValueType)> {
    match name {
        "PASSTHRU" => {
            let param = required(parameters, 0, name)?;
            let value_type = column_type(param);
            Ok((param.clone(), value_type))
        }
        "IFNULL" => {
            let value = required(parameters, 0, name)?;
            let fallback = required(parameters, 1, name)?;
            let out = value
                .iter()
                .zip(fallback.iter())
                .map(|(v, f)| if v.is_null() { f.clone() } else { v.clone() })
                .collect::<Vec<_>>();
            let value_type = column_type(&out);
            Ok((out, value_type))
        }
        "IFNOTNULL" => {
            // where the probe is null, stay null; otherwise the replacement
            let probe = required(parameters, 0, name)?;
            let replacement = required(parameters, 1, name)?;
            let out = probe
                .iter()
                .zip(replacement.iter())
                .map(|(p, r)| if p.is_null() { Value::Null } else { r.clone() })
                .collect::<Vec<_>>();
            let value_type = column_type(&out);
            Ok((out, value_type))
        }
        "RANDOM" | "RAND" => {
            let mut rng = rand::thread_rng();
            let out = (0..row_count)
                .map(|_| Value::Double(rng.gen::<f64>()))
                .collect();
            Ok((out, ValueType::Double))
        }
        "NORMAL" => {
            // Box-Muller transform over the uniform generator
            let mut rng = rand::thread_rng();
            let out = (0..row_count)
                .map(|_| {
                    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
                    let u2: f64 = rng.gen();
                    Value::Double(
                        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos(),
                    )
                })
                .collect();
            Ok((out, ValueType::Double))
        }
        "RANDOM_STRING" => {
            let length = parameters
                .first()
                .and_then(|p| p.first())
                .and_then(|v| match v {
                    Value::Integer(i) => Some(*i as usize),
                    _ => None,
                })
                .unwrap_or(16);
            let mut rng = rand::thread_rng();
            let out = (0..row_count)
                .map(|_| {
                    let s: String = (&mut rng)
                        .sample_iter(&Alphanumeric)
                        .take(length)
                        .map(char::from)
                        .collect();
                    Value::Varchar(s)
                })
                .collect();
            Ok((out, ValueType::Varchar))
        }
        "UPPER" => map_strings(parameters, name, |s| s.to_uppercase()),
        "LOWER" => map_strings(parameters, name, |s| s.to_lowercase()),
        "TRIM" => map_strings(parameters, name, |s| s.trim().to_string()),
        "LENGTH" => {
            let param = required(parameters, 0, name)?;
            let out = param
                .iter()
                .map(|v| match v {
                    Value::Null => Value::Null,
                    Value::Varchar(s) => Value::Integer(s.chars().count() as i64),
                    Value::Blob(b) => Value::Integer(b.len() as i64),
                    Value::Array(a) => Value::Integer(a.len() as i64),
                    _ => Value::Null,
                })
                .collect();
            Ok((out, ValueType::Integer))
        }
        "ABS" => {
            let param = required(parameters, 0, name)?;
            let out = param
                .iter()
                .map(|v| match v {
                    Value::Integer(i) => Value::Integer(i.abs()),
                    Value::Double(d) => Value::Double(d.abs()),
                    _ => Value::Null,
                })
                .collect();
            Ok((out, column_type(required(parameters, 0, name)?)))
        }
        "ROUND" => {
            let param = required(parameters, 0, name)?;
            let places = parameters
                .get(1)
                .and_then(|p| p.first())
                .and_then(|v| match v {
                    Value::Integer(i) => Some(*i),
                    _ => None,
                })
                .unwrap_or(0);
            let factor = 10f64.powi(places as i32);
            let out = param
                .iter()
                .map(|v| match v.as_f64() {
                    Some(d) => Value::Double((d * factor).round() / factor),
                    None => Value::Null,
                })
                .collect();
            Ok((out, ValueType::Double))
        }
        "CONCAT" => {
            let out = (0..row_count)
                .map(|row| {
                    let mut buffer = String::new();
                    for param in parameters {
                        match &param[row] {
                            Value::Null => return Value::Null,
                            value => buffer.push_str(&value.to_string()),
                        }
                    }
                    Value::Varchar(buffer)
                })
                .collect();
            Ok((out, ValueType::Varchar))
        }
        other => Err(Error::Sql(format!("unknown function '{other}'"))),
    }
}

fn required<'a>(parameters: &'a [Vec<Value>], index: usize, name: &str) -> Result<&'a Vec<Value>> {
    parameters
        .get(index)
        .ok_or_else(|| Error::Sql(format!("{name} expects at least {} parameters", index + 1)))
}

fn map_strings(
    parameters: &[Vec<Value>],
    name: &str,
    f: impl Fn(&str) -> String,
) -> Result<(Vec<Value>, ValueType)> {
    let param = required(parameters, 0, name)?;
    let out = param
        .iter()
        .map(|v| match v {
            Value::Varchar(s) => Value::Varchar(f(s)),
            Value::Null => Value::Null,
            _ => Value::Null,
        })
        .collect();
    Ok((out, ValueType::Varchar))
}

fn column_type(values: &[Value]) -> ValueType {
    values
        .iter()
        .find(|v| !v.is_null())
        .map_or(ValueType::Null, Value::value_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ifnull_substitutes_only_nulls() {
        let (out, _) = apply(
            "IFNULL",
            &[
                vec![Value::Null, Value::Integer(5)],
                vec![Value::Integer(0), Value::Integer(0)],
            ],
            2,
        )
        .expect("ifnull applies");
        assert_eq!(out, vec![Value::Integer(0), Value::Integer(5)]);
    }

    #[test]
    fn ifnotnull_keeps_null_and_replaces_rest() {
        let (out, _) = apply(
            "IFNOTNULL",
            &[
                vec![Value::Null, Value::Integer(5)],
                vec![Value::Integer(0), Value::Integer(0)],
            ],
            2,
        )
        .expect("ifnotnull applies");
        assert_eq!(out, vec![Value::Null, Value::Integer(0)]);
    }

    #[test]
    fn random_string_has_requested_length() {
        let (out, _) = apply("RANDOM_STRING", &[vec![Value::Integer(8)]], 3)
            .expect("random_string applies");
        for value in out {
            assert_eq!(value.as_str().map(str::len), Some(8));
        }
    }

    #[test]
    fn unknown_function_errors() {
        assert!(apply("NO_SUCH_FN", &[], 1).is_err());
    }
}

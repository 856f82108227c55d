use serde_json::Value;
use std::error::Error;
use std::fmt::Write;
use std::net::IpAddr;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::Row;
use tracing::debug;

type DecodeError = Box<dyn Error + Sync + Send>;

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// `NUMERIC` rendered exactly, at the column's display scale.
struct NumericText(String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        numeric_to_string(raw).map(NumericText)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Decodes the binary `numeric` wire format: a header of ndigits, weight,
/// sign and display scale, then base-10000 digit groups.
fn numeric_to_string(raw: &[u8]) -> Result<String, DecodeError> {
    let word = |i: usize| -> Result<u16, DecodeError> {
        raw.get(i..i + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated numeric value".into())
    };

    let ndigits = word(0)? as usize;
    let weight = word(2)? as i16 as i32;
    let sign = word(4)?;
    let dscale = word(6)? as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i))
        .collect::<Result<Vec<u16>, _>>()?;
    let group = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                let _ = write!(out, "{}", group(i));
            } else {
                let _ = write!(out, "{:04}", group(i));
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while frac.len() < dscale {
            let _ = write!(frac, "{:04}", group(i));
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

/// Stand-in for a non-NULL value this client cannot decode. Never the NULL
/// sentinel, so real NULLs stay distinguishable.
pub(crate) fn undecodable(pg_type: &Type) -> Value {
    Value::String(format!("<{}>", pg_type.name()))
}

fn cell<'a, T: FromSql<'a>>(
    row: &'a Row,
    idx: usize,
    pg_type: &Type,
    into_json: impl FnOnce(T) -> Value,
) -> Value {
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => into_json(v),
        Ok(None) => Value::Null,
        Err(e) => {
            debug!(column = idx, pg_type = %pg_type.name(), error = %e, "Undecodable Postgres value");
            undecodable(pg_type)
        }
    }
}

fn float(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

fn list<T>(items: Vec<Option<T>>, item: impl Fn(T) -> Value) -> Value {
    Value::Array(
        items
            .into_iter()
            .map(|v| v.map(&item).unwrap_or(Value::Null))
            .collect(),
    )
}

/// Converts column `idx` of `row` to JSON. SQL NULL is the only source of
/// `Value::Null`.
pub(crate) fn pg_value_to_json(row: &Row, idx: usize, pg_type: &Type) -> Value {
    match *pg_type {
        Type::BOOL => cell(row, idx, pg_type, Value::Bool),
        Type::INT2 => cell(row, idx, pg_type, |v: i16| Value::from(v)),
        Type::INT4 => cell(row, idx, pg_type, |v: i32| Value::from(v)),
        Type::INT8 => cell(row, idx, pg_type, |v: i64| Value::from(v)),
        Type::OID => cell(row, idx, pg_type, |v: u32| Value::from(v)),
        Type::FLOAT4 => cell(row, idx, pg_type, |v: f32| float(v as f64)),
        Type::FLOAT8 => cell(row, idx, pg_type, float),
        Type::NUMERIC => cell(row, idx, pg_type, |v: NumericText| Value::String(v.0)),
        Type::JSON | Type::JSONB => cell(row, idx, pg_type, |v: Value| v),
        Type::UUID => cell(row, idx, pg_type, |v: uuid::Uuid| Value::String(v.to_string())),
        Type::TIMESTAMP => cell(row, idx, pg_type, |v: chrono::NaiveDateTime| {
            Value::String(v.to_string())
        }),
        Type::TIMESTAMPTZ => cell(row, idx, pg_type, |v: chrono::DateTime<chrono::Utc>| {
            Value::String(v.to_rfc3339())
        }),
        Type::DATE => cell(row, idx, pg_type, |v: chrono::NaiveDate| {
            Value::String(v.to_string())
        }),
        Type::TIME => cell(row, idx, pg_type, |v: chrono::NaiveTime| {
            Value::String(v.to_string())
        }),
        Type::INET => cell(row, idx, pg_type, |v: IpAddr| Value::String(v.to_string())),
        Type::BYTEA => cell(row, idx, pg_type, |v: Vec<u8>| {
            Value::String(format!("<{} bytes>", v.len()))
        }),
        Type::BOOL_ARRAY => cell(row, idx, pg_type, |v: Vec<Option<bool>>| list(v, Value::Bool)),
        Type::INT2_ARRAY => cell(row, idx, pg_type, |v: Vec<Option<i16>>| list(v, Value::from)),
        Type::INT4_ARRAY => cell(row, idx, pg_type, |v: Vec<Option<i32>>| list(v, Value::from)),
        Type::INT8_ARRAY => cell(row, idx, pg_type, |v: Vec<Option<i64>>| list(v, Value::from)),
        Type::FLOAT8_ARRAY => cell(row, idx, pg_type, |v: Vec<Option<f64>>| list(v, float)),
        Type::NUMERIC_ARRAY => cell(row, idx, pg_type, |v: Vec<Option<NumericText>>| {
            list(v, |n| Value::String(n.0))
        }),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::BPCHAR_ARRAY | Type::NAME_ARRAY => {
            cell(row, idx, pg_type, |v: Vec<Option<String>>| list(v, Value::String))
        }
        // Text-like types (text, varchar, char, name, citext); anything else
        // falls through to the placeholder.
        _ => cell(row, idx, pg_type, Value::String),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_wire(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn decodes_numeric_at_display_scale() {
        // 12.50 as numeric(10,2)
        assert_eq!(numeric_to_string(&numeric_wire(0, 0, 2, &[12, 5000])).unwrap(), "12.50");
        assert_eq!(
            numeric_to_string(&numeric_wire(1, 0, 1, &[12, 3456, 7000])).unwrap(),
            "123456.7"
        );
        assert_eq!(numeric_to_string(&numeric_wire(-1, 0, 3, &[10])).unwrap(), "0.001");
        assert_eq!(numeric_to_string(&numeric_wire(-2, 0, 5, &[1000])).unwrap(), "0.00001");
        assert_eq!(
            numeric_to_string(&numeric_wire(0, NUMERIC_NEG, 4, &[7, 2500])).unwrap(),
            "-7.2500"
        );
    }

    #[test]
    fn decodes_numeric_integers_and_trailing_zero_groups() {
        // 20000 has a single digit group of weight 1
        assert_eq!(numeric_to_string(&numeric_wire(1, 0, 0, &[2])).unwrap(), "20000");
        assert_eq!(numeric_to_string(&numeric_wire(0, 0, 0, &[])).unwrap(), "0");
        assert_eq!(numeric_to_string(&numeric_wire(0, 0, 2, &[])).unwrap(), "0.00");
    }

    #[test]
    fn decodes_numeric_special_values() {
        assert_eq!(numeric_to_string(&numeric_wire(0, NUMERIC_NAN, 0, &[])).unwrap(), "NaN");
        assert_eq!(
            numeric_to_string(&numeric_wire(0, NUMERIC_NINF, 0, &[])).unwrap(),
            "-Infinity"
        );
    }

    #[test]
    fn rejects_truncated_numeric() {
        let mut raw = numeric_wire(0, 0, 2, &[12, 5000]);
        raw.truncate(raw.len() - 1);
        assert!(numeric_to_string(&raw).is_err());
        assert!(numeric_to_string(&[0, 1]).is_err());
    }

    #[test]
    fn undecodable_values_are_never_null() {
        let placeholder = undecodable(&Type::INTERVAL);
        assert_eq!(placeholder, Value::String("<interval>".to_string()));
        assert_ne!(placeholder, Value::Null);
        assert_eq!(undecodable(&Type::MONEY), Value::String("<money>".to_string()));
    }

    #[test]
    fn non_finite_floats_keep_their_text() {
        assert_eq!(float(1.5), Value::from(1.5));
        assert_eq!(float(f64::NAN), Value::String("NaN".to_string()));
    }
}

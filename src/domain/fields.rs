//! Typed field converters.
//!
//! A native representation is plain JSON. Values that JSON cannot carry
//! directly (dates, datetimes, relations) are stored under a `"name:TypeCode"`
//! key and converted back when the instance is read from the cache.
//!
//! | Type code | JSON form                              | Decoded as                 |
//! |-----------|----------------------------------------|----------------------------|
//! | `Date`    | `[2014, 9, 22]` or `null`              | [`FieldValue::Date`]       |
//! | `DateTime`| `1411375920` or `"1411375920.123456"`  | [`FieldValue::DateTime`]   |
//! | `PK`      | `{"app", "model", "pk"}`               | [`FieldValue::Pk`]         |
//! | `PKList`  | `{"app", "model", "pks": [...]}`       | [`FieldValue::PkList`]     |

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::domain::cached::{PkOnlyModel, PkOnlyQueryset};
use crate::domain::model::{ModelRef, Native, Pk};
use crate::utils::error::{CacheError, Result};

/// Decoded instance: field name to value.
pub type CachedInstance = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Date,
    DateTime,
    Pk,
    PkList,
}

impl FieldType {
    /// Type codes are matched case-insensitively (`DateTime`, `datetime`).
    pub fn from_code(code: &str) -> Result<Self> {
        match code.to_ascii_lowercase().as_str() {
            "date" => Ok(FieldType::Date),
            "datetime" => Ok(FieldType::DateTime),
            "pk" => Ok(FieldType::Pk),
            "pklist" => Ok(FieldType::PkList),
            _ => Err(CacheError::UnknownFieldType {
                code: code.to_string(),
            }),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            FieldType::Date => "Date",
            FieldType::DateTime => "DateTime",
            FieldType::Pk => "PK",
            FieldType::PkList => "PKList",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(Value),
    Date(Option<NaiveDate>),
    DateTime(Option<DateTime<Utc>>),
    Pk(PkOnlyModel),
    PkList(PkOnlyQueryset),
}

impl FieldValue {
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            FieldValue::Json(_) => None,
            FieldValue::Date(_) => Some(FieldType::Date),
            FieldValue::DateTime(_) => Some(FieldType::DateTime),
            FieldValue::Pk(_) => Some(FieldType::Pk),
            FieldValue::PkList(_) => Some(FieldType::PkList),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            FieldValue::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_json().and_then(Value::as_i64)
    }

    /// Output form, the way a REST response would render the field:
    /// ISO dates, RFC 3339 datetimes, bare primary keys.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Json(value) => value.clone(),
            FieldValue::Date(day) => day
                .map(|d| Value::from(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null),
            FieldValue::DateTime(dt) => dt
                .map(|d| Value::from(d.to_rfc3339()))
                .unwrap_or(Value::Null),
            FieldValue::Pk(related) => related.pk.to_json(),
            FieldValue::PkList(related) => {
                Value::Array(related.pks.iter().map(Pk::to_json).collect())
            }
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

pub fn date_to_json(day: Option<NaiveDate>) -> Value {
    match day {
        Some(d) => json!([d.year(), d.month(), d.day()]),
        None => Value::Null,
    }
}

pub fn date_from_json(value: &Value) -> Result<Option<NaiveDate>> {
    let parts = match value {
        Value::Null => return Ok(None),
        Value::Array(parts) if parts.len() == 3 => parts,
        other => return Err(decode_error("Date", format!("expected [y, m, d], got {}", other))),
    };
    let numbers: Vec<i64> = parts.iter().filter_map(Value::as_i64).collect();
    if numbers.len() != 3 {
        return Err(decode_error("Date", "date parts must be integers"));
    }
    let out_of_range = || decode_error("Date", format!("{:?} is out of range", numbers));
    let year = i32::try_from(numbers[0]).map_err(|_| out_of_range())?;
    let month = u32::try_from(numbers[1]).map_err(|_| out_of_range())?;
    let day = u32::try_from(numbers[2]).map_err(|_| out_of_range())?;
    NaiveDate::from_ymd_opt(year, month, day)
        .map(Some)
        .ok_or_else(|| decode_error("Date", format!("{:?} is not a calendar date", numbers)))
}

/// Whole seconds as an integer, or `"secs.micros"` with six digits of
/// microseconds when there is a sub-second part.
pub fn datetime_to_json(dt: &DateTime<Utc>) -> Value {
    let seconds = dt.timestamp();
    let micros = dt.timestamp_subsec_micros();
    if micros != 0 {
        Value::from(format!("{}.{:06}", seconds, micros))
    } else {
        Value::from(seconds)
    }
}

/// Naive datetimes are taken to be UTC.
pub fn naive_datetime_to_json(dt: &NaiveDateTime) -> Value {
    datetime_to_json(&dt.and_utc())
}

pub fn datetime_from_json(value: &Value) -> Result<Option<DateTime<Utc>>> {
    let (seconds, micros) = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => {
            let seconds = n
                .as_i64()
                .ok_or_else(|| decode_error("DateTime", format!("{} is not an integer", n)))?;
            (seconds, 0)
        }
        Value::String(s) => {
            let (secs, frac) = s.split_once('.').unwrap_or((s.as_str(), "0"));
            let seconds = secs
                .parse::<i64>()
                .map_err(|e| decode_error("DateTime", format!("'{}': {}", s, e)))?;
            (seconds, parse_micros(s, frac)?)
        }
        other => return Err(decode_error("DateTime", format!("unexpected value {}", other))),
    };

    let base = DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| decode_error("DateTime", format!("timestamp {} out of range", seconds)))?;
    base.checked_add_signed(chrono::Duration::microseconds(micros))
        .map(Some)
        .ok_or_else(|| decode_error("DateTime", format!("'{}' is out of range", value)))
}

/// Sub-second part of `"secs.micros"`: 1 to 6 digits, right-padded.
fn parse_micros(raw: &str, frac: &str) -> Result<i64> {
    if frac.is_empty() || frac.len() > 6 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(decode_error(
            "DateTime",
            format!("'{}': fraction must be 1 to 6 digits", raw),
        ));
    }
    let padded = format!("{:0<6}", frac);
    padded
        .parse::<i64>()
        .map_err(|e| decode_error("DateTime", format!("'{}': {}", raw, e)))
}

pub fn pk_to_json(model: &ModelRef, pk: &Pk) -> Value {
    json!({
        "app": model.app,
        "model": model.model,
        "pk": pk.to_json(),
    })
}

pub fn pk_from_json(value: &Value) -> Result<PkOnlyModel> {
    let model = model_ref_from_json("PK", value)?;
    let pk = value
        .get("pk")
        .and_then(Pk::from_json)
        .ok_or_else(|| decode_error("PK", "missing or invalid 'pk'"))?;
    Ok(PkOnlyModel::new(model, pk))
}

pub fn pklist_to_json(model: &ModelRef, pks: &[Pk]) -> Value {
    json!({
        "app": model.app,
        "model": model.model,
        "pks": pks.iter().map(Pk::to_json).collect::<Vec<_>>(),
    })
}

pub fn pklist_from_json(value: &Value) -> Result<PkOnlyQueryset> {
    let model = model_ref_from_json("PKList", value)?;
    let raw = value
        .get("pks")
        .and_then(Value::as_array)
        .ok_or_else(|| decode_error("PKList", "missing 'pks' array"))?;
    let pks = raw
        .iter()
        .map(|v| Pk::from_json(v).ok_or_else(|| decode_error("PKList", format!("invalid pk {}", v))))
        .collect::<Result<Vec<_>>>()?;
    Ok(PkOnlyQueryset::new(model, pks))
}

/// Encode one field. Plain JSON values keep their key; typed values get a
/// `"key:TypeCode"` key.
pub fn field_to_json(key: &str, value: &FieldValue) -> Result<(String, Value)> {
    if key.contains(':') {
        return Err(CacheError::FieldKeyError {
            key: key.to_string(),
            reason: "field names cannot contain ':'".to_string(),
        });
    }

    let encoded = match value {
        FieldValue::Json(json) => return Ok((key.to_string(), json.clone())),
        FieldValue::Date(day) => date_to_json(*day),
        FieldValue::DateTime(dt) => dt.as_ref().map(datetime_to_json).unwrap_or(Value::Null),
        FieldValue::Pk(related) => pk_to_json(&related.model, &related.pk),
        FieldValue::PkList(related) => pklist_to_json(&related.model, &related.pks),
    };

    // field_type() is Some for every non-Json variant
    let code = value.field_type().map(|t| t.code()).unwrap_or_default();
    Ok((format!("{}:{}", key, code), encoded))
}

pub fn field_from_json(key_and_type: &str, value: &Value) -> Result<(String, FieldValue)> {
    let (key, code) = key_and_type
        .split_once(':')
        .ok_or_else(|| CacheError::FieldKeyError {
            key: key_and_type.to_string(),
            reason: "typed field keys look like 'name:TypeCode'".to_string(),
        })?;

    let decoded = match FieldType::from_code(code)? {
        FieldType::Date => FieldValue::Date(date_from_json(value)?),
        FieldType::DateTime => FieldValue::DateTime(datetime_from_json(value)?),
        FieldType::Pk => FieldValue::Pk(pk_from_json(value)?),
        FieldType::PkList => FieldValue::PkList(pklist_from_json(value)?),
    };
    Ok((key.to_string(), decoded))
}

/// Turn a cached native representation into decoded fields.
pub fn decode_native(native: Native) -> Result<CachedInstance> {
    let mut instance = CachedInstance::new();
    let mut typed = Vec::new();

    for (key, value) in native {
        if key.contains(':') {
            typed.push((key, value));
        } else {
            instance.insert(key, FieldValue::Json(value));
        }
    }

    for (key, value) in typed {
        let (name, decoded) = field_from_json(&key, &value)?;
        if instance.contains_key(&name) {
            return Err(CacheError::DuplicateField { field: name });
        }
        instance.insert(name, decoded);
    }

    Ok(instance)
}

/// Builds a native representation inside a handler's `serialize`.
///
/// Errors are deferred to [`NativeBuilder::build`] so calls can be chained.
#[derive(Debug, Default)]
pub struct NativeBuilder {
    native: Native,
    error: Option<CacheError>,
}

impl NativeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.native.insert(key.to_string(), value.into());
        self
    }

    pub fn field(mut self, key: &str, value: FieldValue) -> Self {
        match field_to_json(key, &value) {
            Ok((encoded_key, encoded)) => {
                self.native.insert(encoded_key, encoded);
            }
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    pub fn date(self, key: &str, day: Option<NaiveDate>) -> Self {
        self.field(key, FieldValue::Date(day))
    }

    pub fn datetime(self, key: &str, dt: DateTime<Utc>) -> Self {
        self.field(key, FieldValue::DateTime(Some(dt)))
    }

    pub fn pk(self, key: &str, model: ModelRef, pk: impl Into<Pk>) -> Self {
        self.field(key, FieldValue::Pk(PkOnlyModel::new(model, pk.into())))
    }

    pub fn pk_list(self, key: &str, model: ModelRef, pks: Vec<Pk>) -> Self {
        self.field(key, FieldValue::PkList(PkOnlyQueryset::new(model, pks)))
    }

    pub fn build(self) -> Result<Native> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.native),
        }
    }
}

fn model_ref_from_json(code: &str, value: &Value) -> Result<ModelRef> {
    let app = value.get("app").and_then(Value::as_str);
    let model = value.get("model").and_then(Value::as_str);
    match (app, model) {
        (Some(app), Some(model)) => Ok(ModelRef::new(app, model)),
        _ => Err(decode_error(code, "missing 'app' or 'model'")),
    }
}

fn decode_error(field: &str, reason: impl Into<String>) -> CacheError {
    CacheError::FieldDecodeError {
        field: field.to_string(),
        reason: reason.into(),
    }
}

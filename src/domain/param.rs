use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Deferred parameter value, evaluated each time a hit is built.
pub type Thunk = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("Parameter {key} could not be inserted in hit. Parameter will be ignored")]
    Unserializable { key: String },
}

/// Value of a parameter: either known at set time or computed at build time.
#[derive(Clone)]
pub enum ParamValue {
    Eager(String),
    Deferred(Thunk),
}

impl ParamValue {
    /// A panicking thunk evaluates to the empty string.
    pub fn evaluate(&self) -> String {
        match self {
            ParamValue::Eager(value) => value.clone(),
            ParamValue::Deferred(thunk) => catch_unwind(AssertUnwindSafe(|| thunk())).unwrap_or_else(|_| {
                warn!("Deferred parameter value panicked, sending it empty");
                String::new()
            }),
        }
    }
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Eager(value) => f.debug_tuple("Eager").field(value).finish(),
            ParamValue::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Double,
    Bool,
    Array,
    Json,
    Closure,
}

/// Override policy attached to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamOption {
    pub persistent: bool,
    pub append: bool,
    pub encode: bool,
    pub separator: char,
}

impl Default for ParamOption {
    fn default() -> Self {
        Self {
            persistent: false,
            append: false,
            encode: false,
            separator: ',',
        }
    }
}

impl ParamOption {
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn append(mut self) -> Self {
        self.append = true;
        self
    }

    pub fn encode(mut self) -> Self {
        self.encode = true;
        self
    }

    pub fn separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub key: String,
    pub value: ParamValue,
    pub kind: ParamKind,
    pub options: ParamOption,
}

impl Param {
    pub fn new(key: impl Into<String>, value: ParamValue, kind: ParamKind, options: ParamOption) -> Self {
        Self {
            key: key.into(),
            value,
            kind,
            options,
        }
    }

    pub fn eager(key: impl Into<String>, value: impl Into<String>, options: ParamOption) -> Self {
        Self::new(key, ParamValue::Eager(value.into()), ParamKind::String, options)
    }

    pub fn deferred<F>(key: impl Into<String>, thunk: F, options: ParamOption) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self::new(key, ParamValue::Deferred(Arc::new(thunk)), ParamKind::Closure, options)
    }

    pub fn is_persistent(&self) -> bool {
        self.options.persistent
    }
}

/// Typed input accepted by the parameter-set API.
#[derive(Clone)]
pub enum ParamInput {
    Str(String),
    Int(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Array(Vec<Value>),
    Json(Value),
    Closure(Thunk),
}

impl ParamInput {
    pub fn closure<F>(thunk: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        ParamInput::Closure(Arc::new(thunk))
    }

    /// Converts the input into a stored parameter.
    ///
    /// Strings holding a JSON object or array are tagged `Json`; arrays are
    /// joined with the option separator; non-finite floats and `null` are
    /// rejected.
    pub fn into_param(self, key: &str, options: ParamOption) -> Result<Param, ParamError> {
        let unserializable = || ParamError::Unserializable { key: key.to_string() };

        let (value, kind) = match self {
            ParamInput::Str(value) => {
                let kind = if looks_like_json(&value) {
                    ParamKind::Json
                } else {
                    ParamKind::String
                };
                (ParamValue::Eager(value), kind)
            }
            ParamInput::Int(value) => (ParamValue::Eager(value.to_string()), ParamKind::Integer),
            ParamInput::Float(value) => {
                if !value.is_finite() {
                    return Err(unserializable());
                }
                (ParamValue::Eager(value.to_string()), ParamKind::Float)
            }
            ParamInput::Double(value) => {
                if !value.is_finite() {
                    return Err(unserializable());
                }
                (ParamValue::Eager(value.to_string()), ParamKind::Double)
            }
            ParamInput::Bool(value) => (ParamValue::Eager(value.to_string()), ParamKind::Bool),
            ParamInput::Array(values) => {
                let separator = options.separator.to_string();
                let joined = values.iter().map(json_scalar).collect::<Vec<_>>().join(&separator);
                (ParamValue::Eager(joined), ParamKind::Array)
            }
            ParamInput::Json(value) => match value {
                Value::Null => return Err(unserializable()),
                Value::String(text) => return ParamInput::Str(text).into_param(key, options),
                Value::Bool(flag) => (ParamValue::Eager(flag.to_string()), ParamKind::Bool),
                Value::Number(number) => {
                    let kind = if number.is_f64() {
                        ParamKind::Double
                    } else {
                        ParamKind::Integer
                    };
                    (ParamValue::Eager(number.to_string()), kind)
                }
                other => {
                    let text = serde_json::to_string(&other).map_err(|_| unserializable())?;
                    (ParamValue::Eager(text), ParamKind::Json)
                }
            },
            ParamInput::Closure(thunk) => (ParamValue::Deferred(thunk), ParamKind::Closure),
        };

        Ok(Param::new(key, value, kind, options))
    }
}

fn looks_like_json(value: &str) -> bool {
    matches!(
        serde_json::from_str::<Value>(value),
        Ok(Value::Object(_) | Value::Array(_))
    )
}

fn json_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl fmt::Debug for ParamInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamInput::Str(v) => f.debug_tuple("Str").field(v).finish(),
            ParamInput::Int(v) => f.debug_tuple("Int").field(v).finish(),
            ParamInput::Float(v) => f.debug_tuple("Float").field(v).finish(),
            ParamInput::Double(v) => f.debug_tuple("Double").field(v).finish(),
            ParamInput::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            ParamInput::Array(v) => f.debug_tuple("Array").field(v).finish(),
            ParamInput::Json(v) => f.debug_tuple("Json").field(v).finish(),
            ParamInput::Closure(_) => f.write_str("Closure(..)"),
        }
    }
}

impl From<&str> for ParamInput {
    fn from(value: &str) -> Self {
        ParamInput::Str(value.to_string())
    }
}

impl From<String> for ParamInput {
    fn from(value: String) -> Self {
        ParamInput::Str(value)
    }
}

impl From<i32> for ParamInput {
    fn from(value: i32) -> Self {
        ParamInput::Int(value as i64)
    }
}

impl From<i64> for ParamInput {
    fn from(value: i64) -> Self {
        ParamInput::Int(value)
    }
}

impl From<u32> for ParamInput {
    fn from(value: u32) -> Self {
        ParamInput::Int(value as i64)
    }
}

impl From<f32> for ParamInput {
    fn from(value: f32) -> Self {
        ParamInput::Float(value)
    }
}

impl From<f64> for ParamInput {
    fn from(value: f64) -> Self {
        ParamInput::Double(value)
    }
}

impl From<bool> for ParamInput {
    fn from(value: bool) -> Self {
        ParamInput::Bool(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for ParamInput {
    fn from(values: Vec<T>) -> Self {
        ParamInput::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for ParamInput {
    fn from(value: Value) -> Self {
        ParamInput::Json(value)
    }
}

impl From<serde_json::Map<String, Value>> for ParamInput {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        ParamInput::Json(Value::Object(map))
    }
}

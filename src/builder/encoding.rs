use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::domain::{Param, ParamKind};

/// Percent-encodes a query value. Spaces become `%20`, not `+`.
pub fn percent_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// One `&key=value` segment of a hit query, possibly holding several
/// appended values.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub key: String,
    pub values: Vec<String>,
    pub separator: char,
    pub encode: bool,
    pub json_merge: bool,
}

impl Segment {
    fn from_param(param: &Param, value: String) -> Self {
        Self {
            key: param.key.clone(),
            values: vec![value],
            separator: param.options.separator,
            encode: param.options.encode,
            json_merge: param.options.append && param.kind == ParamKind::Json,
        }
    }

    pub fn render(&self) -> String {
        let value = if self.json_merge && self.values.len() > 1 {
            let merged = merge_json(&self.values);
            self.encoded(&merged)
        } else {
            let separator = self.separator.to_string();
            self.values
                .iter()
                .map(|value| self.encoded(value))
                .collect::<Vec<_>>()
                .join(&separator)
        };
        format!("&{}={}", self.key, value)
    }

    pub fn rendered_len(&self) -> usize {
        self.render().len()
    }

    /// Copy of this segment restricted to `values`.
    pub fn with_values(&self, values: Vec<String>) -> Self {
        Self {
            values,
            ..self.clone()
        }
    }

    fn encoded(&self, value: &str) -> String {
        if self.encode {
            percent_encode(value)
        } else {
            value.to_string()
        }
    }
}

/// Evaluates every parameter once and groups appended values under the
/// position of their key's first occurrence.
pub fn assemble(params: &[Param]) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::with_capacity(params.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for param in params {
        let value = param.value.evaluate();
        match positions.get(param.key.as_str()).copied() {
            Some(index) if param.options.append => {
                let segment = &mut segments[index];
                segment.json_merge &= param.kind == ParamKind::Json;
                segment.encode |= param.options.encode;
                segment.values.push(value);
            }
            Some(index) => segments[index] = Segment::from_param(param, value),
            None => {
                positions.insert(param.key.as_str(), segments.len());
                segments.push(Segment::from_param(param, value));
            }
        }
    }

    segments
}

/// Merges JSON objects left to right, recursing into nested objects.
/// Anything that is not an object is joined verbatim with `,`.
fn merge_json(values: &[String]) -> String {
    let mut merged = Map::new();
    for value in values {
        match serde_json::from_str::<Value>(value) {
            Ok(Value::Object(object)) => merge_into(&mut merged, object),
            _ => return values.join(","),
        }
    }
    Value::Object(merged).to_string()
}

fn merge_into(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) = (target.get_mut(&key), &value) {
            merge_into(existing, incoming.clone());
            continue;
        }
        target.insert(key, value);
    }
}

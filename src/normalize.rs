//! Response normalizer: turns raw model text into a fully-defaulted JSON value
//! shaped by a [`Schema`], then into a typed result.
//!
//! Tolerated deviations, tried in order:
//!   1. markdown code fences around the payload (with or without a language tag);
//!   2. the whole payload as one JSON object;
//!   3. one JSON object embedded in surrounding prose;
//!   4. a line-oriented fallback, when the schema declares one.
//!
//! Whatever path succeeds, every declared field is present in the output: lists
//! default to `[]`, numbers and text to the field's default. A bare scalar where
//! a list is expected becomes a one-element list.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub const PARSE_FAILURE_MESSAGE: &str = "Could not parse AI response";

/// Upper bound on `{` positions probed when looking for an embedded object.
const MAX_EMBEDDED_PROBES: usize = 64;

/// Nothing usable could be extracted. Carries the raw text for diagnostics only.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ParseFailure {
  pub raw: String,
  pub message: &'static str,
}

impl ParseFailure {
  pub fn new(raw: &str) -> Self {
    Self { raw: raw.to_string(), message: PARSE_FAILURE_MESSAGE }
  }
}

#[derive(Clone, Copy, Debug)]
pub enum FieldKind {
  /// Floating point; numeric strings such as `"12"` or `"12 hours"` are accepted.
  Number { default: f64 },
  /// Like `Number`, rounded to the nearest integer.
  Integer { default: i64 },
  Text { default: &'static str },
  StringList,
  /// One of `allowed`, matched case-insensitively; anything else maps to `default`.
  Choice { allowed: &'static [&'static str], default: &'static str },
  /// A list of nested records.
  Records(&'static Schema),
}

#[derive(Clone, Copy, Debug)]
pub struct Field {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub kind: FieldKind,
}

impl Field {
  pub const fn new(name: &'static str, aliases: &'static [&'static str], kind: FieldKind) -> Self {
    Self { name, aliases, kind }
  }

  fn keys(&self) -> impl Iterator<Item = &'static str> {
    let aliases: &'static [&'static str] = self.aliases;
    std::iter::once(self.name).chain(aliases.iter().copied())
  }

  fn is_present(&self, obj: &Map<String, Value>) -> bool {
    obj.keys().any(|k| self.keys().any(|w| same_key(k, w)))
  }

  /// First non-null value under the field name or one of its aliases, in that order.
  fn lookup<'a>(&self, obj: &'a Map<String, Value>) -> Option<&'a Value> {
    self.keys().find_map(|wanted| {
      obj
        .iter()
        .find(|(k, v)| same_key(k, wanted) && !v.is_null())
        .map(|(_, v)| v)
    })
  }
}

/// How to read a payload that is not JSON as a whole.
#[derive(Clone, Copy, Debug)]
pub enum LineFallback {
  None,
  /// Line *i* (blank lines skipped) fills the *i*-th named field.
  Positional(&'static [&'static str]),
  /// Every line is collected into the named list field.
  Collect(&'static str),
}

#[derive(Debug)]
pub struct Schema {
  pub name: &'static str,
  pub fields: &'static [Field],
  pub line_fallback: LineFallback,
}

impl Schema {
  pub fn field(&self, name: &str) -> Option<&Field> {
    self.fields.iter().find(|f| f.name == name)
  }

  fn declares_any(&self, obj: &Map<String, Value>) -> bool {
    self.fields.iter().any(|f| f.is_present(obj))
  }

  /// Whether `key` names a record-list field and `inner` reads as one of its records.
  fn holds_record(&self, key: &str, inner: &Map<String, Value>) -> bool {
    self.fields.iter().any(|f| match f.kind {
      FieldKind::Records(record) => f.keys().any(|w| same_key(key, w)) && record.declares_any(inner),
      _ => false,
    })
  }
}

/// Keys compare ignoring case and separators, so `totalHours`, `total_hours`
/// and `TotalHours` are the same key.
fn same_key(a: &str, b: &str) -> bool {
  let norm = |s: &str| -> Vec<char> {
    s.chars()
      .filter(|c| c.is_ascii_alphanumeric())
      .map(|c| c.to_ascii_lowercase())
      .collect()
  };
  norm(a) == norm(b)
}

/// Remove a leading fence line (```` ``` ```` plus optional language tag) and/or a
/// trailing fence, then trim.
pub fn strip_fences(raw: &str) -> &str {
  let mut text = raw.trim();
  if let Some(rest) = text.strip_prefix("```") {
    text = match rest.find('\n') {
      Some(nl) => &rest[nl + 1..],
      None => {
        let tag_end = rest
          .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
          .unwrap_or(rest.len());
        let after_tag = rest[tag_end..].trim_start();
        if after_tag.starts_with('{') || after_tag.starts_with('[') {
          after_tag
        } else {
          rest
        }
      }
    };
  }
  text = text.trim_end();
  if let Some(rest) = text.strip_suffix("```") {
    text = rest;
  }
  text.trim()
}

fn stringify(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// Normalize any JSON value to a list of strings: arrays element-wise, null to
/// empty, anything else to a single element.
pub fn to_string_list(value: &Value) -> Vec<String> {
  match value {
    Value::Null => Vec::new(),
    Value::Array(items) => items.iter().map(|v| stringify(v).trim().to_string()).collect(),
    other => vec![stringify(other).trim().to_string()],
  }
}

/// Parse one line as JSON; a line that is not JSON is kept as its trimmed text.
pub fn parse_line(line: &str) -> Vec<String> {
  let clean = strip_fences(line);
  match serde_json::from_str::<Value>(clean) {
    Ok(value) => to_string_list(&value),
    Err(_) => vec![clean.to_string()],
  }
}

/// The line-oriented reading of a payload: fences stripped, blank lines dropped,
/// each remaining line parsed with [`parse_line`].
pub fn parse_lines(text: &str) -> Vec<Vec<String>> {
  strip_fences(text)
    .lines()
    .filter(|line| !strip_fences(line).is_empty())
    .map(parse_line)
    .collect()
}

/// Normalize `raw` into a JSON object carrying every field of `schema`.
pub fn normalize(raw: &str, schema: &Schema) -> Result<Value, ParseFailure> {
  let text = strip_fences(raw);
  if text.is_empty() {
    return Err(ParseFailure::new(raw));
  }

  match serde_json::from_str::<Value>(text) {
    Ok(Value::Object(obj)) => {
      if let Some(found) = select_object(schema, &obj) {
        return Ok(map_object(schema, found));
      }
      debug!(target: "normalizer", schema = schema.name, "JSON object carries none of the expected keys");
    }
    Ok(Value::Array(items)) if items.iter().all(Value::is_object) && !items.is_empty() => {
      if let Some(field) = schema.fields.iter().find(|f| matches!(f.kind, FieldKind::Records(_))) {
        let mut obj = Map::new();
        obj.insert(field.name.to_string(), Value::Array(items));
        return Ok(map_object(schema, &obj));
      }
    }
    _ => {}
  }

  if let Some(obj) = embedded_object(text, schema) {
    debug!(target: "normalizer", schema = schema.name, "Recovered JSON object embedded in prose");
    return Ok(map_object(schema, &obj));
  }

  line_fallback(text, schema).ok_or_else(|| ParseFailure::new(raw))
}

/// Normalize and deserialize into the typed result for `schema`.
pub fn normalize_as<T: DeserializeOwned>(raw: &str, schema: &Schema) -> Result<T, ParseFailure> {
  let value = normalize(raw, schema)?;
  serde_json::from_value(value).map_err(|e| {
    warn!(target: "normalizer", schema = schema.name, error = %e, "Normalized value does not fit the result type");
    ParseFailure::new(raw)
  })
}

/// The single wrapped child (`{"quiz": {...}}`) when it declares an expected
/// key, else the object itself when it does. The child wins even if the wrapper
/// key is an alias, so `{"quiz": {"questions": [...]}}` reads the inner list,
/// unless the key names a record field that the child is a record of.
fn select_object<'a>(schema: &Schema, obj: &'a Map<String, Value>) -> Option<&'a Map<String, Value>> {
  if let (1, Some((key, Value::Object(inner)))) = (obj.len(), obj.iter().next()) {
    if schema.declares_any(inner) && !schema.holds_record(key, inner) {
      return Some(inner);
    }
  }
  schema.declares_any(obj).then_some(obj)
}

fn embedded_object(text: &str, schema: &Schema) -> Option<Map<String, Value>> {
  text
    .match_indices('{')
    .take(MAX_EMBEDDED_PROBES)
    .find_map(|(start, _)| {
      let end = balanced_end(&text[start..])?;
      match serde_json::from_str::<Value>(&text[start..start + end]) {
        Ok(Value::Object(obj)) => select_object(schema, &obj).cloned(),
        _ => None,
      }
    })
}

/// Byte length of the balanced `{...}` block at the start of `s`, skipping
/// braces inside string literals.
fn balanced_end(s: &str) -> Option<usize> {
  let mut depth = 0usize;
  let mut in_string = false;
  let mut escaped = false;
  for (i, c) in s.char_indices() {
    if in_string {
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == '"' {
        in_string = false;
      }
      continue;
    }
    match c {
      '"' => in_string = true,
      '{' => depth += 1,
      '}' => {
        depth = depth.checked_sub(1)?;
        if depth == 0 {
          return Some(i + 1);
        }
      }
      _ => {}
    }
  }
  None
}

fn line_fallback(text: &str, schema: &Schema) -> Option<Value> {
  let lines = parse_lines(text);
  let mut obj = Map::new();
  match schema.line_fallback {
    LineFallback::None => return None,
    LineFallback::Positional(names) => {
      for (name, values) in names.iter().zip(&lines) {
        let Some(field) = schema.field(name) else { continue };
        let value = match field.kind {
          FieldKind::StringList => Value::Array(values.iter().cloned().map(Value::String).collect()),
          _ => match values.first() {
            Some(first) => Value::String(first.clone()),
            None => continue,
          },
        };
        if recovers(&field.kind, &value) {
          obj.insert(field.name.to_string(), value);
        }
      }
    }
    LineFallback::Collect(name) => {
      let items: Vec<Value> = lines.into_iter().flatten().map(Value::String).collect();
      if !items.is_empty() {
        obj.insert(name.to_string(), Value::Array(items));
      }
    }
  }
  if obj.is_empty() {
    return None;
  }
  debug!(target: "normalizer", schema = schema.name, fields = obj.len(), "Line-oriented fallback used");
  Some(map_object(schema, &obj))
}

/// Whether a fallback value yields something other than the field default.
fn recovers(kind: &FieldKind, value: &Value) -> bool {
  match *kind {
    FieldKind::Number { .. } | FieldKind::Integer { .. } => number_from(value).is_some(),
    FieldKind::Text { .. } => !stringify(value).trim().is_empty(),
    FieldKind::StringList => !to_string_list(value).is_empty(),
    FieldKind::Choice { allowed, .. } => choice_from(allowed, value).is_some(),
    FieldKind::Records(_) => false,
  }
}

fn map_object(schema: &Schema, obj: &Map<String, Value>) -> Value {
  let mut out = Map::new();
  for field in schema.fields {
    out.insert(field.name.to_string(), coerce(&field.kind, field.lookup(obj)));
  }
  Value::Object(out)
}

fn coerce(kind: &FieldKind, value: Option<&Value>) -> Value {
  match *kind {
    FieldKind::Number { default } => {
      let n = value.and_then(number_from).unwrap_or(default);
      Number::from_f64(n).map(Value::Number).unwrap_or_else(|| Value::from(0))
    }
    FieldKind::Integer { default } => {
      let n = value.and_then(number_from).map(|n| n.round() as i64).unwrap_or(default);
      Value::from(n)
    }
    FieldKind::Text { default } => Value::String(value.and_then(text_from).unwrap_or_else(|| default.to_string())),
    FieldKind::StringList => {
      let items = value.map(to_string_list).unwrap_or_default();
      Value::Array(items.into_iter().map(Value::String).collect())
    }
    FieldKind::Choice { allowed, default } => {
      Value::String(value.and_then(|v| choice_from(allowed, v)).unwrap_or(default).to_string())
    }
    FieldKind::Records(schema) => records(schema, value),
  }
}

fn number_from(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => leading_number(s),
    _ => None,
  }
}

/// The numeric prefix of a string: `"12 hours"` is 12, `"about 12"` is nothing.
fn leading_number(s: &str) -> Option<f64> {
  let t = s.trim();
  let end = t
    .char_indices()
    .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
    .map(|(i, _)| i)
    .unwrap_or(t.len());
  t[..end].parse::<f64>().ok().filter(|n| n.is_finite())
}

fn text_from(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(s.trim().to_string()),
    Value::Array(_) => Some(to_string_list(value).join("\n")),
    other => Some(other.to_string()),
  }
}

fn choice_from(allowed: &'static [&'static str], value: &Value) -> Option<&'static str> {
  let s = match value {
    Value::String(s) => s.trim(),
    _ => return None,
  };
  allowed.iter().copied().find(|a| a.eq_ignore_ascii_case(s))
}

fn records(schema: &Schema, value: Option<&Value>) -> Value {
  let items: Vec<&Value> = match value {
    None | Some(Value::Null) => Vec::new(),
    Some(Value::Array(items)) => items.iter().collect(),
    Some(Value::Object(obj)) if !schema.declares_any(obj) => match wrapped_list(obj) {
      Some(items) => items.iter().collect(),
      None => Vec::new(),
    },
    Some(single) => vec![single],
  };
  Value::Array(items.into_iter().filter_map(|item| record(schema, item)).collect())
}

/// The list inside a one-key wrapper such as `{"questions": [...]}`.
fn wrapped_list(obj: &Map<String, Value>) -> Option<&Vec<Value>> {
  match (obj.len(), obj.values().next()) {
    (1, Some(Value::Array(items))) => Some(items),
    _ => None,
  }
}

/// One nested record. A bare scalar fills the record's first text field; an
/// object carrying none of the record's keys is dropped rather than defaulted.
fn record(schema: &Schema, item: &Value) -> Option<Value> {
  match item {
    Value::Null => None,
    Value::Object(obj) if !schema.declares_any(obj) => {
      debug!(target: "normalizer", schema = schema.name, "Dropped record without any expected key");
      None
    }
    Value::Object(obj) => Some(map_object(schema, obj)),
    scalar => {
      let mut obj = Map::new();
      if let Some(field) = schema.fields.iter().find(|f| matches!(f.kind, FieldKind::Text { .. })) {
        obj.insert(field.name.to_string(), Value::String(stringify(scalar)));
      }
      Some(map_object(schema, &obj))
    }
  }
}

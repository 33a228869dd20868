//! Streaming JSON input: a sequence of whitespace-separated JSON values
//! read one at a time from a file or stdin, JSON-Lines-friendly without
//! requiring newline delimiters. Object key order is preserved end to
//! end via serde_json's `preserve_order` feature.

use std::io::Read;

use log::warn;
use serde_json::Deserializer;

use crate::error::JqawkError;
use crate::value::{new_cell, Cell, ObjectValue, Value};

/// Reads one JSON value at a time from an underlying reader, tagging
/// decode failures with the file name they came from.
pub struct JsonReader<R: Read> {
    file: String,
    stream: serde_json::StreamDeserializer<'static, serde_json::de::IoRead<R>, serde_json::Value>,
}

/// Distinguishes "no more values" from an actual decode failure; callers
/// that just want the next record treat `Eof` as a normal loop exit
/// rather than folding it into `JqawkError`.
pub enum NextValue {
    Value(serde_json::Value),
    Eof,
}

impl<R: Read> JsonReader<R> {
    pub fn new(file: impl Into<String>, reader: R) -> Self {
        let stream = Deserializer::from_reader(reader).into_iter::<serde_json::Value>();
        Self {
            file: file.into(),
            stream,
        }
    }

    pub fn next(&mut self) -> Result<NextValue, JqawkError> {
        match self.stream.next() {
            None => Ok(NextValue::Eof),
            Some(Ok(value)) => Ok(NextValue::Value(value)),
            Some(Err(e)) => {
                warn!("JSON decode failure in '{}': {e}", self.file);
                Err(JqawkError::json(e.to_string(), self.file.clone()))
            }
        }
    }

    /// Reads every remaining value eagerly, used when a whole file's
    /// worth of records needs to be materialized up front (root-selector
    /// evaluation runs against the full array/stream of top-level values).
    pub fn read_all(mut self) -> Result<Vec<serde_json::Value>, JqawkError> {
        let mut values = vec![];
        loop {
            match self.next()? {
                NextValue::Value(value) => values.push(value),
                NextValue::Eof => break,
            }
        }
        Ok(values)
    }
}

/// Converts a decoded `serde_json::Value` into jqawk's own cell-based
/// value representation, allocating a fresh cell for every nested slot.
pub fn from_json(value: serde_json::Value) -> Cell {
    new_cell(match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(entries) => {
            let object: ObjectValue = entries
                .into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect();
            Value::Object(object)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_whitespace_separated_values() {
        let mut reader = JsonReader::new("<test>", "1 2 3".as_bytes());
        let mut seen = vec![];
        loop {
            match reader.next().unwrap() {
                NextValue::Value(v) => seen.push(v),
                NextValue::Eof => break,
            }
        }
        assert_eq!(seen, vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(3)]);
    }

    #[test]
    fn decode_error_is_tagged_with_filename() {
        let mut reader = JsonReader::new("input.json", "{ bad".as_bytes());
        match reader.next() {
            Err(JqawkError::Json { file, .. }) => assert_eq!(file, "input.json"),
            other => panic!("expected a Json error, got {other:?}"),
        }
    }

    #[test]
    fn preserves_object_key_order() {
        let mut reader = JsonReader::new("<test>", r#"{"b": 1, "a": 2}"#.as_bytes());
        let value = match reader.next().unwrap() {
            NextValue::Value(v) => v,
            NextValue::Eof => panic!("expected a value"),
        };
        let cell = from_json(value);
        match &*cell.borrow() {
            Value::Object(object) => {
                let keys: Vec<&String> = object.keys().collect();
                assert_eq!(keys, vec!["b", "a"]);
            }
            other => panic!("expected an object, got {other:?}"),
        }
    }
}

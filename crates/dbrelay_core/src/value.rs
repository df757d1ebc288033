use serde_json::Value as JsonValue;

/// Converts a JSON parameter value into a SQLite-bindable value.
///
/// The wire protocol carries every parameter as JSON (§4.1): objects and
/// arrays are not valid scalar bind values and are rejected rather than
/// silently stringified.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// Binary payloads cross the wire as base64 strings (§9 open question);
    /// this variant holds the already-decoded bytes.
    Blob(Vec<u8>),
}

#[derive(Debug, thiserror::Error)]
pub enum ValueConvertError {
    #[error("unsupported parameter type: {0}")]
    Unsupported(&'static str),
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}

impl SqlValue {
    pub fn from_json(value: &JsonValue) -> Result<Self, ValueConvertError> {
        match value {
            JsonValue::Null => Ok(SqlValue::Null),
            JsonValue::Bool(b) => Ok(SqlValue::Integer(*b as i64)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(SqlValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(SqlValue::Real(f))
                } else {
                    Err(ValueConvertError::Unsupported("number"))
                }
            }
            JsonValue::String(s) => Ok(SqlValue::Text(s.clone())),
            JsonValue::Array(_) => Err(ValueConvertError::Unsupported("array")),
            JsonValue::Object(obj) => {
                // `{"$base64": "..."}` is the sole accepted binary encoding.
                if let Some(JsonValue::String(b64)) = obj.get("$base64") {
                    let bytes = base64_decode(b64)
                        .map_err(|e| ValueConvertError::InvalidBase64(e.to_string()))?;
                    Ok(SqlValue::Blob(bytes))
                } else {
                    Err(ValueConvertError::Unsupported("object"))
                }
            }
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Integer(i) => JsonValue::from(*i),
            SqlValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            SqlValue::Text(s) => JsonValue::String(s.clone()),
            SqlValue::Blob(b) => {
                let mut obj = serde_json::Map::new();
                obj.insert(
                    "$base64".to_string(),
                    JsonValue::String(base64_encode(b)),
                );
                JsonValue::Object(obj)
            }
        }
    }
}

impl rusqlite::types::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value as RValue};
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(RValue::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(RValue::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(RValue::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Owned(RValue::Text(s.clone())),
            SqlValue::Blob(b) => ToSqlOutput::Owned(RValue::Blob(b.clone())),
        })
    }
}

pub fn rusqlite_value_to_json(value: rusqlite::types::ValueRef<'_>) -> JsonValue {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(t) => JsonValue::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => {
            let mut obj = serde_json::Map::new();
            obj.insert("$base64".to_string(), JsonValue::String(base64_encode(b)));
            JsonValue::Object(obj)
        }
    }
}

// Small self-contained base64 codec (standard alphabet, padded) so the
// wire layer doesn't need an extra dependency for this one conversion.
const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let b = [
            chunk[0],
            *chunk.get(1).unwrap_or(&0),
            *chunk.get(2).unwrap_or(&0),
        ];
        let n = ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | (b[2] as u32);
        out.push(ALPHABET[((n >> 18) & 0x3f) as usize] as char);
        out.push(ALPHABET[((n >> 12) & 0x3f) as usize] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[((n >> 6) & 0x3f) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[(n & 0x3f) as usize] as char
        } else {
            '='
        });
    }
    out
}

fn base64_decode(input: &str) -> Result<Vec<u8>, &'static str> {
    fn val(c: u8) -> Result<u8, &'static str> {
        match c {
            b'A'..=b'Z' => Ok(c - b'A'),
            b'a'..=b'z' => Ok(c - b'a' + 26),
            b'0'..=b'9' => Ok(c - b'0' + 52),
            b'+' => Ok(62),
            b'/' => Ok(63),
            _ => Err("invalid base64 character"),
        }
    }
    let input = input.trim_end_matches('=');
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 3 / 4 + 3);
    for chunk in bytes.chunks(4) {
        let mut n: u32 = 0;
        for (i, &c) in chunk.iter().enumerate() {
            n |= (val(c)? as u32) << (18 - i * 6);
        }
        out.push((n >> 16) as u8);
        if chunk.len() > 2 {
            out.push((n >> 8) as u8);
        }
        if chunk.len() > 3 {
            out.push(n as u8);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_text_and_blob() {
        let text = SqlValue::from_json(&JsonValue::String("hi".into())).unwrap();
        assert_eq!(text.to_json(), JsonValue::String("hi".into()));

        let encoded = base64_encode(b"\x00\x01\xff");
        let json = serde_json::json!({ "$base64": encoded });
        let blob = SqlValue::from_json(&json).unwrap();
        assert_eq!(blob, SqlValue::Blob(vec![0, 1, 255]));
    }

    #[test]
    fn rejects_bare_array_and_object() {
        assert!(SqlValue::from_json(&serde_json::json!([1, 2])).is_err());
        assert!(SqlValue::from_json(&serde_json::json!({"a": 1})).is_err());
    }
}

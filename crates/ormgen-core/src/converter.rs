//! Converter contract.
//!
//! A converter maps a domain value to its physical column representation and
//! back. Declarations reference converters by name; the registry resolves
//! the name once at analysis time and rejects converters that cannot be
//! applied in both directions with matching types.

use crate::error::{ConversionError, ConversionErrorKind, Error, Result, SchemaError, SchemaErrorKind};
use crate::types::SqlType;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;

/// A single conversion direction.
pub type ConvertFn = fn(&Value) -> Result<Value>;

/// Domain → physical.
#[derive(Clone)]
pub struct Encoder {
    pub domain: SqlType,
    pub physical: SqlType,
    pub f: ConvertFn,
}

/// Physical → domain.
#[derive(Clone)]
pub struct Decoder {
    pub physical: SqlType,
    pub domain: SqlType,
    pub f: ConvertFn,
}

/// A converter as registered: either direction may be missing, which the
/// registry reports when the converter is referenced.
#[derive(Clone)]
pub struct ConverterDef {
    pub name: String,
    pub encode: Option<Encoder>,
    pub decode: Option<Decoder>,
}

impl ConverterDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encode: None,
            decode: None,
        }
    }

    pub fn encode(mut self, domain: SqlType, physical: SqlType, f: ConvertFn) -> Self {
        self.encode = Some(Encoder { domain, physical, f });
        self
    }

    pub fn decode(mut self, physical: SqlType, domain: SqlType, f: ConvertFn) -> Self {
        self.decode = Some(Decoder { physical, domain, f });
        self
    }

    /// Check both directions exist and agree on types.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<Converter> {
        let asymmetric = |message: String| -> Error {
            ConversionError::new(ConversionErrorKind::AsymmetricConverter, message).into()
        };
        match (&self.encode, &self.decode) {
            (None, None) => Err(asymmetric(format!(
                "converter '{}' defines neither encode nor decode",
                self.name
            ))),
            (Some(_), None) => Err(asymmetric(format!(
                "converter '{}' defines encode without decode",
                self.name
            ))),
            (None, Some(_)) => Err(asymmetric(format!(
                "converter '{}' defines decode without encode",
                self.name
            ))),
            (Some(enc), Some(dec)) => {
                if enc.domain != dec.domain || enc.physical != dec.physical {
                    return Err(asymmetric(format!(
                        "converter '{}' encodes {} -> {} but decodes {} -> {}",
                        self.name,
                        enc.domain.sql_name(),
                        enc.physical.sql_name(),
                        dec.physical.sql_name(),
                        dec.domain.sql_name()
                    )));
                }
                Ok(Converter {
                    name: self.name.clone(),
                    domain: enc.domain.clone(),
                    physical: enc.physical.clone(),
                    encode: enc.f,
                    decode: dec.f,
                })
            }
        }
    }
}

impl fmt::Debug for ConverterDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterDef")
            .field("name", &self.name)
            .field("encode", &self.encode.as_ref().map(|e| (&e.domain, &e.physical)))
            .field("decode", &self.decode.as_ref().map(|d| (&d.physical, &d.domain)))
            .finish()
    }
}

/// A validated, symmetric converter.
#[derive(Clone)]
pub struct Converter {
    name: String,
    domain: SqlType,
    physical: SqlType,
    encode: ConvertFn,
    decode: ConvertFn,
}

impl Converter {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The domain type fields declare.
    pub fn domain_type(&self) -> &SqlType {
        &self.domain
    }

    /// The column type the schema uses.
    pub fn physical_type(&self) -> &SqlType {
        &self.physical
    }

    /// Encode a domain value for writing. NULL passes through untouched.
    #[allow(clippy::result_large_err)]
    pub fn encode(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        (self.encode)(value).map_err(|e| {
            ConversionError::new(
                ConversionErrorKind::EncodeFailed,
                format!("converter '{}': {}", self.name, e),
            )
            .into()
        })
    }

    /// Decode a column value after reading. NULL passes through untouched.
    #[allow(clippy::result_large_err)]
    pub fn decode(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        (self.decode)(value).map_err(|e| {
            ConversionError::new(
                ConversionErrorKind::DecodeFailed,
                format!("converter '{}': {}", self.name, e),
            )
            .into()
        })
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("physical", &self.physical)
            .finish_non_exhaustive()
    }
}

/// Named converters available to declarations.
#[derive(Debug, Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, ConverterDef>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `uuid_text` and `json_text`.
    pub fn with_builtins() -> Self {
        Self::new()
            .with(
                ConverterDef::new("uuid_text")
                    .encode(SqlType::Uuid, SqlType::Text, uuid_to_text)
                    .decode(SqlType::Text, SqlType::Uuid, text_to_uuid),
            )
            .with(
                ConverterDef::new("json_text")
                    .encode(SqlType::Json, SqlType::Text, json_to_text)
                    .decode(SqlType::Text, SqlType::Json, text_to_json),
            )
    }

    /// Register a converter, replacing any previous one with the same name.
    pub fn register(&mut self, def: ConverterDef) {
        self.converters.insert(def.name.clone(), def);
    }

    pub fn with(mut self, def: ConverterDef) -> Self {
        self.register(def);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }

    /// Resolve and validate a converter by name.
    #[allow(clippy::result_large_err)]
    pub fn resolve(&self, name: &str) -> Result<Converter> {
        self.converters
            .get(name)
            .ok_or_else(|| {
                Error::from(SchemaError::new(
                    SchemaErrorKind::UnknownConverter,
                    format!("no converter named '{name}' is registered"),
                ))
            })?
            .validate()
    }
}

fn uuid_to_text(value: &Value) -> Result<Value> {
    match value {
        Value::Uuid(bytes) => {
            let mut out = String::with_capacity(36);
            for (i, b) in bytes.iter().enumerate() {
                if matches!(i, 4 | 6 | 8 | 10) {
                    out.push('-');
                }
                out.push_str(&format!("{b:02x}"));
            }
            Ok(Value::Text(out))
        }
        other => Err(Error::Custom(format!("expected UUID, found {}", other.type_name()))),
    }
}

fn text_to_uuid(value: &Value) -> Result<Value> {
    let text = value
        .as_str()
        .ok_or_else(|| Error::Custom(format!("expected TEXT, found {}", value.type_name())))?;
    let hex: String = text.chars().filter(|c| *c != '-').collect();
    if hex.len() != 32 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::Custom(format!("'{text}' is not a UUID")));
    }
    let mut bytes = [0u8; 16];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| Error::Custom(format!("'{text}' is not a UUID")))?;
    }
    Ok(Value::Uuid(bytes))
}

fn json_to_text(value: &Value) -> Result<Value> {
    match value {
        Value::Json(json) => Ok(Value::Text(json.to_string())),
        other => Err(Error::Custom(format!("expected JSON, found {}", other.type_name()))),
    }
}

fn text_to_json(value: &Value) -> Result<Value> {
    serde_json::Value::try_from(value.clone()).map(Value::Json)
}

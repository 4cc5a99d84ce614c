//! Parsing captured strings into typed values.
//!
//! Path parameters, query values and form fields all arrive as strings; the
//! [`FromParam`] trait gives handlers one uniform way to coerce them into
//! scalars or comma-separated lists. The same rules back the serde
//! deserializer used for binding form bodies into structs.

use serde::de::{self, value::SeqDeserializer, IntoDeserializer, Visitor};
use thiserror::Error;

/// Coercion failures. Each message carries the offending input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoerceError {
    #[error("invalid integer '{0}'")]
    InvalidInt(String),
    #[error("invalid float '{0}'")]
    InvalidFloat(String),
    #[error("invalid boolean '{0}'")]
    InvalidBool(String),
    #[error("unsupported target type")]
    UnsupportedType,
}

/// Types that can be parsed from a single captured string.
///
/// Numeric parses are base 10 at the exact target width, so overflow fails
/// rather than wrapping. Booleans accept `true`/`false`/`1`/`0`/`t`/`f`,
/// case-insensitively. `Vec<T>` splits the input on commas and parses each
/// element.
pub trait FromParam: Sized {
    fn from_param(s: &str) -> Result<Self, CoerceError>;
}

macro_rules! int_from_param {
    ($($t:ty),* $(,)?) => {
        $(
            impl FromParam for $t {
                fn from_param(s: &str) -> Result<Self, CoerceError> {
                    s.parse().map_err(|_| CoerceError::InvalidInt(s.to_string()))
                }
            }
        )*
    };
}

int_from_param!(i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! float_from_param {
    ($($t:ty),* $(,)?) => {
        $(
            impl FromParam for $t {
                fn from_param(s: &str) -> Result<Self, CoerceError> {
                    s.parse().map_err(|_| CoerceError::InvalidFloat(s.to_string()))
                }
            }
        )*
    };
}

float_from_param!(f32, f64);

impl FromParam for bool {
    fn from_param(s: &str) -> Result<Self, CoerceError> {
        if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("t") || s == "1" {
            Ok(true)
        } else if s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("f") || s == "0" {
            Ok(false)
        } else {
            Err(CoerceError::InvalidBool(s.to_string()))
        }
    }
}

impl FromParam for String {
    fn from_param(s: &str) -> Result<Self, CoerceError> {
        Ok(s.to_string())
    }
}

impl<T: FromParam> FromParam for Vec<T> {
    fn from_param(s: &str) -> Result<Self, CoerceError> {
        if s.is_empty() {
            return Ok(Vec::new());
        }
        s.split(',').map(T::from_param).collect()
    }
}

/// Error type for the form-binding deserializer.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BindError(String);

impl de::Error for BindError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        BindError(msg.to_string())
    }
}

/// Serde deserializer over the string values of one form field.
///
/// Scalars parse through [`FromParam`]; sequences come from repeated fields,
/// or from splitting a single value on commas. Targets outside the coercion
/// table (maps, nested structs, raw bytes) are rejected.
pub struct ValueDeserializer<'de> {
    values: &'de [String],
}

impl<'de> ValueDeserializer<'de> {
    pub fn new(values: &'de [String]) -> Self {
        Self { values }
    }

    fn first(&self) -> &'de str {
        self.values.first().map(String::as_str).unwrap_or("")
    }

    fn parse<T: FromParam>(&self) -> Result<T, BindError> {
        T::from_param(self.first()).map_err(|e| BindError(e.to_string()))
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident: $t:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
                visitor.$visit(self.parse::<$t>()?)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for ValueDeserializer<'de> {
    type Error = BindError;

    deserialize_parsed! {
        deserialize_bool => visit_bool: bool,
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_str(self.first())
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_str(self.first())
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_string(self.first().to_string())
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_str(self.first())
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        if self.values.is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        if self.values.len() > 1 {
            let seq = self
                .values
                .iter()
                .map(|v| StrDeserializer { value: v.as_str() });
            de::Deserializer::deserialize_seq(SeqDeserializer::new(seq), visitor)
        } else {
            // single value: comma-separated list
            let items: Vec<_> = self
                .first()
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|v| StrDeserializer { value: v })
                .collect();
            de::Deserializer::deserialize_seq(SeqDeserializer::new(items.into_iter()), visitor)
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_unit()
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, BindError> {
        Err(BindError(CoerceError::UnsupportedType.to_string()))
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, BindError> {
        Err(BindError(CoerceError::UnsupportedType.to_string()))
    }

    fn deserialize_map<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, BindError> {
        Err(BindError(CoerceError::UnsupportedType.to_string()))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, BindError> {
        Err(BindError(CoerceError::UnsupportedType.to_string()))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BindError> {
        visitor.visit_enum(self.first().into_deserializer())
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_str(self.first())
    }
}

impl<'de> IntoDeserializer<'de, BindError> for ValueDeserializer<'de> {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

/// Element deserializer for sequence items: the same scalar rules over a
/// single borrowed string.
struct StrDeserializer<'de> {
    value: &'de str,
}

impl<'de> de::Deserializer<'de> for StrDeserializer<'de> {
    type Error = BindError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_str(self.value)
    }

    serde::forward_to_deserialize_any! {
        char str string bytes byte_buf option unit unit_struct
        newtype_struct seq tuple tuple_struct map struct enum identifier
        ignored_any
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_bool(bool::from_param(self.value).map_err(|e| BindError(e.to_string()))?)
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_i8(i8::from_param(self.value).map_err(|e| BindError(e.to_string()))?)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_i16(i16::from_param(self.value).map_err(|e| BindError(e.to_string()))?)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_i32(i32::from_param(self.value).map_err(|e| BindError(e.to_string()))?)
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_i64(i64::from_param(self.value).map_err(|e| BindError(e.to_string()))?)
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_u8(u8::from_param(self.value).map_err(|e| BindError(e.to_string()))?)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_u16(u16::from_param(self.value).map_err(|e| BindError(e.to_string()))?)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_u32(u32::from_param(self.value).map_err(|e| BindError(e.to_string()))?)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_u64(u64::from_param(self.value).map_err(|e| BindError(e.to_string()))?)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_f32(f32::from_param(self.value).map_err(|e| BindError(e.to_string()))?)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_f64(f64::from_param(self.value).map_err(|e| BindError(e.to_string()))?)
    }
}

impl<'de> IntoDeserializer<'de, BindError> for StrDeserializer<'de> {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

//! Forma estructural (llave-valor) y serialización textual.
//!
//! El mapeo estructural es un [`Value`] de `serde_json` con mapas que
//! preservan el orden de inserción, de modo que los campos aparecen en
//! el mismo orden en que fueron declarados. La forma textual es el JSON
//! de ese mismo valor.

use crate::error::{Result, XdrError};

pub use serde_json::{Map, Value};

/// Conversión hacia y desde la forma estructural.
pub trait Structural: Sized {
    /// Construye el mapeo estructural del valor.
    fn to_structural(&self) -> Value;

    /// Reconstruye un valor a partir de su mapeo estructural.
    fn from_structural(value: &Value) -> Result<Self>;

    /// Serializa a texto JSON.
    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_structural())?)
    }

    /// Deserializa desde texto JSON.
    fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_structural(&value)
    }
}

/// Construye un error de forma inesperada.
pub fn mismatch(expected: &'static str, found: &Value) -> XdrError {
    XdrError::Structural {
        expected,
        found: found.to_string(),
    }
}

/// Obtiene el mapa de un valor compuesto.
pub fn object<'v>(value: &'v Value, expected: &'static str) -> Result<&'v Map<String, Value>> {
    value.as_object().ok_or_else(|| mismatch(expected, value))
}

/// Extrae un campo. Los campos ausentes toman su valor por defecto.
pub fn field<T>(map: &Map<String, Value>, key: &str) -> Result<T>
where
    T: Structural + Default,
{
    match map.get(key) {
        None => Ok(T::default()),
        Some(value) => T::from_structural(value),
    }
}

/// Extrae el brazo de una unión, el cual solo existe si la llave está presente.
pub fn arm<T: Structural>(map: &Map<String, Value>, key: &str) -> Result<Option<T>> {
    map.get(key).map(T::from_structural).transpose()
}

macro_rules! signed {
    ($($type:ty),*) => {$(
        impl Structural for $type {
            fn to_structural(&self) -> Value {
                Value::from(*self)
            }

            fn from_structural(value: &Value) -> Result<Self> {
                value
                    .as_i64()
                    .and_then(|integer| <$type>::try_from(integer).ok())
                    .ok_or_else(|| mismatch(stringify!($type), value))
            }
        }
    )*};
}

macro_rules! unsigned {
    ($($type:ty),*) => {$(
        impl Structural for $type {
            fn to_structural(&self) -> Value {
                Value::from(*self)
            }

            fn from_structural(value: &Value) -> Result<Self> {
                value
                    .as_u64()
                    .and_then(|integer| <$type>::try_from(integer).ok())
                    .ok_or_else(|| mismatch(stringify!($type), value))
            }
        }
    )*};
}

signed!(i32, i64);
unsigned!(u8, u32, u64);

impl Structural for f64 {
    fn to_structural(&self) -> Value {
        Value::from(*self)
    }

    fn from_structural(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl Structural for f32 {
    fn to_structural(&self) -> Value {
        Value::from(f64::from(*self))
    }

    fn from_structural(value: &Value) -> Result<Self> {
        value
            .as_f64()
            .map(|float| float as f32)
            .ok_or_else(|| mismatch("f32", value))
    }
}

impl Structural for bool {
    fn to_structural(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_structural(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl Structural for String {
    fn to_structural(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_structural(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| mismatch("string", value))
    }
}

impl Structural for () {
    fn to_structural(&self) -> Value {
        Value::Null
    }

    fn from_structural(_value: &Value) -> Result<Self> {
        Ok(())
    }
}

impl<T: Structural> Structural for Vec<T> {
    fn to_structural(&self) -> Value {
        Value::Array(self.iter().map(Structural::to_structural).collect())
    }

    fn from_structural(value: &Value) -> Result<Self> {
        value
            .as_array()
            .ok_or_else(|| mismatch("array", value))?
            .iter()
            .map(T::from_structural)
            .collect()
    }
}

impl<T: Structural> Structural for Option<T> {
    fn to_structural(&self) -> Value {
        match self {
            None => Value::Null,
            Some(value) => value.to_structural(),
        }
    }

    fn from_structural(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            value => T::from_structural(value).map(Some),
        }
    }
}

impl<T: Structural> Structural for Box<T> {
    fn to_structural(&self) -> Value {
        self.as_ref().to_structural()
    }

    fn from_structural(value: &Value) -> Result<Self> {
        T::from_structural(value).map(Box::new)
    }
}

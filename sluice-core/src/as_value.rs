use crate::{Error, Result, Value};
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use std::any;
use time::{Date, PrimitiveDateTime};
use uuid::Uuid;

/// Conversion between native Rust types and the dynamically typed [`Value`].
///
/// It is used in both directions: binding query parameters (`as_value`) and decoding the
/// columns of a row (`try_from_value`).
///
/// # Error semantics
/// - Integer narrowing is range checked, the error names both the value and the target type.
/// - A NULL decodes only into `Option<T>`, every other target reports an error.
///
/// # Examples
/// ```rust
/// use sluice_core::{AsValue, Value};
/// let v = 42i32.as_value();
/// assert!(matches!(v, Value::Int32(Some(42))));
/// let n: i64 = AsValue::try_from_value(v).unwrap();
/// assert_eq!(n, 42);
/// ```
pub trait AsValue {
    /// The NULL value carrying the type of `Self`.
    fn as_empty_value() -> Value;
    /// Convert this value into its owned [`Value`] representation.
    fn as_value(self) -> Value;
    /// Attempt to convert a dynamic [`Value`] into `Self`.
    fn try_from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
}

impl<T: AsValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.as_value()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(Some(value.into()))
    }
}

fn mismatch<T>(value: &Value) -> Error {
    Error::msg(format!(
        "Cannot convert {value:?} to {}",
        any::type_name::<T>(),
    ))
}

macro_rules! impl_as_value_integer {
    ($source:ty, $destination:path) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self as _))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                let wide: i64 = match value {
                    Value::Int32(Some(v)) => v as i64,
                    Value::Int64(Some(v)) => v,
                    Value::Decimal(Some(v)) if v.fract().is_zero() => match v.to_i64() {
                        Some(v) => v,
                        None => return Err(mismatch::<Self>(&value)),
                    },
                    _ => return Err(mismatch::<Self>(&value)),
                };
                <$source>::try_from(wide).map_err(|_| {
                    Error::msg(format!(
                        "Value {wide} is out of range for {}",
                        any::type_name::<Self>(),
                    ))
                })
            }
        }
    };
}

impl_as_value_integer!(i8, Value::Int32);
impl_as_value_integer!(i16, Value::Int32);
impl_as_value_integer!(i32, Value::Int32);
impl_as_value_integer!(i64, Value::Int64);
impl_as_value_integer!(u8, Value::Int32);
impl_as_value_integer!(u16, Value::Int32);
impl_as_value_integer!(u32, Value::Int64);

impl AsValue for bool {
    fn as_empty_value() -> Value {
        Value::Boolean(None)
    }
    fn as_value(self) -> Value {
        Value::Boolean(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(Some(v)) => Ok(v),
            Value::Int32(Some(v @ (0 | 1))) => Ok(v == 1),
            Value::Int64(Some(v @ (0 | 1))) => Ok(v == 1),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for f64 {
    fn as_empty_value() -> Value {
        Value::Float64(None)
    }
    fn as_value(self) -> Value {
        Value::Float64(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float64(Some(v)) => Ok(v),
            Value::Int32(Some(v)) => Ok(v as f64),
            Value::Int64(Some(v)) => Ok(v as f64),
            Value::Decimal(Some(v)) => v.to_f64().ok_or_else(|| mismatch::<Self>(&value)),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for f32 {
    fn as_empty_value() -> Value {
        Value::Float64(None)
    }
    fn as_value(self) -> Value {
        Value::Float64(Some(self as f64))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        f64::try_from_value(value).map(|v| v as f32)
    }
}

impl AsValue for Decimal {
    fn as_empty_value() -> Value {
        Value::Decimal(None)
    }
    fn as_value(self) -> Value {
        Value::Decimal(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(Some(v)) => Ok(v),
            Value::Int32(Some(v)) => Ok(Decimal::from(v)),
            Value::Int64(Some(v)) => Ok(Decimal::from(v)),
            Value::Float64(Some(v)) => {
                Decimal::from_f64(v).ok_or_else(|| mismatch::<Self>(&value))
            }
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for String {
    fn as_empty_value() -> Value {
        Value::Varchar(None)
    }
    fn as_value(self) -> Value {
        Value::Varchar(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Varchar(Some(v)) => Ok(v),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for Box<[u8]> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(Some(v)) => Ok(v),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for Vec<u8> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self.into_boxed_slice()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Box::<[u8]>::try_from_value(value).map(Into::into)
    }
}

impl AsValue for Date {
    fn as_empty_value() -> Value {
        Value::Date(None)
    }
    fn as_value(self) -> Value {
        Value::Date(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(Some(v)) => Ok(v),
            Value::Timestamp(Some(v)) => Ok(v.date()),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for PrimitiveDateTime {
    fn as_empty_value() -> Value {
        Value::Timestamp(None)
    }
    fn as_value(self) -> Value {
        Value::Timestamp(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(Some(v)) => Ok(v),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for Uuid {
    fn as_empty_value() -> Value {
        Value::Uuid(None)
    }
    fn as_value(self) -> Value {
        Value::Uuid(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(Some(v)) => Ok(v),
            Value::Varchar(Some(ref v)) => {
                Uuid::parse_str(v).map_err(|e| Error::new(e).context(mismatch::<Self>(&value)))
            }
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl<T: AsValue> AsValue for Option<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::as_empty_value(),
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::try_from_value(value).map(Some)
        }
    }
}

//! Typed constants and statement operands

use std::fmt;

use crate::types::{CastOp, DataType};

/// A typed scalar constant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
}

impl Scalar {
    /// The zero of `ty`
    ///
    /// This is what a return of an unbound name produces.
    #[must_use]
    pub const fn zero(ty: DataType) -> Scalar {
        match ty {
            DataType::Int32 => Scalar::Int32(0),
            DataType::Int64 => Scalar::Int64(0),
            DataType::Float32 => Scalar::Float32(0.0),
            DataType::Float64 => Scalar::Float64(0.0),
        }
    }

    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Scalar::Int32(_) => DataType::Int32,
            Scalar::Int64(_) => DataType::Int64,
            Scalar::Float32(_) => DataType::Float32,
            Scalar::Float64(_) => DataType::Float64,
        }
    }

    /// Rebuild a scalar from the first `ty.size()` bytes of `bytes`, native order
    ///
    /// Returns `None` if `bytes` is too short.
    #[must_use]
    pub fn from_ne_bytes(ty: DataType, bytes: &[u8]) -> Option<Scalar> {
        let raw = bytes.get(..ty.size())?;
        let scalar = match ty {
            DataType::Int32 => Scalar::Int32(i32::from_ne_bytes(raw.try_into().ok()?)),
            DataType::Int64 => Scalar::Int64(i64::from_ne_bytes(raw.try_into().ok()?)),
            DataType::Float32 => Scalar::Float32(f32::from_ne_bytes(raw.try_into().ok()?)),
            DataType::Float64 => Scalar::Float64(f64::from_ne_bytes(raw.try_into().ok()?)),
        };
        Some(scalar)
    }

    /// Native-order bytes, exactly `data_type().size()` long
    #[must_use]
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        match self {
            Scalar::Int32(v) => v.to_ne_bytes().to_vec(),
            Scalar::Int64(v) => v.to_ne_bytes().to_vec(),
            Scalar::Float32(v) => v.to_ne_bytes().to_vec(),
            Scalar::Float64(v) => v.to_ne_bytes().to_vec(),
        }
    }

    /// Convert to `to` with the same rules compiled code uses
    ///
    /// Float to integer saturates at the target's bounds and maps NaN to zero,
    /// matching the saturating conversion the code generator emits.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn cast(self, to: DataType) -> Scalar {
        match CastOp::select(self.data_type(), to) {
            CastOp::Identity => self,
            CastOp::Truncate => match self {
                Scalar::Int64(v) => Scalar::Int32(v as i32),
                other => other,
            },
            CastOp::SignExtend => match self {
                Scalar::Int32(v) => Scalar::Int64(i64::from(v)),
                other => other,
            },
            CastOp::SignedToFloat => {
                let v = match self {
                    Scalar::Int32(v) => i64::from(v),
                    Scalar::Int64(v) => v,
                    other => return other,
                };
                if to == DataType::Float32 {
                    Scalar::Float32(v as f32)
                } else {
                    Scalar::Float64(v as f64)
                }
            }
            CastOp::FloatDemote => match self {
                Scalar::Float64(v) => Scalar::Float32(v as f32),
                other => other,
            },
            CastOp::FloatPromote => match self {
                Scalar::Float32(v) => Scalar::Float64(f64::from(v)),
                other => other,
            },
            CastOp::FloatToSigned => {
                let v = match self {
                    Scalar::Float32(v) => f64::from(v),
                    Scalar::Float64(v) => v,
                    other => return other,
                };
                if to == DataType::Int32 {
                    Scalar::Int32(v as i32)
                } else {
                    Scalar::Int64(v as i64)
                }
            }
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int32(v) => write!(f, "{v}i32"),
            Scalar::Int64(v) => write!(f, "{v}i64"),
            Scalar::Float32(v) => write!(f, "{v}f32"),
            Scalar::Float64(v) => write!(f, "{v}f64"),
        }
    }
}

/// Operand of an assignment: a constant or a reference to a variable
#[derive(Debug, Clone, PartialEq)]
pub enum OperationValue {
    Constant(Scalar),
    Variable(String),
}

impl OperationValue {
    #[must_use]
    pub fn variable(name: impl Into<String>) -> Self {
        OperationValue::Variable(name.into())
    }

    #[must_use]
    pub const fn constant(value: Scalar) -> Self {
        OperationValue::Constant(value)
    }

    /// Name of the referenced variable, if this is a variable operand
    #[must_use]
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            OperationValue::Variable(name) => Some(name),
            OperationValue::Constant(_) => None,
        }
    }
}

impl From<Scalar> for OperationValue {
    fn from(value: Scalar) -> Self {
        OperationValue::Constant(value)
    }
}

impl fmt::Display for OperationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationValue::Constant(value) => write!(f, "{value}"),
            OperationValue::Variable(name) => f.write_str(name),
        }
    }
}

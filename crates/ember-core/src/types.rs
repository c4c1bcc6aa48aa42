//! Data types and the promotion/cast lattice
//!
//! Every value the engine handles carries exactly one [`DataType`]. This module
//! defines the four types, their byte widths, how a binary operation picks its
//! result type, and which conversion takes a value from one type to another.

use std::fmt;

use cranelift_codegen::ir::{types, Type as ClifType};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// The closed set of scalar types
///
/// Discriminants are the wire tags used by the export surface.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int32 = 1,
    Int64 = 2,
    Float32 = 3,
    Float64 = 4,
}

impl DataType {
    /// All types, in tag order
    pub const ALL: [DataType; 4] = [
        DataType::Int32,
        DataType::Int64,
        DataType::Float32,
        DataType::Float64,
    ];

    /// Width in bytes, used for storage and for packed buffers
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            DataType::Int32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::Float64 => 8,
        }
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64)
    }

    #[must_use]
    pub const fn is_floating(self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Result type of a binary operation over `a` and `b`
    ///
    /// The wider of the two widths, floating if either side is floating.
    #[must_use]
    pub const fn promote(a: DataType, b: DataType) -> DataType {
        let wide = a.size() == 8 || b.size() == 8;
        let floating = a.is_floating() || b.is_floating();
        match (wide, floating) {
            (false, false) => DataType::Int32,
            (true, false) => DataType::Int64,
            (false, true) => DataType::Float32,
            (true, true) => DataType::Float64,
        }
    }

    /// Cranelift IR type holding values of this type
    #[must_use]
    pub const fn clif_type(self) -> ClifType {
        match self {
            DataType::Int32 => types::I32,
            DataType::Int64 => types::I64,
            DataType::Float32 => types::F32,
            DataType::Float64 => types::F64,
        }
    }

    /// Wire tag of this type
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for DataType {
    type Error = EngineError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(DataType::Int32),
            2 => Ok(DataType::Int64),
            3 => Ok(DataType::Float32),
            4 => Ok(DataType::Float64),
            other => Err(EngineError::InvalidDataType(other)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
        };
        f.write_str(name)
    }
}

/// The conversion that takes a value of one type to another
///
/// Chosen purely from the two types, never from the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Identity,
    /// Integer narrowing, keeps the low bits
    Truncate,
    /// Integer widening
    SignExtend,
    /// Signed integer to floating point
    SignedToFloat,
    /// Float64 to Float32
    FloatDemote,
    /// Float32 to Float64
    FloatPromote,
    /// Floating point to signed integer, truncating toward zero and saturating
    FloatToSigned,
}

impl CastOp {
    /// Select the conversion from `from` to `to`
    #[must_use]
    pub const fn select(from: DataType, to: DataType) -> CastOp {
        use DataType::{Float32, Float64, Int32, Int64};
        match (from, to) {
            (Int32, Int32) | (Int64, Int64) | (Float32, Float32) | (Float64, Float64) => {
                CastOp::Identity
            }
            (Int64, Int32) => CastOp::Truncate,
            (Int32, Int64) => CastOp::SignExtend,
            (Int32 | Int64, Float32 | Float64) => CastOp::SignedToFloat,
            (Float64, Float32) => CastOp::FloatDemote,
            (Float32, Float64) => CastOp::FloatPromote,
            (Float32 | Float64, Int32 | Int64) => CastOp::FloatToSigned,
        }
    }
}

/// Arithmetic operation of an operation assignment
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add = 1,
    Sub = 2,
    Mul = 3,
    Div = 4,
}

impl TryFrom<u8> for Operation {
    type Error = EngineError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Operation::Add),
            2 => Ok(Operation::Sub),
            3 => Ok(Operation::Mul),
            4 => Ok(Operation::Div),
            other => Err(EngineError::InvalidOperation(other)),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operation::Add => "+",
            Operation::Sub => "-",
            Operation::Mul => "*",
            Operation::Div => "/",
        };
        f.write_str(symbol)
    }
}

/// One formal parameter of a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub ty: DataType,
    pub name: String,
}

impl Argument {
    #[must_use]
    pub fn new(ty: DataType, name: impl Into<String>) -> Self {
        Self {
            ty,
            name: name.into(),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.name)
    }
}

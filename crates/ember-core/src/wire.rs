//! Byte-buffer formats shared with the host caller
//!
//! Operand buffer layout:
//!
//! ```text
//! constant: [1][type tag][payload, size(type) bytes, native order]
//! variable: [0][pad     ][name bytes...][0]
//! ```
//!
//! Argument and result buffers are the values' native-order bytes concatenated
//! positionally, with no padding or alignment.

use std::collections::HashSet;

use crate::error::{EngineError, EngineResult};
use crate::types::{Argument, DataType};
use crate::value::{OperationValue, Scalar};

/// Variant tag of a variable operand
pub const OPERAND_VARIABLE: u8 = 0;

/// Variant tag of a constant operand
pub const OPERAND_CONSTANT: u8 = 1;

/// Offset of the payload (constant bytes or variable name) in an operand buffer
pub const OPERAND_PAYLOAD_OFFSET: usize = 2;

/// Decode one operand buffer
///
/// A variable name runs to the first NUL, or to the end of the buffer if
/// there is none.
pub fn decode_operand(buffer: &[u8]) -> EngineResult<OperationValue> {
    let (&tag, _) = buffer
        .split_first()
        .ok_or_else(|| EngineError::InvalidOperand("empty buffer".to_string()))?;
    match tag {
        OPERAND_CONSTANT => {
            let type_tag = *buffer
                .get(1)
                .ok_or_else(|| EngineError::InvalidOperand("missing type tag".to_string()))?;
            let ty = DataType::try_from(type_tag)?;
            let payload = buffer.get(OPERAND_PAYLOAD_OFFSET..).unwrap_or_default();
            let value = Scalar::from_ne_bytes(ty, payload).ok_or_else(|| {
                EngineError::InvalidOperand(format!(
                    "{ty} constant needs {} bytes, got {}",
                    ty.size(),
                    payload.len()
                ))
            })?;
            Ok(OperationValue::Constant(value))
        }
        OPERAND_VARIABLE => {
            let payload = buffer.get(OPERAND_PAYLOAD_OFFSET..).unwrap_or_default();
            let end = payload.iter().position(|b| *b == 0).unwrap_or(payload.len());
            let name = std::str::from_utf8(&payload[..end])
                .map_err(|e| EngineError::InvalidOperand(format!("variable name: {e}")))?;
            if name.is_empty() {
                return Err(EngineError::InvalidOperand("empty variable name".to_string()));
            }
            Ok(OperationValue::Variable(name.to_string()))
        }
        other => Err(EngineError::InvalidOperand(format!("unknown variant tag {other}"))),
    }
}

/// Encode an operand in the layout [`decode_operand`] reads
#[must_use]
pub fn encode_operand(value: &OperationValue) -> Vec<u8> {
    match value {
        OperationValue::Constant(scalar) => {
            let mut buffer = vec![OPERAND_CONSTANT, scalar.data_type().tag()];
            buffer.extend(scalar.to_ne_bytes());
            buffer
        }
        OperationValue::Variable(name) => {
            let mut buffer = vec![OPERAND_VARIABLE, 0];
            buffer.extend_from_slice(name.as_bytes());
            buffer.push(0);
            buffer
        }
    }
}

/// Split a comma-separated argument name list, skipping empty segments
#[must_use]
pub fn split_argument_names(names: &str) -> Vec<&str> {
    names.split(',').filter(|name| !name.is_empty()).collect()
}

/// Build the formal parameter list from type tags and a comma-separated name list
pub fn decode_arguments(
    function: &str,
    type_tags: &[u8],
    names: &str,
) -> EngineResult<Vec<Argument>> {
    let names = split_argument_names(names);
    if names.len() != type_tags.len() {
        return Err(EngineError::ArgumentMismatch {
            expected: type_tags.len(),
            got: names.len(),
        });
    }

    let mut seen = HashSet::new();
    type_tags
        .iter()
        .zip(names)
        .map(|(&tag, name)| {
            if !seen.insert(name) {
                return Err(EngineError::DuplicateArgument {
                    function: function.to_string(),
                    argument: name.to_string(),
                });
            }
            Ok(Argument::new(DataType::try_from(tag)?, name))
        })
        .collect()
}

/// Total packed size of a sequence of types
#[must_use]
pub fn packed_size(types: &[DataType]) -> usize {
    types.iter().map(|ty| ty.size()).sum()
}

/// Pack scalars positionally with no padding
#[must_use]
pub fn pack_scalars(values: &[Scalar]) -> Vec<u8> {
    values.iter().flat_map(Scalar::to_ne_bytes).collect()
}

/// Read one scalar of type `ty` from the front of a packed buffer
pub fn unpack_scalar(ty: DataType, buffer: &[u8]) -> EngineResult<Scalar> {
    Scalar::from_ne_bytes(ty, buffer).ok_or(EngineError::BufferSize {
        expected: ty.size(),
        got: buffer.len(),
    })
}

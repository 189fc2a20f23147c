// Operation request decoding
// Turns a raw body into typed operands, or the first validation error hit

use serde_json::{Map, Value};

use super::error::CalcError;

/// One numeric operand as it arrived on the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operand {
    pub value: f64,
    /// Whether the JSON literal was an integer (`5`, not `5.0`)
    pub integral: bool,
}

impl Operand {
    fn from_json(value: &Value) -> Result<Self, CalcError> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .map(|value| Self {
                    value,
                    integral: n.is_i64() || n.is_u64(),
                })
                .ok_or(CalcError::NonNumericField),
            _ => Err(CalcError::NonNumericField),
        }
    }
}

/// Validated `{a, b}` request body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationRequest {
    pub a: Operand,
    pub b: Operand,
}

impl OperationRequest {
    /// Decode and validate a request body.
    ///
    /// Checks run in a fixed order: body shape, field presence, field types.
    /// Unknown fields are ignored.
    pub fn decode(body: &[u8]) -> Result<Self, CalcError> {
        let fields: Map<String, Value> =
            serde_json::from_slice(body).map_err(|_| CalcError::MalformedBody)?;

        let (Some(a), Some(b)) = (fields.get("a"), fields.get("b")) else {
            return Err(CalcError::MissingField);
        };

        Ok(Self {
            a: Operand::from_json(a)?,
            b: Operand::from_json(b)?,
        })
    }

    pub const fn integral_operands(&self) -> bool {
        self.a.integral && self.b.integral
    }
}

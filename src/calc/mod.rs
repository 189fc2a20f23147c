//! Arithmetic domain
//!
//! Pure request handling: decode the body, validate operands, compute and
//! shape the result. Nothing here touches I/O.

mod error;
mod operation;
mod request;
mod types;

pub use error::CalcError;
pub use operation::Operation;
pub use types::{ErrorResponse, OperationResult, StatusResponse};

use request::OperationRequest;
use serde_json::Number;

/// Largest magnitude at which every integer is exactly representable in `f64`
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Handle one operation request body
pub fn evaluate(op: Operation, body: &[u8]) -> Result<OperationResult, CalcError> {
    let request = OperationRequest::decode(body)?;
    let value = op.apply(request.a.value, request.b.value)?;

    Ok(OperationResult {
        operation: op.name(),
        result: render_number(value, request.integral_operands() && op != Operation::Divide)?,
    })
}

/// Render a finite result as a JSON number.
///
/// Integer operands keep an integer result unless the value is fractional or
/// beyond the exactly representable range; division always yields a float.
#[allow(clippy::cast_possible_truncation)]
fn render_number(value: f64, keep_integer: bool) -> Result<Number, CalcError> {
    if keep_integer && value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER {
        return Ok(Number::from(value as i64));
    }
    Number::from_f64(value).ok_or(CalcError::NonFiniteResult)
}

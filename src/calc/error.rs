// Calculation error module
// Every variant is a client error and maps to HTTP 400

use hyper::StatusCode;
use thiserror::Error;

/// Errors produced while decoding or evaluating an operation request
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcError {
    /// Body is empty, not JSON, or not a JSON object
    #[error("Invalid request body")]
    MalformedBody,

    /// `a` or `b` is absent
    #[error("Fields 'a' and 'b' are required")]
    MissingField,

    /// `a` or `b` is present but not a JSON number
    #[error("Fields 'a' and 'b' must be numbers")]
    NonNumericField,

    #[error("Division by zero is not allowed")]
    DivisionByZero,

    /// Result overflowed to infinity or became NaN
    #[error("Result is not a finite number")]
    NonFiniteResult,
}

impl CalcError {
    pub const fn status(self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

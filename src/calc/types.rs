// Wire types for the arithmetic API

use serde::Serialize;
use serde_json::Number;

use super::operation::Operation;

/// Successful operation response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub operation: &'static str,
    pub result: Number,
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Body of `GET /`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub message2: &'static str,
    pub status: &'static str,
    pub version: &'static str,
    pub features: Vec<&'static str>,
}

impl StatusResponse {
    pub fn current() -> Self {
        Self {
            message2: "DevSecOps Lab API - CI/CD Pipeline",
            status: "success",
            version: "1.0",
            features: Operation::ALL.iter().map(|op| op.name()).collect(),
        }
    }
}

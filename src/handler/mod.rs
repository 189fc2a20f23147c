//! Request handler module
//!
//! Route dispatch for the status endpoint and the arithmetic operations.

pub mod router;

// Re-export main entry point
pub use router::handle_request;

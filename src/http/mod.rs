//! HTTP protocol layer module
//!
//! JSON response builders, decoupled from the arithmetic routes.

pub mod response;

pub use response::{
    build_404_response, build_405_response, build_413_response, build_500_response,
    build_options_response, error_response, json_response, strip_body,
};

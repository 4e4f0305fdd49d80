//! Canonical Search Schemas
//!
//! The request, result and response shapes shared by every adapter and by the
//! aggregation core. All structs use `serde(rename_all = "camelCase")` so the
//! JSON matches what the Wygrzeb frontend consumes.

pub mod common;
pub mod request;
pub mod response;
pub mod search_result;

pub use common::*;
pub use request::*;
pub use response::*;
pub use search_result::*;

//! Ready-made pipeline steps for common leaf behavior.
//!
//! | Builder | Role | Behavior |
//! |---------|------|----------|
//! | [`not_found_pre`], [`not_found_post`] | pre / post | 404 unless answered or done |
//! | [`general_error`] | error | log, 500 if nothing sent, end the stream |
//! | [`json_pre`] | pre | parse a JSON request body into `body` / `rawBody` |
//! | [`validate_pre`] | pre | run a [`Validator`], answer and mark done on failure |
//! | [`file_pre`], [`file_post`] | pre / post | serve static files for `GET` |

mod file;
mod general_error;
mod json;
mod not_found;
mod validate;

pub use file::{FileServer, content_type_for, file_post, file_pre};
pub use general_error::{general_error, terminate_with_server_error};
pub use json::{BODY_KEY, RAW_BODY_KEY, json_pre, read_json_body};
pub use not_found::{not_found_post, not_found_pre};
pub use validate::{ValidationResult, Validator, validate_pre, validate_pre_with_status};

// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Codec calls go through `run_with_panic_policy` so that a panic inside a
// codec binding becomes an ordinary task error instead of unwinding
// through the execution context.

use crate::error::{ConvertError, Result};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Unified Result type for engine stages.
pub type EngineResult<T> = Result<T>;

/// Run `f`, converting a panic into `ConvertError::InternalPanic`.
///
/// `label` names the codec call site (e.g. `"decode:mozjpeg"`) and ends up
/// in the error message.
pub fn run_with_panic_policy<T, F>(label: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(label, %message, "codec panicked");
            Err(ConvertError::internal_panic(format!(
                "{label}: panicked: {message}"
            )))
        }
    }
}

/// Best-effort string out of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

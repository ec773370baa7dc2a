//! Error types for the RunFFT planner.
//!
//! Every fallible planner operation returns a single [`FftError`]; the
//! detailed reason is additionally recorded in a thread-local diagnostic
//! string so embedders that only see a status code can still retrieve it.

use std::cell::RefCell;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FftError {
    /// The descriptor violates a layout, stride or placement invariant.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No viable radix factorization exists under the kernel budgets.
    #[error("no supported factorization for length {0}")]
    UnsupportedLength(usize),

    /// Source generation succeeded but the toolchain rejected it.
    #[error("kernel compilation failed: {0}")]
    CompileFailure(String),

    /// The code-object cache could not be opened or is corrupt.
    #[error("code object cache unavailable: {0}")]
    CacheUnavailable(String),

    /// The accelerator harness reported an error during execution.
    #[error("device failure: {0}")]
    DeviceFailure(String),
}

/// C-compatible status codes mirroring [`FftError`].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftStatus {
    Success = 0,
    InvalidConfig = 1,
    UnsupportedLength = 2,
    CompileFailure = 3,
    CacheUnavailable = 4,
    DeviceFailure = 5,
}

thread_local! {
    static LAST_DIAGNOSTIC: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Record a diagnostic message for the current thread.
pub fn set_last_diagnostic(msg: &str) {
    LAST_DIAGNOSTIC.with(|d| {
        let mut d = d.borrow_mut();
        d.clear();
        d.push_str(msg);
    });
}

/// The diagnostic recorded by the most recent failure on this thread.
pub fn last_diagnostic() -> String {
    LAST_DIAGNOSTIC.with(|d| d.borrow().clone())
}

impl FftError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        set_last_diagnostic(&msg);
        FftError::InvalidConfig(msg)
    }

    pub fn unsupported_length(length: usize) -> Self {
        set_last_diagnostic(&format!("no supported factorization for length {length}"));
        FftError::UnsupportedLength(length)
    }

    pub fn compile_failure(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        set_last_diagnostic(&msg);
        FftError::CompileFailure(msg)
    }

    pub fn cache_unavailable(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        set_last_diagnostic(&msg);
        FftError::CacheUnavailable(msg)
    }

    pub fn device_failure(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        set_last_diagnostic(&msg);
        FftError::DeviceFailure(msg)
    }

    pub fn status(&self) -> FftStatus {
        match self {
            FftError::InvalidConfig(_) => FftStatus::InvalidConfig,
            FftError::UnsupportedLength(_) => FftStatus::UnsupportedLength,
            FftError::CompileFailure(_) => FftStatus::CompileFailure,
            FftError::CacheUnavailable(_) => FftStatus::CacheUnavailable,
            FftError::DeviceFailure(_) => FftStatus::DeviceFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_tracks_latest_failure() {
        let err = FftError::invalid_config("istride mismatch");
        assert_eq!(err.status(), FftStatus::InvalidConfig);
        assert_eq!(last_diagnostic(), "istride mismatch");
        let _ = FftError::unsupported_length(34);
        assert!(last_diagnostic().contains("34"));
    }

    #[test]
    fn cache_unavailable_carries_status_and_diagnostic() {
        let err = FftError::cache_unavailable("checksum mismatch");
        assert_eq!(err.status(), FftStatus::CacheUnavailable);
        assert_eq!(last_diagnostic(), "checksum mismatch");
    }
}

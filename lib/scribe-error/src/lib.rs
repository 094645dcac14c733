//! Shared error primitives.
//!
//! Library crates describe their failure modes with typed `snafu` enums. Anything that only needs to be reported, and
//! never matched on, flows through [`GenericError`] instead.

use std::fmt::Display;

/// An opaque, reportable error.
///
/// Used at boundaries where the caller cannot act on the specific failure: building a transport, loading TLS roots,
/// initializing logging, and so on.
pub type GenericError = anyhow::Error;

/// Constructs a [`GenericError`].
///
/// Accepts a string literal, a format string with arguments (in the same order as `std::format!`), or a value that
/// implements `Debug` and `Display`. When given an existing `std::error::Error`, its source chain is preserved.
#[macro_export]
macro_rules! generic_error {
    ($msg:literal $(,)?) => { $crate::_anyhow!($msg) };
    ($err:expr $(,)?) => { $crate::_anyhow!($err) };
    ($fmt:expr, $($arg:tt)*) => { $crate::_anyhow!($fmt, $($arg)*) };
}

#[doc(hidden)]
pub use anyhow::anyhow as _anyhow;

pub(crate) mod private {
    pub trait Sealed {}

    impl<T, E> Sealed for Result<T, E> {}
}

// Wraps `anyhow::Context` so the extension methods don't collide with `snafu::ResultExt::context` when both traits are
// in scope.
pub trait ErrorContext<T, E>: private::Sealed {
    /// Wraps the error value with additional context.
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static;

    /// Wraps the error value with additional context, evaluated only if an error occurred.
    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T, E> for Result<T, E>
where
    Result<T, E>: anyhow::Context<T, E>,
{
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
    {
        <Self as anyhow::Context<T, E>>::context(self, context)
    }

    fn with_error_context<C, F>(self, context: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        <Self as anyhow::Context<T, E>>::with_context(self, context)
    }
}

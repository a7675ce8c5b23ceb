//! Utility macros shared by the message, uri and codec modules.

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
/// It's used for validation checks that must fail before any state is touched.
///
/// # Example
///
/// ```ignore
/// ensure!((100..=599).contains(&code), MessageError::InvalidStatusCode { code });
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

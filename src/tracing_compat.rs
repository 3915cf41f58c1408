//! Logging facade over `tracing`.
//!
//! With the `tracing-integration` feature enabled these are the `tracing`
//! macros. Without it they expand to nothing, so call sites never need their
//! own `cfg` gates. Functions that bind values only to log them carry
//! `#[cfg_attr(not(feature = "tracing-integration"), allow(unused_variables))]`.

#[cfg(feature = "tracing-integration")]
pub(crate) use tracing::{debug, error, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    macro_rules! trace {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! debug {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! warn {
        ($($arg:tt)*) => {{}};
    }
    macro_rules! error {
        ($($arg:tt)*) => {{}};
    }

    pub(crate) use debug;
    pub(crate) use error;
    pub(crate) use trace;
    pub(crate) use warn;
}

#[cfg(not(feature = "tracing-integration"))]
pub(crate) use noop::{debug, error, trace, warn};

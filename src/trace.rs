//! Thin wrappers around the `log` facade.
//!
//! Kept as local macros (rather than calling `log::trace!` etc. directly)
//! so every call site stays free of the `target:` boilerplate and so the
//! whole crate can be re-targeted to a different logger without touching
//! call sites.

#![allow(unused_macros)]

macro_rules! trace {
    ($($arg:tt)*) => {
        log::trace!(target: "vortex_http", $($arg)*)
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        log::debug!(target: "vortex_http", $($arg)*)
    };
}

macro_rules! warn {
    ($($arg:tt)*) => {
        log::warn!(target: "vortex_http", $($arg)*)
    };
}

macro_rules! error {
    ($($arg:tt)*) => {
        log::error!(target: "vortex_http", $($arg)*)
    };
}

//! Logging macros for the client core.
//!
//! Call sites format eagerly and hand the message to `tracing`, so binaries
//! decide filtering and output through their subscriber.

pub fn log_info_impl(msg: &str) {
    tracing::info!(target: "docbridge_client", "{}", msg);
}

pub fn log_error_impl(msg: &str) {
    tracing::error!(target: "docbridge_client", "{}", msg);
}

pub fn log_warn_impl(msg: &str) {
    tracing::warn!(target: "docbridge_client", "{}", msg);
}

pub fn log_debug_impl(msg: &str) {
    tracing::debug!(target: "docbridge_client", "{}", msg);
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_info_impl(&format!($($arg)*))
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_error_impl(&format!($($arg)*))
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log_warn_impl(&format!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_debug_impl(&format!($($arg)*))
    };
}

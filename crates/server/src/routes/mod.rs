//! API route handlers.

pub mod discovery;
pub mod documents;
pub mod session;

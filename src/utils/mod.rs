//! Utility modules: developer log sink, logger setup, JSON conversion.
pub mod devlog;
pub mod json;
pub mod logger;

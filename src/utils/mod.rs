//! Small shared helpers

pub mod logging;

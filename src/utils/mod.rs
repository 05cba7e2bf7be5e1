//! Small helpers shared across the crate: developer trace capture and numeric conversions.
pub mod devlog;
pub mod num;

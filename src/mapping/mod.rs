//! Display names for raw values stored with each session.

pub mod countries;
pub mod dc_names;
pub mod map_names;

pub use countries::country_name;
pub use dc_names::{dc_display_name, parse_dc_name};
pub use map_names::{all_display_names, map_display_name};

/// Placeholder for missing or unparseable values
pub const UNKNOWN: &str = "Unknown";

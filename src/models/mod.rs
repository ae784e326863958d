//! Data models for the drone catalog.

mod drone;
mod filters;
mod permission;

pub use drone::*;
pub use filters::*;
pub use permission::*;

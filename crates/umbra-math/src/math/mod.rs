//! Core math modules.

pub mod color;
pub mod confidence;
pub mod stable;

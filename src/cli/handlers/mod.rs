//! CLI command handlers.

pub mod corpus;
pub mod model;
pub mod score;

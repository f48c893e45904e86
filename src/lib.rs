pub mod artifact;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod inference;
pub mod init;
pub mod labels;

pub use error::TextClassError;
pub use labels::{LabelOrder, LabelTable};

pub mod entity;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod query;

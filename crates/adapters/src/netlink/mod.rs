pub mod codec;
pub mod event_reader;
pub mod query_source;
pub mod socket;

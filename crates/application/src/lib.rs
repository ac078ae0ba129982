#![forbid(unsafe_code)]

pub mod conntrack_query_service_impl;
pub mod conntrack_watcher;

pub mod conntrack_query_port;
pub mod metrics_port;
pub mod observation_sink;

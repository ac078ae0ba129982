pub mod log_observation_sink;

#![forbid(unsafe_code)]

pub mod conntrack;

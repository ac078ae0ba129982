#![deny(unsafe_code)]

pub mod http;
pub mod netlink;
pub mod sink;

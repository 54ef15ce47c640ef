#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]

pub mod provider;
pub mod sse;

pub use provider::{UpstreamConfig, UpstreamProvider};

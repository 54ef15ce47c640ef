#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]

pub mod config;
pub mod domain;
pub mod ports;

// Re-export commonly used types for convenience
pub use config::{ConfigError, ServerConfig};
pub use domain::{
    ChatMessage, ChatParams, ChatRole, GatewayStatus, ModelDescriptor, ModelSelector, Stats,
};
pub use ports::{FragmentStream, ModelProviderPort, ProviderAvailability, ProviderError};

//! Domain types shared across the workspace.
//!
//! These are provider-agnostic: wire formats (OpenAI shapes, SSE framing)
//! live in the adapter crates and are mapped to these types at the edges.

pub mod chat;
pub mod status;

pub use chat::{ChatMessage, ChatParams, ChatRole, ModelDescriptor, ModelSelector};
pub use status::{GatewayStatus, Stats};

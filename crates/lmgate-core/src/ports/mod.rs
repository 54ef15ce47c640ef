//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the gateway expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No HTTP client or server types in any signature
//! - Traits are object-safe so adapters swap behind `Arc<dyn ...>`
//! - Streaming is expressed as boxed fragment streams, not callbacks

pub mod model_provider;

pub use model_provider::{
    FragmentStream, ModelProviderPort, ProviderAvailability, ProviderError,
};

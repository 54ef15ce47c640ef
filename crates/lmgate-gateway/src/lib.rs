#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]

pub mod admission;
pub mod api;
pub mod lifecycle;
pub mod metrics;
pub mod notify;
pub mod readiness;
pub mod server;

pub use admission::{AdmissionController, AdmissionError, AdmissionToken};
pub use lifecycle::{Gateway, GatewayError};
pub use metrics::{MetricsAggregator, RequestOutcome};
pub use notify::{StatusNotifier, StatusSubscription};
pub use readiness::{NotReadyReason, ReadinessGate};

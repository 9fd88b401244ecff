//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces that the application layer uses
//! to interact with the host. Implementations live in `adapters`.

mod probe;
mod resolver;
mod signal;

pub use probe::PortProbe;
pub use resolver::{IntrospectionBackend, OwnerResolverPort};
pub use signal::SignalSender;

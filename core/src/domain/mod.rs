//! Domain layer - Pure data models for port acquisition.
//!
//! These types have no I/O dependencies and can be tested in isolation.

mod attempt;
mod outcome;
mod port;
mod process;

// Re-export all domain types
pub use attempt::{AttemptLog, Delivery, Privilege, ReclamationAttempt, SignalKind};
pub use outcome::{
    AcquisitionOutcome, AcquisitionResult, AcquisitionState, ReclaimStatus, UnresolvedReason,
};
pub use port::PortSpec;
pub use process::{Discovery, Owners, ProcessHandle};

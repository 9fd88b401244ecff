//! Application layer - Use case services.
//!
//! These services orchestrate domain logic over the port traits:
//! - [`Reclaimer`] escalates signals against a busy port's owners
//! - [`PortAcquirer`] runs the acquisition state machine on top of it
//!
//! Both accept domain types, reach the host only through `crate::ports`,
//! and return domain types.

mod acquirer;
mod reclaimer;

pub use acquirer::{AcquisitionPlan, PortAcquirer};
pub use reclaimer::{
    ReclaimPolicy, ReclaimReport, Reclaimer, DEFAULT_FORCE_WAIT, DEFAULT_GRACE_WAIT,
};

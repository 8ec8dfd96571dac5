//! Terminal Farm Types - Core types for container reconciliation
//!
//! Terminal Farm keeps a fleet of containerized trading terminals in line with
//! the desired state published by a control plane. This crate holds the data
//! model shared by the reconciler and its collaborators; it performs no I/O.
//!
//! ## Key Concepts
//!
//! - **DesiredRecord**: One terminal as declared by the control plane
//! - **InstanceName**: Runtime name derived from a record id
//! - **ManagedSet**: Observed instances carrying the ownership label
//! - **LaunchSpec**: Parameters for creating a new instance
//! - **Action**: A corrective runtime operation
//! - **CycleReport**: What one reconciliation cycle did

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod action;
pub mod instance;
pub mod launch;
pub mod record;

// Re-export main types
pub use action::{Action, ActionKind, ActionOutcome, ActionResult, CycleReport};
pub use instance::{
    InstanceName, ManagedSet, NamingScheme, ObservedInstance, OwnershipLabel, RuntimeState,
    DEFAULT_NAME_PREFIX,
};
pub use launch::{LaunchSpec, RestartPolicy};
pub use record::{DesiredRecord, DesiredStatus, Environment, RecordError};

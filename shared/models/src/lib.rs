//! # Tix Core Domain Models
//!
//! Domain types shared by the case workflow service and the ESB integration
//! workers.
//!
//! ## Key Models
//!
//! - **Case**: a work-order/ticket tracked through a workflow
//! - **WorkflowNode**: one step of a workflow graph, carrying an action code and SLA
//! - **CaseCurrentStage**: the case's pointer to its active workflow node
//! - **CaseSummaryBucket**: per org/date/hour/group/geography dashboard counters
//! - **GroupType**: display bucket aggregating several case types
//! - **SyncQueueEntry**: pending outbound synchronization to the ESB
//! - **WorkOrderMessage** / **WorkOrderRequest**: ESB wire payloads

pub mod case;
pub mod workflow;
pub mod summary;
pub mod sync;
pub mod notification;
pub mod work_order;
pub mod directory;

#[cfg(test)]
pub mod property_tests;

pub use case::*;
pub use workflow::*;
pub use summary::*;
pub use sync::*;
pub use notification::*;
pub use work_order::*;
pub use directory::*;

//! Infrastructure project workflow
//!
//! Projects move PROPOSAL -> RKB -> DISBURSEMENT -> EXECUTION -> COMPLETED.
//! Each of the first three phases is gated by an approvable stage; the
//! execution phase collects progress logs until the project is completed.
//!
//! # Usage
//!
//! ```ignore
//! use infraflow_core::workflow::{InfraWorkflow, proposal::ProposalFields};
//!
//! let workflow = InfraWorkflow::new(&db).acting_as(&actor);
//! workflow.save_proposal(&project_id, &fields).await?;
//! workflow.submit_proposal(&project_id).await?;
//! let decision = workflow.approve_proposal(&project_id).await?;
//! assert_eq!(decision.phase, InfraPhase::Rkb);
//! ```

pub mod approval;
pub mod disbursement;
pub mod engine;
pub mod events;
pub mod execution;
pub mod phase;
pub mod policy;
pub mod proposal;
pub mod rkb;
pub mod stage;

pub use approval::ApprovalStatus;
pub use disbursement::DisbursementFields;
pub use engine::InfraWorkflow;
pub use events::{StageApproved, WorkflowEvent};
pub use execution::{ExecutionLog, NewExecutionLog};
pub use phase::{InfraPhase, PhaseTransition};
pub use policy::{EditPolicy, ProgressPolicy, WorkflowPolicy};
pub use proposal::ProposalFields;
pub use rkb::{NewRkbItem, RkbFields, RkbItem, RkbItemChange};
pub use stage::{Stage, StageDecision, StageFields, StageKind};

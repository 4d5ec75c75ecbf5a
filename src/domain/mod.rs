//! Domain model for the case file workflow.
//!
//! This module holds the pure workflow core: no I/O happens here.
//!
//! # Architecture
//!
//! - **Permissions** (`permissions.rs`): role to capability matrix, visibility scopes
//! - **Lifecycle** (`lifecycle.rs`): the case file state graph and transition policy
//! - **Case file** (`case_file/`): event-sourced aggregate owning lifecycle state
//! - **Session** (`session/`): workshop session aggregate and its status deriver
//! - **Intents** (`intents.rs`): notifications owed for committed events
//! - **Audit** (`audit.rs`): audit records read from stored events
//!
//! # Usage
//!
//! ```ignore
//! use crate::domain::{CaseFileAggregate, CaseFileCommand, DomainServices};
//!
//! let events = aggregate.handle(CaseFileCommand::RequestTransition { actor, to }, &services).await?;
//! for event in events {
//!     aggregate.apply(event);
//! }
//! ```

pub mod audit;
pub mod case_file;
pub mod errors;
pub mod intents;
pub mod lifecycle;
pub mod permissions;
pub mod services;
pub mod session;
pub mod types;

pub use audit::AuditRecord;
pub use case_file::{
    CaseFile, CaseFileAggregate, CaseFileCommand, CaseFileDraft, CaseFileEvent, CaseFileView,
    DraftChanges, MilestoneStamp, Milestones, TransitionOutcome,
};
pub use errors::CoreError;
pub use intents::NotificationIntent;
pub use lifecycle::{authorize_transition, Edge, LifecycleState, Milestone, Recipient, EDGES};
pub use permissions::{
    has_capability, visibility_predicate, Actor, ActorContext, Capability, Role, ScopedRecord,
};
pub use services::{DomainClock, DomainServices, SessionPolicy};
pub use session::{
    derive_session_status, ContractParty, SessionOutcome, SessionStatus, SessionView,
    WorkshopSession, WorkshopSessionAggregate, WorkshopSessionCommand, WorkshopSessionEvent,
};
pub use types::{
    ActorId, Amount, CaseFileId, DocumentLocator, OrganizationId, ReferenceCode, SessionId,
    Territory, TimestampUtc,
};

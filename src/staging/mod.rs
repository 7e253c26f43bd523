//! Staging review workflow
//!
//! Machine-generated keyword and rule proposals are claimed by annotators
//! under a lease, reviewed, and promoted into production configuration.

pub mod actor;
pub mod capability;
pub mod manager;
pub mod promote;
pub mod proposal;
pub mod stats;

pub use actor::Actor;
pub use capability::{Capability, CapabilitySet, Role};
pub use manager::{
    BatchReviewOutcome, ClaimOutcome, ReleaseOutcome, ReviewFailure, ReviewItem, StagingManager,
    StagingSettings,
};
pub use promote::{ConfigWriter, PromotedRecord, SqliteConfigWriter, SyncOutcome, SyncScope};
pub use proposal::{
    Decision, FinalFields, Proposal, ProposalDraft, ProposalKind, ProposalPayload, ProposalStatus,
};
pub use stats::{AnnotatorStat, MyTaskStats, TaskOverview};

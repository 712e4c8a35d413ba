//! Shift-matching core for home-care scheduling
//!
//! Given an unassigned visit, this crate scores every eligible caregiver
//! against a configurable rubric, ranks the candidates, emits bounded
//! assignment proposals, and drives each proposal through a strict
//! lifecycle until the visit is assigned or the proposal set is exhausted.
//! It also serves caregiver self-selection of open shifts and time-based
//! proposal expiry with a full audit trail.
//!
//! Transports, relational drivers, and notification delivery are external
//! collaborators behind the `DataPort`, store, and `NotificationSink`
//! traits.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod candidate;
pub mod caregiver;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod ids;
pub mod loader;
pub mod ports;
pub mod preferences;
pub mod proposal;
pub mod query;
pub mod scorer;
pub mod shift;
pub mod store;

pub use candidate::{CaregiverContext, MatchCandidate, MatchQuality, ScoreDimension};
pub use config::{MatchingConfiguration, OptimizeFor, ScoreWeights};
pub use engine::{
    ActorRole, AuthContext, CreateShiftRequest, Deadline, Expirer, ManualProposalRequest,
    MatchOutcome, MatchShiftRequest, MatchingEngine, ProposalResponse,
};
pub use error::{MatchingError, MatchingResult};
pub use history::{MatchHistory, MatchOutcome as HistoryOutcome};
pub use proposal::{AssignmentProposal, ProposalMethod, ProposalStatus};
pub use shift::{MatchingStatus, OpenShift};
pub use store::{ConfigStore, InMemoryDataPort, MemoryStore, ProposalStore, SledStore};

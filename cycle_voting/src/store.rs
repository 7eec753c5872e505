//! The storage collaborator.
//!
//! The engine only talks to persistence through [`CycleStore`]. Three
//! uniqueness constraints must be enforced by the implementation itself,
//! and reported as [`StoreError::Conflict`] when violated:
//! - one cycle per (group, cycle number)
//! - one cycle result per cycle
//! - one vote per (cycle, participant)
//!
//! The rollover coordinator relies on these constraints, not on locking, when
//! several triggers race on the same group.

use chrono::{DateTime, Utc};
use snafu::Snafu;

use crate::config::*;

#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[snafu(display("Uniqueness conflict on {constraint}"))]
    Conflict { constraint: String },
    /// Any other persistence failure.
    #[snafu(display("Storage failure: {message}"))]
    Unavailable { message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait CycleStore {
    // Reads
    fn group(&self, group_id: GroupId) -> StoreResult<Option<Group>>;
    fn group_ids(&self) -> StoreResult<Vec<GroupId>>;
    fn ranking_rules(&self, group_id: GroupId) -> StoreResult<Vec<RankingRule>>;
    fn participant(&self, participant_id: ParticipantId) -> StoreResult<Option<Participant>>;
    /// The cycle with the highest number for this group.
    fn latest_cycle(&self, group_id: GroupId) -> StoreResult<Option<Cycle>>;
    fn cycle(&self, cycle_id: CycleId) -> StoreResult<Option<Cycle>>;
    fn cycle_by_number(&self, group_id: GroupId, number: u32) -> StoreResult<Option<Cycle>>;
    fn submission(&self, submission_id: SubmissionId) -> StoreResult<Option<Submission>>;
    fn submissions(&self, cycle_id: CycleId) -> StoreResult<Vec<Submission>>;
    fn votes(&self, cycle_id: CycleId) -> StoreResult<Vec<Vote>>;
    fn cycle_result(&self, cycle_id: CycleId) -> StoreResult<Option<CycleResult>>;

    // Writes
    fn insert_cycle(&self, cycle: NewCycle) -> StoreResult<Cycle>;
    fn insert_cycle_result(&self, result: CycleResult) -> StoreResult<()>;
    /// Moves the end of the voting window. Used to close a vote early.
    fn close_voting(&self, cycle_id: CycleId, at: DateTime<Utc>) -> StoreResult<Cycle>;
    fn insert_submission(
        &self,
        submission: NewSubmission,
        at: DateTime<Utc>,
    ) -> StoreResult<Submission>;
    fn delete_submission(&self, submission_id: SubmissionId) -> StoreResult<()>;
    fn insert_vote(&self, vote: NewVote) -> StoreResult<Vote>;
    fn update_cadence(&self, group_id: GroupId, cadence: Cadence) -> StoreResult<Group>;
    fn replace_ranking_rules(&self, group_id: GroupId, rules: Vec<RankingRule>)
        -> StoreResult<()>;
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

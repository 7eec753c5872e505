// ********* Identifiers ***********

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::store::StoreError;

#[derive(
    Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GroupId(pub u64);

#[derive(
    Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CycleId(pub u64);

/// The identifier of a submission. It doubles as the candidate identifier
/// during a tally: ties are always broken towards the lowest value.
#[derive(
    Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubmissionId(pub u64);

#[derive(
    Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

#[derive(
    Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VoteId(pub u64);

impl Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ********* Groups and cycles ***********

/// The length of a cycle, in whole days.
///
/// The submission window lasts `cadence_days - voting_days` days and is
/// immediately followed by the voting window.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cadence {
    #[serde(rename = "cadenceDays")]
    pub cadence_days: u32,
    #[serde(rename = "votingDays")]
    pub voting_days: u32,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Only read when a new cycle gets created. Updating it never touches
    /// a cycle that already exists.
    #[serde(flatten)]
    pub cadence: Cadence,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// The four instants delimiting the phases of a cycle.
///
/// Well-formed windows satisfy
/// `submission_start <= submission_end <= voting_start <= voting_end`.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CycleWindow {
    #[serde(rename = "submissionStart")]
    pub submission_start: DateTime<Utc>,
    #[serde(rename = "submissionEnd")]
    pub submission_end: DateTime<Utc>,
    #[serde(rename = "votingStart")]
    pub voting_start: DateTime<Utc>,
    #[serde(rename = "votingEnd")]
    pub voting_end: DateTime<Utc>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub id: CycleId,
    #[serde(rename = "groupId")]
    pub group_id: GroupId,
    #[serde(rename = "cycleNumber")]
    pub number: u32,
    #[serde(flatten)]
    pub window: CycleWindow,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// A cycle that has not been stored yet. The store assigns the identifier.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NewCycle {
    pub group_id: GroupId,
    pub number: u32,
    pub window: CycleWindow,
    pub created_at: DateTime<Utc>,
}

/// All the phases a cycle goes through, in order.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pending,
    Submission,
    Voting,
    Completed,
}

// ********* Participants and submissions ***********

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    #[serde(rename = "groupId")]
    pub group_id: GroupId,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "registeredAt")]
    pub registered_at: DateTime<Utc>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    #[serde(rename = "cycleId")]
    pub cycle_id: CycleId,
    #[serde(rename = "participantId")]
    pub participant_id: ParticipantId,
    pub title: String,
    pub url: String,
    #[serde(rename = "publicationDate")]
    pub publication_date: Option<NaiveDate>,
    pub recommendation: Option<String>,
    #[serde(rename = "submittedAt")]
    pub submitted_at: DateTime<Utc>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NewSubmission {
    pub cycle_id: CycleId,
    pub participant_id: ParticipantId,
    pub title: String,
    pub url: String,
    pub publication_date: Option<NaiveDate>,
    pub recommendation: Option<String>,
}

// ********* Ranking rules and ballots ***********

/// One tier of the step function that maps the number of submissions in a
/// cycle to the number of choices a ballot may rank.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankingRule {
    /// Inclusive lower bound on the number of submissions.
    #[serde(rename = "minPapers")]
    pub min_papers: u32,
    /// Inclusive upper bound, unbounded when missing.
    #[serde(rename = "maxPapers")]
    pub max_papers: Option<u32>,
    #[serde(rename = "requiredRankings")]
    pub required_rankings: u32,
}

/// How many distinct submissions a ballot must and may rank.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct ChoiceRange {
    pub min: u32,
    pub max: u32,
}

/// A single position on a ballot. Rank 1 is the most preferred.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct Ranking {
    #[serde(rename = "submissionId")]
    pub submission_id: SubmissionId,
    pub rank: u32,
}

/// One participant's ballot for one cycle, with its rankings.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    #[serde(rename = "cycleId")]
    pub cycle_id: CycleId,
    #[serde(rename = "participantId")]
    pub participant_id: ParticipantId,
    pub rankings: Vec<Ranking>,
    #[serde(rename = "votedAt")]
    pub voted_at: DateTime<Utc>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NewVote {
    pub cycle_id: CycleId,
    pub participant_id: ParticipantId,
    pub rankings: Vec<Ranking>,
    pub voted_at: DateTime<Utc>,
}

/// A ballot as consumed by the tally: the submissions in decreasing order
/// of preference.
pub type Ballot = Vec<SubmissionId>;

// ******** Output data structures *********

/// Statistics for one round of the instant-runoff tally.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    #[serde(rename = "roundNumber")]
    pub round: u32,
    /// The first preferences among the candidates still running.
    #[serde(rename = "voteCounts")]
    pub vote_counts: BTreeMap<SubmissionId, u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub eliminated: Option<SubmissionId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub winner: Option<SubmissionId>,
    /// Where the ballots of the eliminated candidate went.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub transfers: BTreeMap<SubmissionId, u64>,
    /// The ballots of the eliminated candidate with no preference left.
    #[serde(skip_serializing_if = "is_zero", default)]
    pub exhausted: u64,
}

fn is_zero(x: &u64) -> bool {
    *x == 0
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TallyResult {
    pub winner: Option<SubmissionId>,
    pub rounds: Vec<RoundRecord>,
}

/// The persisted outcome of a completed cycle. Written once, never updated.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    #[serde(rename = "cycleId")]
    pub cycle_id: CycleId,
    #[serde(rename = "winningSubmissionId")]
    pub winning_submission_id: Option<SubmissionId>,
    #[serde(rename = "totalVotes")]
    pub total_votes: u64,
    #[serde(rename = "eliminationRounds")]
    pub elimination_rounds: Vec<RoundRecord>,
    #[serde(rename = "calculatedAt")]
    pub calculated_at: DateTime<Utc>,
}

// ******** Errors *********

/// The reasons for rejecting a ballot before it reaches the tally.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum BallotProblem {
    Empty,
    TooManyChoices { given: usize, max: u32 },
    NonPositiveRank,
    DuplicateRank(u32),
    DuplicateSubmission(SubmissionId),
    ForeignSubmission(SubmissionId),
}

impl Display for BallotProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BallotProblem::Empty => write!(f, "at least one submission must be ranked"),
            BallotProblem::TooManyChoices { given, max } => {
                write!(f, "{} submissions ranked, at most {} allowed", given, max)
            }
            BallotProblem::NonPositiveRank => write!(f, "ranks must be positive"),
            BallotProblem::DuplicateRank(rank) => write!(f, "rank {} used more than once", rank),
            BallotProblem::DuplicateSubmission(sid) => {
                write!(f, "submission {} ranked more than once", sid)
            }
            BallotProblem::ForeignSubmission(sid) => {
                write!(f, "submission {} does not belong to this cycle", sid)
            }
        }
    }
}

/// Errors raised by the cycle operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CycleError {
    #[snafu(display("No ranking rule applies to {submission_count} submissions"))]
    NoApplicableRankingRule { submission_count: u32 },

    #[snafu(display("Ranking rules are not contiguous: {message}"))]
    RankingRuleGap { message: String },

    #[snafu(display("Invalid ballot: {problem}"))]
    InvalidBallot { problem: BallotProblem },

    #[snafu(display("Storage unavailable"))]
    StorageUnavailable { source: StoreError },

    #[snafu(display("Group {group_id} not found"))]
    GroupNotFound { group_id: GroupId },

    #[snafu(display("Cycle {cycle_id} not found"))]
    CycleNotFound { cycle_id: CycleId },

    #[snafu(display("Group {group_id} has no cycle yet"))]
    NoCycle { group_id: GroupId },

    #[snafu(display("Submission {submission_id} not found"))]
    SubmissionNotFound { submission_id: SubmissionId },

    #[snafu(display("Participant {participant_id} not found in this group"))]
    ParticipantNotFound { participant_id: ParticipantId },

    #[snafu(display("Cycle {cycle_id} is in phase {actual:?}, expected {expected:?}"))]
    WrongPhase {
        cycle_id: CycleId,
        expected: Phase,
        actual: Phase,
    },

    #[snafu(display("Participant {participant_id} already voted in cycle {cycle_id}"))]
    AlreadyVoted {
        cycle_id: CycleId,
        participant_id: ParticipantId,
    },

    #[snafu(display("Participant {participant_id} already has a submission in cycle {cycle_id}"))]
    AlreadySubmitted {
        cycle_id: CycleId,
        participant_id: ParticipantId,
    },

    #[snafu(display("Participant {participant_id} does not own submission {submission_id}"))]
    NotOwner {
        submission_id: SubmissionId,
        participant_id: ParticipantId,
    },

    #[snafu(display("Cycle {number} already exists for group {group_id}"))]
    CycleAlreadyExists { group_id: GroupId, number: u32 },

    #[snafu(display("New cycle would overlap cycle {number} of group {group_id}"))]
    CycleOverlap { group_id: GroupId, number: u32 },

    #[snafu(display(
        "Invalid cadence: {voting_days} voting days must be less than {cadence_days} total days"
    ))]
    InvalidCadence { cadence_days: u32, voting_days: u32 },
}

pub type CvResult<T> = Result<T, CycleError>;

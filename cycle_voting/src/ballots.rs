//! The participant-facing paths: proposing submissions and casting ballots.
//!
//! The caller has already authenticated the participant. These functions
//! only check that the action fits the cycle's phase and rules.

use std::collections::HashSet;

use log::{debug, info};
use snafu::{ensure, OptionExt, ResultExt};

use crate::clock::Clock;
use crate::config::*;
use crate::ranking::{required_choices, validate_ballot};
use crate::store::CycleStore;

fn load_cycle<S: CycleStore + ?Sized>(store: &S, cycle_id: CycleId) -> CvResult<Cycle> {
    store
        .cycle(cycle_id)
        .context(StorageUnavailableSnafu)?
        .context(CycleNotFoundSnafu { cycle_id })
}

fn ensure_phase(cycle: &Cycle, expected: Phase, actual: Phase) -> CvResult<()> {
    ensure!(
        actual == expected,
        WrongPhaseSnafu {
            cycle_id: cycle.id,
            expected,
            actual,
        }
    );
    Ok(())
}

fn ensure_member<S: CycleStore + ?Sized>(
    store: &S,
    group_id: GroupId,
    participant_id: ParticipantId,
) -> CvResult<()> {
    let found = store
        .participant(participant_id)
        .context(StorageUnavailableSnafu)?;
    ensure!(
        matches!(found, Some(p) if p.group_id == group_id),
        ParticipantNotFoundSnafu { participant_id }
    );
    Ok(())
}

/// The latest cycle of a group with its phase, if the group has any cycle.
pub fn current_cycle<S, C>(store: &S, clock: &C, group_id: GroupId) -> CvResult<Option<(Cycle, Phase)>>
where
    S: CycleStore + ?Sized,
    C: Clock + ?Sized,
{
    let now = clock.now();
    Ok(store
        .latest_cycle(group_id)
        .context(StorageUnavailableSnafu)?
        .map(|c| {
            let phase = c.phase(now);
            (c, phase)
        }))
}

/// The number of choices a ballot of this cycle may hold.
pub fn choices_for_cycle<S: CycleStore + ?Sized>(
    store: &S,
    cycle: &Cycle,
) -> CvResult<(ChoiceRange, Vec<Submission>)> {
    let submissions = store.submissions(cycle.id).context(StorageUnavailableSnafu)?;
    let rules = store
        .ranking_rules(cycle.group_id)
        .context(StorageUnavailableSnafu)?;
    let range = required_choices(submissions.len() as u32, &rules)?;
    Ok((range, submissions))
}

/// Accepts the ballot of a participant for a cycle in its voting phase.
///
/// A participant votes once per cycle. The storage constraint on
/// (cycle, participant) has the final word when two ballots race.
pub fn cast_vote<S, C>(
    store: &S,
    clock: &C,
    cycle_id: CycleId,
    participant_id: ParticipantId,
    rankings: &[Ranking],
) -> CvResult<Vote>
where
    S: CycleStore + ?Sized,
    C: Clock + ?Sized,
{
    let now = clock.now();
    let cycle = load_cycle(store, cycle_id)?;
    ensure_phase(&cycle, Phase::Voting, cycle.phase(now))?;
    ensure_member(store, cycle.group_id, participant_id)?;

    let already_voted = store
        .votes(cycle_id)
        .context(StorageUnavailableSnafu)?
        .iter()
        .any(|v| v.participant_id == participant_id);
    ensure!(
        !already_voted,
        AlreadyVotedSnafu {
            cycle_id,
            participant_id
        }
    );

    let (range, submissions) = choices_for_cycle(store, &cycle)?;
    let valid_ids: HashSet<SubmissionId> = submissions.iter().map(|s| s.id).collect();
    let ballot = validate_ballot(rankings, &valid_ids, range)?;
    debug!(
        "cast_vote: participant {} in cycle {}: {:?}",
        participant_id, cycle_id, ballot
    );

    let vote = NewVote {
        cycle_id,
        participant_id,
        rankings: rankings.to_vec(),
        voted_at: now,
    };
    match store.insert_vote(vote) {
        Ok(v) => {
            info!(
                "cast_vote: participant {} voted in cycle {}",
                participant_id, cycle_id
            );
            Ok(v)
        }
        Err(e) if e.is_conflict() => AlreadyVotedSnafu {
            cycle_id,
            participant_id,
        }
        .fail(),
        Err(e) => Err(e).context(StorageUnavailableSnafu),
    }
}

/// Proposes a submission. Only open during the submission phase, and each
/// participant proposes at most one submission per cycle.
pub fn submit<S, C>(store: &S, clock: &C, submission: NewSubmission) -> CvResult<Submission>
where
    S: CycleStore + ?Sized,
    C: Clock + ?Sized,
{
    let now = clock.now();
    let cycle = load_cycle(store, submission.cycle_id)?;
    ensure_phase(&cycle, Phase::Submission, cycle.phase(now))?;
    ensure_member(store, cycle.group_id, submission.participant_id)?;

    let already_submitted = store
        .submissions(cycle.id)
        .context(StorageUnavailableSnafu)?
        .iter()
        .any(|s| s.participant_id == submission.participant_id);
    ensure!(
        !already_submitted,
        AlreadySubmittedSnafu {
            cycle_id: cycle.id,
            participant_id: submission.participant_id,
        }
    );
    let stored = store
        .insert_submission(submission, now)
        .context(StorageUnavailableSnafu)?;
    info!(
        "submit: submission {} in cycle {} by {}",
        stored.id, stored.cycle_id, stored.participant_id
    );
    Ok(stored)
}

/// Withdraws a submission. Only its owner may do it, and only while the
/// submission phase lasts.
pub fn withdraw<S, C>(
    store: &S,
    clock: &C,
    submission_id: SubmissionId,
    participant_id: ParticipantId,
) -> CvResult<()>
where
    S: CycleStore + ?Sized,
    C: Clock + ?Sized,
{
    let submission = store
        .submission(submission_id)
        .context(StorageUnavailableSnafu)?
        .context(SubmissionNotFoundSnafu { submission_id })?;
    ensure!(
        submission.participant_id == participant_id,
        NotOwnerSnafu {
            submission_id,
            participant_id
        }
    );
    let cycle = load_cycle(store, submission.cycle_id)?;
    ensure_phase(&cycle, Phase::Submission, cycle.phase(clock.now()))?;
    store
        .delete_submission(submission_id)
        .context(StorageUnavailableSnafu)?;
    info!("withdraw: submission {} removed", submission_id);
    Ok(())
}

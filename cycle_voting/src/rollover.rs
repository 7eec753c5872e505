//! Closing completed cycles and opening their successors.
//!
//! A rollover pass may run any number of times, from any number of callers
//! at once, for the same group. Every write is preceded by an existence
//! check, and a uniqueness conflict on the write means another caller got
//! there first: it counts as success. No lock is taken.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use snafu::{OptionExt, ResultExt};

use crate::builder::tally_votes;
use crate::clock::Clock;
use crate::config::*;
use crate::phase::next_cycle;
use crate::store::CycleStore;

/// What a rollover pass did for one group.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum PassOutcome {
    /// The group has no cycle at all. Starting the first one is an admin
    /// action.
    NoCycle,
    /// The latest cycle is not over yet.
    InProgress { cycle_id: CycleId, phase: Phase },
    /// The latest cycle is over and its successor already exists.
    AlreadyAdvanced { cycle_id: CycleId, tallied: bool },
    /// This pass created the successor of the latest cycle.
    Advanced {
        closed: CycleId,
        opened: CycleId,
        number: u32,
        tallied: bool,
    },
}

impl PassOutcome {
    pub fn processed(&self) -> bool {
        matches!(self, PassOutcome::Advanced { .. })
    }
}

/// The summary of a pass over every group.
#[derive(Debug, Default)]
pub struct FleetReport {
    pub groups_advanced: usize,
    pub outcomes: Vec<(GroupId, PassOutcome)>,
    pub failures: Vec<(GroupId, CycleError)>,
}

/// Tallies a cycle and stores its result, unless a result is already there.
///
/// Returns true if this call stored the result.
pub fn close_cycle<S: CycleStore + ?Sized>(
    store: &S,
    cycle: &Cycle,
    now: DateTime<Utc>,
) -> CvResult<bool> {
    if store
        .cycle_result(cycle.id)
        .context(StorageUnavailableSnafu)?
        .is_some()
    {
        debug!("close_cycle: cycle {} already tallied", cycle.id);
        return Ok(false);
    }

    let submissions = store.submissions(cycle.id).context(StorageUnavailableSnafu)?;
    let votes = store.votes(cycle.id).context(StorageUnavailableSnafu)?;
    let res = tally_votes(&submissions, &votes);
    info!(
        "close_cycle: cycle {} (group {}, #{}): winner {:?} out of {} submissions and {} votes",
        cycle.id,
        cycle.group_id,
        cycle.number,
        res.winner,
        submissions.len(),
        votes.len()
    );

    let result = CycleResult {
        cycle_id: cycle.id,
        winning_submission_id: res.winner,
        total_votes: votes.len() as u64,
        elimination_rounds: res.rounds,
        calculated_at: now,
    };
    match store.insert_cycle_result(result) {
        Ok(()) => Ok(true),
        Err(e) if e.is_conflict() => {
            info!(
                "close_cycle: cycle {} tallied concurrently by another caller",
                cycle.id
            );
            Ok(false)
        }
        Err(e) => Err(e).context(StorageUnavailableSnafu),
    }
}

/// Runs one rollover pass for a group.
pub fn run_rollover_pass<S, C>(store: &S, clock: &C, group_id: GroupId) -> CvResult<PassOutcome>
where
    S: CycleStore + ?Sized,
    C: Clock + ?Sized,
{
    let latest = match store.latest_cycle(group_id).context(StorageUnavailableSnafu)? {
        Some(c) => c,
        None => {
            debug!("run_rollover_pass: group {} has no cycle", group_id);
            return Ok(PassOutcome::NoCycle);
        }
    };

    let now = clock.now();
    let phase = latest.phase(now);
    if phase != Phase::Completed {
        debug!(
            "run_rollover_pass: group {}: cycle #{} is in phase {:?}",
            group_id, latest.number, phase
        );
        return Ok(PassOutcome::InProgress {
            cycle_id: latest.id,
            phase,
        });
    }

    let tallied = close_cycle(store, &latest, now)?;

    let next_number = latest.number + 1;
    if store
        .cycle_by_number(group_id, next_number)
        .context(StorageUnavailableSnafu)?
        .is_some()
    {
        debug!(
            "run_rollover_pass: group {}: cycle #{} already exists",
            group_id, next_number
        );
        return Ok(PassOutcome::AlreadyAdvanced {
            cycle_id: latest.id,
            tallied,
        });
    }

    let group = store
        .group(group_id)
        .context(StorageUnavailableSnafu)?
        .context(GroupNotFoundSnafu { group_id })?;
    let new_cycle = next_cycle(&latest, &group.cadence, now)?;
    match store.insert_cycle(new_cycle) {
        Ok(opened) => {
            info!(
                "run_rollover_pass: group {}: opened cycle #{} ({:?} -> {:?})",
                group_id, opened.number, opened.window.submission_start, opened.window.voting_end
            );
            Ok(PassOutcome::Advanced {
                closed: latest.id,
                opened: opened.id,
                number: opened.number,
                tallied,
            })
        }
        Err(e) if e.is_conflict() => {
            info!(
                "run_rollover_pass: group {}: cycle #{} opened concurrently by another caller",
                group_id, next_number
            );
            Ok(PassOutcome::AlreadyAdvanced {
                cycle_id: latest.id,
                tallied,
            })
        }
        Err(e) => Err(e).context(StorageUnavailableSnafu),
    }
}

/// Runs a rollover pass for every group. A failing group is reported and
/// does not prevent the others from advancing.
pub fn run_rollover_for_all_groups<S, C>(store: &S, clock: &C) -> CvResult<FleetReport>
where
    S: CycleStore + ?Sized,
    C: Clock + ?Sized,
{
    let group_ids = store.group_ids().context(StorageUnavailableSnafu)?;
    let mut report = FleetReport::default();
    for group_id in group_ids {
        match run_rollover_pass(store, clock, group_id) {
            Ok(outcome) => {
                if outcome.processed() {
                    report.groups_advanced += 1;
                }
                report.outcomes.push((group_id, outcome));
            }
            Err(e) => {
                warn!("run_rollover_for_all_groups: group {}: {}", group_id, e);
                report.failures.push((group_id, e));
            }
        }
    }
    info!(
        "run_rollover_for_all_groups: {} groups advanced, {} failures",
        report.groups_advanced,
        report.failures.len()
    );
    Ok(report)
}

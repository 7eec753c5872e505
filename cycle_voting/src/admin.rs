//! Explicit admin actions: bootstrapping cycles, closing a vote early and
//! changing the settings of a group.
//!
//! Settings only apply to cycles created afterwards.

use chrono::{DateTime, Utc};
use log::info;
use snafu::{ensure, OptionExt, ResultExt};

use crate::clock::Clock;
use crate::config::*;
use crate::ranking::check_rule_coverage;
use crate::rollover::close_cycle;
use crate::store::CycleStore;

fn load_group<S: CycleStore + ?Sized>(store: &S, group_id: GroupId) -> CvResult<Group> {
    store
        .group(group_id)
        .context(StorageUnavailableSnafu)?
        .context(GroupNotFoundSnafu { group_id })
}

/// Appends a cycle to a group, starting at `start`.
///
/// The cycle is numbered after the latest one (1 for the first cycle) and
/// may not start before the latest one ends. The group's cadence is used
/// unless another one is given.
pub fn schedule_cycle<S, C>(
    store: &S,
    clock: &C,
    group_id: GroupId,
    start: DateTime<Utc>,
    cadence: Option<Cadence>,
) -> CvResult<Cycle>
where
    S: CycleStore + ?Sized,
    C: Clock + ?Sized,
{
    let group = load_group(store, group_id)?;
    let cadence = cadence.unwrap_or(group.cadence);
    let window = cadence.window_starting_at(start)?;

    let latest = store
        .latest_cycle(group_id)
        .context(StorageUnavailableSnafu)?;
    let number = latest.as_ref().map_or(1, |c| c.number + 1);
    if let Some(previous) = latest.as_ref() {
        ensure!(
            previous.window.voting_end <= start,
            CycleOverlapSnafu {
                group_id,
                number: previous.number,
            }
        );
    }

    let new_cycle = NewCycle {
        group_id,
        number,
        window,
        created_at: clock.now(),
    };
    match store.insert_cycle(new_cycle) {
        Ok(c) => {
            info!(
                "schedule_cycle: group {}: cycle #{} from {:?} to {:?}",
                group_id, c.number, c.window.submission_start, c.window.voting_end
            );
            Ok(c)
        }
        Err(e) if e.is_conflict() => CycleAlreadyExistsSnafu { group_id, number }.fail(),
        Err(e) => Err(e).context(StorageUnavailableSnafu),
    }
}

/// Starts a new cycle for a group right away.
pub fn start_cycle_now<S, C>(
    store: &S,
    clock: &C,
    group_id: GroupId,
    cadence: Option<Cadence>,
) -> CvResult<Cycle>
where
    S: CycleStore + ?Sized,
    C: Clock + ?Sized,
{
    schedule_cycle(store, clock, group_id, clock.now(), cadence)
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FinishOutcome {
    pub closed: Cycle,
    /// True if this call stored the result of the closed cycle.
    pub tallied: bool,
    pub next: Cycle,
}

/// Ends the voting of the latest cycle now, tallies it and opens its
/// successor right away.
///
/// This races safely with the rollover coordinator: whoever writes the
/// result or the successor first wins, and the other side reuses it.
pub fn finish_voting<S, C>(
    store: &S,
    clock: &C,
    group_id: GroupId,
    next_cadence: Option<Cadence>,
) -> CvResult<FinishOutcome>
where
    S: CycleStore + ?Sized,
    C: Clock + ?Sized,
{
    let now = clock.now();
    let group = load_group(store, group_id)?;
    let cadence = next_cadence.unwrap_or(group.cadence);
    cadence.validate()?;

    let cycle = store
        .latest_cycle(group_id)
        .context(StorageUnavailableSnafu)?
        .context(NoCycleSnafu { group_id })?;
    let phase = cycle.phase(now);
    ensure!(
        phase == Phase::Voting,
        WrongPhaseSnafu {
            cycle_id: cycle.id,
            expected: Phase::Voting,
            actual: phase,
        }
    );

    // Close first so that no ballot lands after the tally.
    let closed = store
        .close_voting(cycle.id, now)
        .context(StorageUnavailableSnafu)?;
    info!(
        "finish_voting: group {}: voting of cycle #{} closed early",
        group_id, closed.number
    );
    let tallied = close_cycle(store, &closed, now)?;

    let number = closed.number + 1;
    let successor = NewCycle {
        group_id,
        number,
        window: cadence.window_starting_at(now)?,
        created_at: now,
    };
    let next = match store.insert_cycle(successor) {
        Ok(c) => c,
        Err(e) if e.is_conflict() => store
            .cycle_by_number(group_id, number)
            .context(StorageUnavailableSnafu)?
            .context(CycleAlreadyExistsSnafu { group_id, number })?,
        Err(e) => return Err(e).context(StorageUnavailableSnafu),
    };
    Ok(FinishOutcome {
        closed,
        tallied,
        next,
    })
}

/// Changes the cadence used for the future cycles of a group.
pub fn update_cadence<S: CycleStore + ?Sized>(
    store: &S,
    group_id: GroupId,
    cadence: Cadence,
) -> CvResult<Group> {
    cadence.validate()?;
    load_group(store, group_id)?;
    let g = store
        .update_cadence(group_id, cadence)
        .context(StorageUnavailableSnafu)?;
    info!(
        "update_cadence: group {}: {} days, {} of them for voting",
        group_id, cadence.cadence_days, cadence.voting_days
    );
    Ok(g)
}

/// Replaces the ranking rules of a group. The rules must cover every
/// submission count from their lowest bound upwards.
pub fn set_ranking_rules<S: CycleStore + ?Sized>(
    store: &S,
    group_id: GroupId,
    rules: Vec<RankingRule>,
) -> CvResult<()> {
    check_rule_coverage(&rules)?;
    load_group(store, group_id)?;
    store
        .replace_ranking_rules(group_id, rules)
        .context(StorageUnavailableSnafu)
}

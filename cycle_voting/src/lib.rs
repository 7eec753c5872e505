/*!
Recurring, time-boxed group decisions settled by an instant-runoff vote.

A group runs one cycle after the other. Members propose submissions during
the submission window, rank them during the voting window, and the
instant-runoff [`tally`] picks a single winner. The [`rollover`] coordinator
closes a completed cycle and opens the next one, exactly once, no matter how
many triggers fire for the same group.

See the [`manual`] for the details of each rule.
*/

pub mod admin;
pub mod ballots;
pub mod builder;
pub mod clock;
mod config;
pub mod manual;
pub mod memory;
pub mod phase;
pub mod ranking;
pub mod rollover;
pub mod store;
#[cfg(test)]
mod testing;

use log::{debug, info};

use std::{
    collections::{BTreeMap, BTreeSet},
    ops::AddAssign,
};

pub use crate::config::*;
pub use crate::phase::evaluate_phase;
pub use crate::ranking::required_choices;

// **** Private structures ****

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
struct VoteCount(u64);

impl VoteCount {
    const EMPTY: VoteCount = VoteCount(0);
}

impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        VoteCount(iter.map(|vc| vc.0).sum())
    }
}

impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        self.0 += rhs.0;
    }
}

// A ballot during the count, with the candidate it currently supports.
// None means the ballot is exhausted.
#[derive(Eq, PartialEq, Debug, Clone)]
struct BallotState<'a> {
    choices: &'a [SubmissionId],
    current: Option<SubmissionId>,
}

impl<'a> BallotState<'a> {
    fn new(choices: &'a [SubmissionId], still_running: &BTreeSet<SubmissionId>) -> Self {
        let mut res = BallotState {
            choices,
            current: None,
        };
        res.current = res.preference(still_running);
        res
    }

    /// The most preferred candidate that is still running.
    fn preference(&self, still_running: &BTreeSet<SubmissionId>) -> Option<SubmissionId> {
        self.choices
            .iter()
            .find(|sid| still_running.contains(sid))
            .cloned()
    }
}

// How a round ended.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum RoundOutcome {
    Majority(SubmissionId),
    // Every candidate left has the same count.
    FullTie(SubmissionId),
    Eliminated(SubmissionId),
}

fn majority_threshold(total_ballots: usize) -> VoteCount {
    VoteCount((total_ballots as u64 / 2) + 1)
}

fn compute_tally(
    ballots: &[BallotState],
    still_running: &BTreeSet<SubmissionId>,
) -> BTreeMap<SubmissionId, VoteCount> {
    // Every running candidate shows up, even without a single vote.
    let mut tally: BTreeMap<SubmissionId, VoteCount> = still_running
        .iter()
        .map(|sid| (*sid, VoteCount::EMPTY))
        .collect();
    for b in ballots.iter() {
        if let Some(vc) = b.current.and_then(|sid| tally.get_mut(&sid)) {
            *vc += VoteCount(1);
        }
    }
    tally
}

fn decide_round(tally: &BTreeMap<SubmissionId, VoteCount>, threshold: VoteCount) -> RoundOutcome {
    // At most one candidate can reach a strict majority.
    if let Some((sid, _)) = tally.iter().find(|(_, vc)| **vc >= threshold) {
        return RoundOutcome::Majority(*sid);
    }

    // The tally is never empty here: the caller only runs rounds with at
    // least two candidates.
    let min_count: VoteCount = tally.values().min().cloned().unwrap_or(VoteCount::EMPTY);
    // Sorted by increasing identifier since the tally is ordered.
    let all_smallest: Vec<SubmissionId> = tally
        .iter()
        .filter_map(|(sid, vc)| if *vc == min_count { Some(*sid) } else { None })
        .collect();
    debug!("decide_round: all_smallest: {:?}", all_smallest);

    let lowest = all_smallest[0];
    if all_smallest.len() == tally.len() {
        RoundOutcome::FullTie(lowest)
    } else {
        RoundOutcome::Eliminated(lowest)
    }
}

fn to_counts(tally: &BTreeMap<SubmissionId, VoteCount>) -> BTreeMap<SubmissionId, u64> {
    tally.iter().map(|(sid, vc)| (*sid, vc.0)).collect()
}

fn winning_round(
    round: u32,
    vote_counts: BTreeMap<SubmissionId, u64>,
    winner: SubmissionId,
) -> RoundRecord {
    RoundRecord {
        round,
        vote_counts,
        eliminated: None,
        winner: Some(winner),
        transfers: BTreeMap::new(),
        exhausted: 0,
    }
}

/// Runs the instant-runoff tally.
///
/// Arguments:
/// * `candidates` the submissions of the cycle. Duplicates are ignored.
/// * `ballots` each ballot lists submissions in decreasing order of
///   preference. Ballots are expected to be validated already: the tally
///   simply skips any choice that is not a running candidate.
///
/// The tally never fails:
/// * with no candidate, there is no winner and no round
/// * with candidates but no ballot, the lowest identifier wins in a single
///   round with a count of zero
/// * with a single candidate, it wins in the first round with every ballot
///
/// Otherwise a candidate wins as soon as it holds a strict majority of all
/// the ballots cast (exhausted ballots included). When no one does, the
/// candidate with the fewest votes is eliminated and its ballots move on to
/// their next running choice. Ties for the last place eliminate the lowest
/// identifier. If all the remaining candidates are tied, the lowest
/// identifier wins.
pub fn tally(candidates: &[SubmissionId], ballots: &[Ballot]) -> TallyResult {
    let all_candidates: BTreeSet<SubmissionId> = candidates.iter().cloned().collect();
    info!(
        "tally: processing {} ballots for {} candidates",
        ballots.len(),
        all_candidates.len()
    );

    let first = match all_candidates.iter().next() {
        Some(sid) => *sid,
        None => {
            info!("tally: no candidate, no winner");
            return TallyResult {
                winner: None,
                rounds: vec![],
            };
        }
    };

    if ballots.is_empty() {
        info!("tally: no ballot, {} wins by default", first);
        let counts: BTreeMap<SubmissionId, u64> = [(first, 0)].into_iter().collect();
        return TallyResult {
            winner: Some(first),
            rounds: vec![winning_round(1, counts, first)],
        };
    }

    // Only one candidate. It is the winner by any standard.
    if all_candidates.len() == 1 {
        info!("tally: single candidate {} wins", first);
        let counts: BTreeMap<SubmissionId, u64> =
            [(first, ballots.len() as u64)].into_iter().collect();
        return TallyResult {
            winner: Some(first),
            rounds: vec![winning_round(1, counts, first)],
        };
    }

    let threshold = majority_threshold(ballots.len());
    let mut still_running: BTreeSet<SubmissionId> = all_candidates;
    let mut states: Vec<BallotState> = ballots
        .iter()
        .map(|b| BallotState::new(b.as_slice(), &still_running))
        .collect();
    let mut rounds: Vec<RoundRecord> = Vec::new();

    while still_running.len() > 1 {
        let round_id = rounds.len() as u32 + 1;
        let tally = compute_tally(&states, &still_running);
        info!(
            "Round {} (winning threshold: {}): {:?}",
            round_id, threshold.0, tally
        );

        match decide_round(&tally, threshold) {
            RoundOutcome::Majority(winner) => {
                info!("Round {}: {} -> elected by majority", round_id, winner);
                rounds.push(winning_round(round_id, to_counts(&tally), winner));
                return TallyResult {
                    winner: Some(winner),
                    rounds,
                };
            }
            RoundOutcome::FullTie(winner) => {
                info!(
                    "Round {}: all candidates tied, {} -> elected as lowest identifier",
                    round_id, winner
                );
                rounds.push(winning_round(round_id, to_counts(&tally), winner));
                return TallyResult {
                    winner: Some(winner),
                    rounds,
                };
            }
            RoundOutcome::Eliminated(eliminated) => {
                still_running.remove(&eliminated);

                // Statistics about transfers: where the ballots went, or
                // whether they got exhausted.
                let mut transfers: BTreeMap<SubmissionId, u64> = BTreeMap::new();
                let mut exhausted: u64 = 0;
                for st in states.iter_mut() {
                    if st.current != Some(eliminated) {
                        continue;
                    }
                    st.current = st.preference(&still_running);
                    match st.current {
                        Some(next) => *transfers.entry(next).or_insert(0) += 1,
                        None => exhausted += 1,
                    }
                }
                info!(
                    "Round {}: {} -> eliminated, transfers: {:?}, exhausted: {}",
                    round_id, eliminated, transfers, exhausted
                );
                rounds.push(RoundRecord {
                    round: round_id,
                    vote_counts: to_counts(&tally),
                    eliminated: Some(eliminated),
                    winner: None,
                    transfers,
                    exhausted,
                });
            }
        }
    }

    // The last candidate standing after an elimination. It is credited with
    // the ballots that still support it, not with every ballot cast: exhausted
    // ballots stay out, so a round total never exceeds the one before.
    let last = still_running.iter().next().cloned();
    if let Some(winner) = last {
        let round_id = rounds.len() as u32 + 1;
        let held: VoteCount = states
            .iter()
            .filter(|st| st.current == Some(winner))
            .map(|_| VoteCount(1))
            .sum();
        info!("Round {}: {} -> elected as last candidate", round_id, winner);
        let counts: BTreeMap<SubmissionId, u64> = [(winner, held.0)].into_iter().collect();
        rounds.push(winning_round(round_id, counts, winner));
    }
    TallyResult {
        winner: last,
        rounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: SubmissionId = SubmissionId(1);
    const B: SubmissionId = SubmissionId(2);
    const C: SubmissionId = SubmissionId(3);
    const D: SubmissionId = SubmissionId(4);

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn round_total(r: &RoundRecord) -> u64 {
        r.vote_counts.values().sum()
    }

    #[test]
    fn no_candidate() {
        init();
        let res = tally(&[], &[]);
        assert_eq!(res.winner, None);
        assert!(res.rounds.is_empty());
    }

    #[test]
    fn no_ballot_picks_lowest_identifier() {
        init();
        let res = tally(&[C, B, D], &[]);
        assert_eq!(res.winner, Some(B));
        assert_eq!(res.rounds.len(), 1);
        assert_eq!(res.rounds[0].vote_counts.get(&B), Some(&0));
        assert_eq!(res.rounds[0].winner, Some(B));
    }

    #[test]
    fn single_candidate_takes_all_ballots() {
        init();
        let res = tally(&[A], &[vec![A], vec![A], vec![]]);
        assert_eq!(res.winner, Some(A));
        assert_eq!(res.rounds.len(), 1);
        assert_eq!(res.rounds[0].vote_counts.get(&A), Some(&3));
    }

    #[test]
    fn majority_in_first_round() {
        init();
        let ballots = vec![vec![A, B], vec![A, C], vec![A, B], vec![B, A]];
        let res = tally(&[A, B, C], &ballots);
        assert_eq!(res.winner, Some(A));
        assert_eq!(res.rounds.len(), 1);
        let r = &res.rounds[0];
        assert_eq!(r.winner, Some(A));
        assert_eq!(r.eliminated, None);
        assert_eq!(r.vote_counts.get(&A), Some(&3));
        assert_eq!(r.vote_counts.get(&C), Some(&0));
    }

    #[test]
    fn full_tie_goes_to_lowest_identifier() {
        init();
        let ballots = vec![vec![A, B, C], vec![C, B, A], vec![B, A, C]];
        let res = tally(&[A, B, C], &ballots);
        assert_eq!(res.winner, Some(A));
        assert_eq!(res.rounds.len(), 1);
        assert_eq!(res.rounds[0].winner, Some(A));
    }

    #[test]
    fn elimination_transfers_to_next_choice() {
        init();
        let ballots = vec![vec![A, B], vec![A, B], vec![B, C], vec![C, B]];
        let res = tally(&[A, B, C], &ballots);
        assert_eq!(res.rounds.len(), 2);

        let r1 = &res.rounds[0];
        assert_eq!(r1.winner, None);
        // B and C are tied at 1, B has the lower identifier.
        assert_eq!(r1.eliminated, Some(B));
        assert_eq!(r1.transfers.get(&C), Some(&1));
        assert_eq!(r1.exhausted, 0);

        let r2 = &res.rounds[1];
        assert_eq!(round_total(r2), 4);
        assert_eq!(r2.vote_counts.get(&A), Some(&2));
        assert_eq!(r2.vote_counts.get(&C), Some(&2));
        // 2 - 2 with no majority of 3: the full tie rule applies.
        assert_eq!(res.winner, Some(A));
        assert_eq!(r2.winner, Some(A));
    }

    #[test]
    fn redistribution_reaches_majority() {
        init();
        let ballots = vec![
            vec![A],
            vec![A],
            vec![B, C],
            vec![C],
            vec![C],
            vec![D, B],
        ];
        let res = tally(&[A, B, C, D], &ballots);
        // Round 1: A 2, B 1, C 2, D 1 -> B out, goes to C.
        // Round 2: A 2, C 3, D 1 -> D out, B is gone, exhausted.
        // Round 3: A 2, C 3 -> no majority of 4, A out.
        // Round 4: C alone.
        assert_eq!(res.rounds[0].eliminated, Some(B));
        assert_eq!(res.rounds[0].transfers.get(&C), Some(&1));
        assert_eq!(res.rounds[1].eliminated, Some(D));
        assert_eq!(res.rounds[1].exhausted, 1);
        assert_eq!(res.rounds[2].eliminated, Some(A));
        assert_eq!(res.rounds[2].exhausted, 2);
        assert_eq!(res.winner, Some(C));
        let last = res.rounds.last().unwrap();
        assert_eq!(last.winner, Some(C));
        assert_eq!(last.vote_counts.get(&C), Some(&3));
    }

    #[test]
    fn last_candidate_keeps_only_live_ballots() {
        init();
        // A 2, B 1, C 1: B out and exhausted. A 2, C 1: C out and exhausted.
        let ballots = vec![vec![A], vec![A], vec![B], vec![C]];
        let res = tally(&[A, B, C], &ballots);
        assert_eq!(res.winner, Some(A));
        assert_eq!(res.rounds.len(), 3);
        assert_eq!(res.rounds[0].eliminated, Some(B));
        assert_eq!(res.rounds[1].eliminated, Some(C));
        let last = &res.rounds[2];
        assert_eq!(last.winner, Some(A));
        assert_eq!(last.eliminated, None);
        // 2 of the 4 ballots still count, the 2 exhausted ones do not.
        assert_eq!(round_total(last), 2);
        assert_eq!(
            round_total(last) + res.rounds[0].exhausted + res.rounds[1].exhausted,
            ballots.len() as u64
        );
    }

    #[test]
    fn round_totals_never_exceed_ballots() {
        init();
        let ballots = vec![
            vec![A, D],
            vec![B],
            vec![C, A],
            vec![D, C, B],
            vec![A],
            vec![B, C],
            vec![C],
        ];
        let res = tally(&[A, B, C, D], &ballots);
        assert!(res.winner.is_some());
        let mut previous = u64::MAX;
        for r in res.rounds.iter() {
            let total = round_total(r);
            assert!(total <= ballots.len() as u64);
            // Exhausted ballots never come back.
            assert!(total <= previous);
            previous = total;
        }
        let eliminated: Vec<SubmissionId> =
            res.rounds.iter().filter_map(|r| r.eliminated).collect();
        assert!(!eliminated.contains(&res.winner.unwrap()));
    }

    #[test]
    fn unknown_choices_are_skipped() {
        init();
        let ballots = vec![vec![SubmissionId(99), B], vec![B], vec![A]];
        let res = tally(&[A, B], &ballots);
        assert_eq!(res.winner, Some(B));
        assert_eq!(res.rounds[0].vote_counts.get(&B), Some(&2));
    }
}

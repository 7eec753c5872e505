use std::collections::BTreeSet;

use log::debug;

use crate::config::*;

/// A builder for assembling the ballots of a cycle before a tally.
///
/// Stored votes carry explicit ranks that may have gaps. The builder sorts
/// them into ballots ordered by preference.
///
/// ```
/// use cycle_voting::builder::Builder;
/// use cycle_voting::SubmissionId;
///
/// let mut builder = Builder::new().candidates(&[SubmissionId(1), SubmissionId(2)]);
///
/// builder.add_ballot(&[SubmissionId(2), SubmissionId(1)]);
/// builder.add_ballot(&[SubmissionId(2)]);
///
/// let res = builder.tally();
/// assert_eq!(res.winner, Some(SubmissionId(2)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    pub(crate) _candidates: BTreeSet<SubmissionId>,
    pub(crate) _ballots: Vec<Ballot>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    pub fn candidates(self, cands: &[SubmissionId]) -> Builder {
        Builder {
            _candidates: cands.iter().cloned().collect(),
            _ballots: self._ballots,
        }
    }

    /// Uses the submissions of a cycle as the candidates.
    pub fn submissions(self, submissions: &[Submission]) -> Builder {
        let cands: Vec<SubmissionId> = submissions.iter().map(|s| s.id).collect();
        self.candidates(&cands)
    }

    /// Adds a ballot already in order of preference.
    pub fn add_ballot(&mut self, choices: &[SubmissionId]) {
        self._ballots.push(choices.to_vec());
    }

    /// Adds a stored vote. Only the relative order of the ranks matters.
    pub fn add_vote(&mut self, vote: &Vote) {
        let ballot = ordered_ballot(&vote.rankings);
        debug!("add_vote: vote {:?} -> {:?}", vote.id, ballot);
        self._ballots.push(ballot);
    }

    pub fn num_ballots(&self) -> usize {
        self._ballots.len()
    }

    pub fn tally(&self) -> TallyResult {
        let cands: Vec<SubmissionId> = self._candidates.iter().cloned().collect();
        crate::tally(&cands, &self._ballots)
    }
}

/// Orders rankings by rank value, most preferred first.
pub fn ordered_ballot(rankings: &[Ranking]) -> Ballot {
    let mut sorted: Vec<Ranking> = rankings.to_vec();
    sorted.sort_by_key(|r| r.rank);
    sorted.iter().map(|r| r.submission_id).collect()
}

/// Tallies the stored votes of a cycle against its submissions.
pub fn tally_votes(submissions: &[Submission], votes: &[Vote]) -> TallyResult {
    let mut builder = Builder::new().submissions(submissions);
    for v in votes.iter() {
        builder.add_vote(v);
    }
    builder.tally()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn vote(id: u64, rankings: &[(u64, u32)]) -> Vote {
        Vote {
            id: VoteId(id),
            cycle_id: CycleId(1),
            participant_id: ParticipantId(id),
            rankings: rankings
                .iter()
                .map(|(sid, rank)| Ranking {
                    submission_id: SubmissionId(*sid),
                    rank: *rank,
                })
                .collect(),
            voted_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn ranks_with_gaps_keep_their_order() {
        let v = vote(1, &[(3, 10), (1, 2), (2, 5)]);
        assert_eq!(
            ordered_ballot(&v.rankings),
            vec![SubmissionId(1), SubmissionId(2), SubmissionId(3)]
        );
    }

    #[test]
    fn builder_collects_votes() {
        let mut b = Builder::new().candidates(&[SubmissionId(1), SubmissionId(2), SubmissionId(3)]);
        b.add_vote(&vote(1, &[(3, 1), (1, 2)]));
        b.add_vote(&vote(2, &[(3, 4)]));
        b.add_vote(&vote(3, &[(1, 1)]));
        assert_eq!(b.num_ballots(), 3);
        let res = b.tally();
        assert_eq!(res.winner, Some(SubmissionId(3)));
    }
}

// Fixtures shared by the unit tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::config::*;
use crate::memory::MemoryStore;
use crate::store::*;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap()
}

pub fn ranking_rules() -> Vec<RankingRule> {
    vec![
        RankingRule {
            min_papers: 1,
            max_papers: Some(3),
            required_rankings: 1,
        },
        RankingRule {
            min_papers: 4,
            max_papers: None,
            required_rankings: 3,
        },
    ]
}

/// A group with a cadence of 14 days, 3 of them for voting.
pub fn add_group(store: &MemoryStore, id: u64) -> Group {
    let g = Group {
        id: GroupId(id),
        name: format!("group {}", id),
        cadence: Cadence {
            cadence_days: 14,
            voting_days: 3,
        },
        created_at: t0(),
    };
    store.add_group(g.clone(), ranking_rules()).unwrap();
    for p in 1..=10 {
        store
            .add_participant(Participant {
                id: ParticipantId(id * 100 + p),
                group_id: GroupId(id),
                display_name: format!("member {}", p),
                registered_at: t0(),
            })
            .unwrap();
    }
    g
}

/// The participant `p` of group `group`.
pub fn member(group: u64, p: u64) -> ParticipantId {
    ParticipantId(group * 100 + p)
}

pub fn add_cycle(store: &MemoryStore, group: u64, number: u32, start: DateTime<Utc>) -> Cycle {
    let cadence = store.group(GroupId(group)).unwrap().unwrap().cadence;
    store
        .insert_cycle(NewCycle {
            group_id: GroupId(group),
            number,
            window: cadence.window_starting_at(start).unwrap(),
            created_at: start,
        })
        .unwrap()
}

pub fn add_submissions(store: &MemoryStore, cycle_id: CycleId, count: u64) -> Vec<SubmissionId> {
    let cycle = store.cycle(cycle_id).unwrap().unwrap();
    (1..=count)
        .map(|i| {
            store
                .insert_submission(
                    NewSubmission {
                        cycle_id,
                        participant_id: member(cycle.group_id.0, i),
                        title: format!("paper {}", i),
                        url: format!("https://example.org/{}", i),
                        publication_date: None,
                        recommendation: None,
                    },
                    cycle.window.submission_start,
                )
                .unwrap()
                .id
        })
        .collect()
}

pub fn add_vote(store: &MemoryStore, cycle_id: CycleId, voter: u64, choices: &[SubmissionId]) {
    let cycle = store.cycle(cycle_id).unwrap().unwrap();
    store
        .insert_vote(NewVote {
            cycle_id,
            participant_id: member(cycle.group_id.0, voter),
            rankings: choices
                .iter()
                .enumerate()
                .map(|(idx, sid)| Ranking {
                    submission_id: *sid,
                    rank: idx as u32 + 1,
                })
                .collect(),
            voted_at: cycle.window.voting_start,
        })
        .unwrap();
}

/// Wraps a store to replay what racing or failing callers observe.
pub struct FlakyStore<'a> {
    pub inner: &'a MemoryStore,
    /// When set, reads report this cycle as the latest one, with neither a
    /// result nor a successor.
    pub stale_latest: Option<Cycle>,
    /// Every read about this group fails.
    pub broken_group: Option<GroupId>,
}

impl<'a> FlakyStore<'a> {
    fn check(&self, group_id: GroupId) -> StoreResult<()> {
        if self.broken_group == Some(group_id) {
            return UnavailableSnafu {
                message: format!("group {} is unreachable", group_id),
            }
            .fail();
        }
        Ok(())
    }
}

impl<'a> CycleStore for FlakyStore<'a> {
    fn group(&self, group_id: GroupId) -> StoreResult<Option<Group>> {
        self.check(group_id)?;
        self.inner.group(group_id)
    }

    fn group_ids(&self) -> StoreResult<Vec<GroupId>> {
        self.inner.group_ids()
    }

    fn ranking_rules(&self, group_id: GroupId) -> StoreResult<Vec<RankingRule>> {
        self.check(group_id)?;
        self.inner.ranking_rules(group_id)
    }

    fn participant(&self, participant_id: ParticipantId) -> StoreResult<Option<Participant>> {
        self.inner.participant(participant_id)
    }

    fn latest_cycle(&self, group_id: GroupId) -> StoreResult<Option<Cycle>> {
        self.check(group_id)?;
        if let Some(c) = self.stale_latest.clone() {
            return Ok(Some(c));
        }
        self.inner.latest_cycle(group_id)
    }

    fn cycle(&self, cycle_id: CycleId) -> StoreResult<Option<Cycle>> {
        self.inner.cycle(cycle_id)
    }

    fn cycle_by_number(&self, group_id: GroupId, number: u32) -> StoreResult<Option<Cycle>> {
        self.check(group_id)?;
        if self.stale_latest.is_some() {
            return Ok(None);
        }
        self.inner.cycle_by_number(group_id, number)
    }

    fn submission(&self, submission_id: SubmissionId) -> StoreResult<Option<Submission>> {
        self.inner.submission(submission_id)
    }

    fn submissions(&self, cycle_id: CycleId) -> StoreResult<Vec<Submission>> {
        self.inner.submissions(cycle_id)
    }

    fn votes(&self, cycle_id: CycleId) -> StoreResult<Vec<Vote>> {
        self.inner.votes(cycle_id)
    }

    fn cycle_result(&self, cycle_id: CycleId) -> StoreResult<Option<CycleResult>> {
        if self.stale_latest.is_some() {
            return Ok(None);
        }
        self.inner.cycle_result(cycle_id)
    }

    fn insert_cycle(&self, cycle: NewCycle) -> StoreResult<Cycle> {
        self.inner.insert_cycle(cycle)
    }

    fn insert_cycle_result(&self, result: CycleResult) -> StoreResult<()> {
        self.inner.insert_cycle_result(result)
    }

    fn close_voting(&self, cycle_id: CycleId, at: DateTime<Utc>) -> StoreResult<Cycle> {
        self.inner.close_voting(cycle_id, at)
    }

    fn insert_submission(
        &self,
        submission: NewSubmission,
        at: DateTime<Utc>,
    ) -> StoreResult<Submission> {
        self.inner.insert_submission(submission, at)
    }

    fn delete_submission(&self, submission_id: SubmissionId) -> StoreResult<()> {
        self.inner.delete_submission(submission_id)
    }

    fn insert_vote(&self, vote: NewVote) -> StoreResult<Vote> {
        self.inner.insert_vote(vote)
    }

    fn update_cadence(&self, group_id: GroupId, cadence: Cadence) -> StoreResult<Group> {
        self.inner.update_cadence(group_id, cadence)
    }

    fn replace_ranking_rules(
        &self,
        group_id: GroupId,
        rules: Vec<RankingRule>,
    ) -> StoreResult<()> {
        self.inner.replace_ranking_rules(group_id, rules)
    }
}

//! An in-memory store.
//!
//! It enforces the uniqueness constraints itself and can be saved to and
//! restored from a JSON snapshot.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::*;
use crate::store::*;

/// The full content of a store.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(rename = "rankingRules", default)]
    pub ranking_rules: BTreeMap<GroupId, Vec<RankingRule>>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub cycles: Vec<Cycle>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
    #[serde(default)]
    pub votes: Vec<Vote>,
    #[serde(rename = "cycleResults", default)]
    pub results: Vec<CycleResult>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> MemoryStore {
        MemoryStore {
            state: Mutex::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> StoreResult<Snapshot> {
        Ok(self.state()?.clone())
    }

    /// Registers a group with its ranking rules.
    pub fn add_group(&self, group: Group, rules: Vec<RankingRule>) -> StoreResult<()> {
        let mut st = self.state()?;
        if st.groups.iter().any(|g| g.id == group.id) {
            return ConflictSnafu {
                constraint: format!("group {}", group.id),
            }
            .fail();
        }
        st.ranking_rules.insert(group.id, rules);
        st.groups.push(group);
        Ok(())
    }

    pub fn add_participant(&self, participant: Participant) -> StoreResult<()> {
        let mut st = self.state()?;
        if st.participants.iter().any(|p| p.id == participant.id) {
            return ConflictSnafu {
                constraint: format!("participant {}", participant.id),
            }
            .fail();
        }
        st.participants.push(participant);
        Ok(())
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, Snapshot>> {
        self.state.lock().map_err(|e| StoreError::Unavailable {
            message: format!("poisoned lock: {}", e),
        })
    }
}

fn next_id(ids: impl Iterator<Item = u64>) -> u64 {
    ids.max().unwrap_or(0) + 1
}

impl CycleStore for MemoryStore {
    fn group(&self, group_id: GroupId) -> StoreResult<Option<Group>> {
        Ok(self.state()?.groups.iter().find(|g| g.id == group_id).cloned())
    }

    fn group_ids(&self) -> StoreResult<Vec<GroupId>> {
        Ok(self.state()?.groups.iter().map(|g| g.id).collect())
    }

    fn ranking_rules(&self, group_id: GroupId) -> StoreResult<Vec<RankingRule>> {
        Ok(self
            .state()?
            .ranking_rules
            .get(&group_id)
            .cloned()
            .unwrap_or_default())
    }

    fn participant(&self, participant_id: ParticipantId) -> StoreResult<Option<Participant>> {
        Ok(self
            .state()?
            .participants
            .iter()
            .find(|p| p.id == participant_id)
            .cloned())
    }

    fn latest_cycle(&self, group_id: GroupId) -> StoreResult<Option<Cycle>> {
        Ok(self
            .state()?
            .cycles
            .iter()
            .filter(|c| c.group_id == group_id)
            .max_by_key(|c| c.number)
            .cloned())
    }

    fn cycle(&self, cycle_id: CycleId) -> StoreResult<Option<Cycle>> {
        Ok(self.state()?.cycles.iter().find(|c| c.id == cycle_id).cloned())
    }

    fn cycle_by_number(&self, group_id: GroupId, number: u32) -> StoreResult<Option<Cycle>> {
        Ok(self
            .state()?
            .cycles
            .iter()
            .find(|c| c.group_id == group_id && c.number == number)
            .cloned())
    }

    fn submission(&self, submission_id: SubmissionId) -> StoreResult<Option<Submission>> {
        Ok(self
            .state()?
            .submissions
            .iter()
            .find(|s| s.id == submission_id)
            .cloned())
    }

    fn submissions(&self, cycle_id: CycleId) -> StoreResult<Vec<Submission>> {
        Ok(self
            .state()?
            .submissions
            .iter()
            .filter(|s| s.cycle_id == cycle_id)
            .cloned()
            .collect())
    }

    fn votes(&self, cycle_id: CycleId) -> StoreResult<Vec<Vote>> {
        Ok(self
            .state()?
            .votes
            .iter()
            .filter(|v| v.cycle_id == cycle_id)
            .cloned()
            .collect())
    }

    fn cycle_result(&self, cycle_id: CycleId) -> StoreResult<Option<CycleResult>> {
        Ok(self
            .state()?
            .results
            .iter()
            .find(|r| r.cycle_id == cycle_id)
            .cloned())
    }

    fn insert_cycle(&self, cycle: NewCycle) -> StoreResult<Cycle> {
        let mut st = self.state()?;
        if st
            .cycles
            .iter()
            .any(|c| c.group_id == cycle.group_id && c.number == cycle.number)
        {
            return ConflictSnafu {
                constraint: format!("cycle ({}, {})", cycle.group_id, cycle.number),
            }
            .fail();
        }
        let stored = Cycle {
            id: CycleId(next_id(st.cycles.iter().map(|c| c.id.0))),
            group_id: cycle.group_id,
            number: cycle.number,
            window: cycle.window,
            created_at: cycle.created_at,
        };
        debug!("insert_cycle: {:?}", stored);
        st.cycles.push(stored.clone());
        Ok(stored)
    }

    fn insert_cycle_result(&self, result: CycleResult) -> StoreResult<()> {
        let mut st = self.state()?;
        if st.results.iter().any(|r| r.cycle_id == result.cycle_id) {
            return ConflictSnafu {
                constraint: format!("cycle result {}", result.cycle_id),
            }
            .fail();
        }
        debug!("insert_cycle_result: {:?}", result);
        st.results.push(result);
        Ok(())
    }

    fn close_voting(&self, cycle_id: CycleId, at: DateTime<Utc>) -> StoreResult<Cycle> {
        let mut st = self.state()?;
        let c = st
            .cycles
            .iter_mut()
            .find(|c| c.id == cycle_id)
            .ok_or_else(|| StoreError::Unavailable {
                message: format!("cycle {} vanished", cycle_id),
            })?;
        c.window.voting_end = at;
        Ok(c.clone())
    }

    fn insert_submission(
        &self,
        submission: NewSubmission,
        at: DateTime<Utc>,
    ) -> StoreResult<Submission> {
        let mut st = self.state()?;
        let stored = Submission {
            id: SubmissionId(next_id(st.submissions.iter().map(|s| s.id.0))),
            cycle_id: submission.cycle_id,
            participant_id: submission.participant_id,
            title: submission.title,
            url: submission.url,
            publication_date: submission.publication_date,
            recommendation: submission.recommendation,
            submitted_at: at,
        };
        st.submissions.push(stored.clone());
        Ok(stored)
    }

    fn delete_submission(&self, submission_id: SubmissionId) -> StoreResult<()> {
        self.state()?.submissions.retain(|s| s.id != submission_id);
        Ok(())
    }

    fn insert_vote(&self, vote: NewVote) -> StoreResult<Vote> {
        let mut st = self.state()?;
        if st
            .votes
            .iter()
            .any(|v| v.cycle_id == vote.cycle_id && v.participant_id == vote.participant_id)
        {
            return ConflictSnafu {
                constraint: format!("vote ({}, {})", vote.cycle_id, vote.participant_id),
            }
            .fail();
        }
        let stored = Vote {
            id: VoteId(next_id(st.votes.iter().map(|v| v.id.0))),
            cycle_id: vote.cycle_id,
            participant_id: vote.participant_id,
            rankings: vote.rankings,
            voted_at: vote.voted_at,
        };
        st.votes.push(stored.clone());
        Ok(stored)
    }

    fn update_cadence(&self, group_id: GroupId, cadence: Cadence) -> StoreResult<Group> {
        let mut st = self.state()?;
        let g = st
            .groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| StoreError::Unavailable {
                message: format!("group {} vanished", group_id),
            })?;
        g.cadence = cadence;
        Ok(g.clone())
    }

    fn replace_ranking_rules(
        &self,
        group_id: GroupId,
        rules: Vec<RankingRule>,
    ) -> StoreResult<()> {
        self.state()?.ranking_rules.insert(group_id, rules);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn new_cycle(group: u64, number: u32) -> NewCycle {
        NewCycle {
            group_id: GroupId(group),
            number,
            window: Cadence::new(7, 2).unwrap().window_starting_at(t0()).unwrap(),
            created_at: t0(),
        }
    }

    #[test]
    fn cycle_numbers_are_unique_per_group() {
        let store = MemoryStore::new();
        let c1 = store.insert_cycle(new_cycle(1, 1)).unwrap();
        let c2 = store.insert_cycle(new_cycle(2, 1)).unwrap();
        assert_ne!(c1.id, c2.id);
        let err = store.insert_cycle(new_cycle(1, 1)).unwrap_err();
        assert!(err.is_conflict());
        store.insert_cycle(new_cycle(1, 2)).unwrap();
        assert_eq!(store.latest_cycle(GroupId(1)).unwrap().unwrap().number, 2);
        assert_eq!(store.cycle_by_number(GroupId(2), 1).unwrap(), Some(c2));
    }

    #[test]
    fn one_result_per_cycle() {
        let store = MemoryStore::new();
        let res = CycleResult {
            cycle_id: CycleId(1),
            winning_submission_id: None,
            total_votes: 0,
            elimination_rounds: vec![],
            calculated_at: t0(),
        };
        store.insert_cycle_result(res.clone()).unwrap();
        assert!(store.insert_cycle_result(res).unwrap_err().is_conflict());
    }

    #[test]
    fn one_vote_per_participant() {
        let store = MemoryStore::new();
        let v = NewVote {
            cycle_id: CycleId(1),
            participant_id: ParticipantId(7),
            rankings: vec![],
            voted_at: t0(),
        };
        store.insert_vote(v.clone()).unwrap();
        assert!(store.insert_vote(v.clone()).unwrap_err().is_conflict());
        let other = NewVote {
            cycle_id: CycleId(2),
            ..v
        };
        store.insert_vote(other).unwrap();
        assert_eq!(store.votes(CycleId(1)).unwrap().len(), 1);
    }

    #[test]
    fn snapshot_as_json() {
        let store = MemoryStore::new();
        store
            .add_group(
                Group {
                    id: GroupId(3),
                    name: "papers".to_string(),
                    cadence: Cadence::new(14, 3).unwrap(),
                    created_at: t0(),
                },
                vec![RankingRule {
                    min_papers: 1,
                    max_papers: None,
                    required_rankings: 3,
                }],
            )
            .unwrap();
        store.insert_cycle(new_cycle(3, 1)).unwrap();
        let js = serde_json::to_string(&store.snapshot().unwrap()).unwrap();
        let back: Snapshot = serde_json::from_str(&js).unwrap();
        assert_eq!(back, store.snapshot().unwrap());
        assert!(js.contains("\"cycleNumber\":1"));
        assert!(js.contains("\"cadenceDays\":14"));
    }
}

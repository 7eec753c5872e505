//! How many choices a ballot may hold, and whether a ballot is acceptable.

use std::collections::HashSet;

use log::debug;
use snafu::{ensure, OptionExt};

use crate::config::*;

impl RankingRule {
    pub fn applies_to(&self, submission_count: u32) -> bool {
        self.min_papers <= submission_count
            && self.max_papers.map_or(true, |max| submission_count <= max)
    }
}

/// Resolves the number of choices for a cycle with `submission_count`
/// submissions.
///
/// Among the rules covering this count, the one with the greatest lower
/// bound wins. A ballot must rank at least one submission.
pub fn required_choices(submission_count: u32, rules: &[RankingRule]) -> CvResult<ChoiceRange> {
    let rule = rules
        .iter()
        .filter(|r| r.applies_to(submission_count))
        .max_by_key(|r| r.min_papers)
        .context(NoApplicableRankingRuleSnafu { submission_count })?;
    debug!(
        "required_choices: {} submissions -> rule {:?}",
        submission_count, rule
    );
    Ok(ChoiceRange {
        min: 1,
        max: rule.required_rankings,
    })
}

/// Checks that a set of rules leaves no gap for any submission count at or
/// above the lowest lower bound, and that no two rules share a lower bound.
pub fn check_rule_coverage(rules: &[RankingRule]) -> CvResult<()> {
    let mut sorted: Vec<RankingRule> = rules.to_vec();
    sorted.sort_by_key(|r| r.min_papers);

    // Rules sharing a lower bound would make the resolved rule depend on
    // their storage order.
    for pair in sorted.windows(2) {
        ensure!(
            pair[0].min_papers != pair[1].min_papers,
            RankingRuleGapSnafu {
                message: format!("several rules start at {} submissions", pair[0].min_papers),
            }
        );
    }

    for r in sorted.iter() {
        ensure!(
            r.required_rankings > 0,
            RankingRuleGapSnafu {
                message: format!("rule starting at {} requires no ranking", r.min_papers),
            }
        );
        if let Some(max) = r.max_papers {
            ensure!(
                max >= r.min_papers,
                RankingRuleGapSnafu {
                    message: format!("rule range {}..={} is empty", r.min_papers, max),
                }
            );
        }
    }

    // The highest reach so far. None means unbounded.
    let mut covered_up_to: Option<Option<u32>> = None;
    for r in sorted.iter() {
        match covered_up_to {
            None => {}
            Some(None) => {
                // Already unbounded, later rules only narrow the match.
                continue;
            }
            Some(Some(reach)) => {
                ensure!(
                    r.min_papers <= reach.saturating_add(1),
                    RankingRuleGapSnafu {
                        message: format!(
                            "no rule covers {} to {} submissions",
                            reach + 1,
                            r.min_papers - 1
                        ),
                    }
                );
            }
        }
        covered_up_to = match (covered_up_to, r.max_papers) {
            (_, None) => Some(None),
            (None, Some(max)) => Some(Some(max)),
            (Some(Some(reach)), Some(max)) => Some(Some(reach.max(max))),
            (Some(None), Some(_)) => Some(None),
        };
    }

    if let Some(Some(reach)) = covered_up_to {
        return RankingRuleGapSnafu {
            message: format!("no rule covers more than {} submissions", reach),
        }
        .fail();
    }
    Ok(())
}

/// Validates the rankings of a ballot against the submissions of the cycle
/// and the allowed number of choices.
///
/// Ranks do not need to be contiguous, only positive and unique. The ballot
/// is returned in order of preference.
pub fn validate_ballot(
    rankings: &[Ranking],
    cycle_submissions: &HashSet<SubmissionId>,
    choices: ChoiceRange,
) -> CvResult<Ballot> {
    let problem = |problem: BallotProblem| InvalidBallotSnafu { problem }.fail();

    if rankings.len() < choices.min as usize {
        return problem(BallotProblem::Empty);
    }
    if rankings.len() > choices.max as usize {
        return problem(BallotProblem::TooManyChoices {
            given: rankings.len(),
            max: choices.max,
        });
    }

    let mut seen_ranks: HashSet<u32> = HashSet::new();
    let mut seen_submissions: HashSet<SubmissionId> = HashSet::new();
    for r in rankings.iter() {
        if r.rank == 0 {
            return problem(BallotProblem::NonPositiveRank);
        }
        if !seen_ranks.insert(r.rank) {
            return problem(BallotProblem::DuplicateRank(r.rank));
        }
        if !seen_submissions.insert(r.submission_id) {
            return problem(BallotProblem::DuplicateSubmission(r.submission_id));
        }
        if !cycle_submissions.contains(&r.submission_id) {
            return problem(BallotProblem::ForeignSubmission(r.submission_id));
        }
    }

    Ok(crate::builder::ordered_ballot(rankings))
}

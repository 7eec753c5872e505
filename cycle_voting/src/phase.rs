//! Phases of a cycle and the arithmetic of cycle windows.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use snafu::ensure;

use crate::config::*;

/// Maps a cycle window and an instant to the phase of the cycle at that
/// instant.
///
/// Each window is half-open: a cycle is in submission on
/// `[submission_start, submission_end)` and in voting on
/// `[voting_start, voting_end)`. Anything after the submission start that is
/// in neither window counts as completed, including a gap between the two
/// windows.
pub fn evaluate_phase(window: &CycleWindow, now: DateTime<Utc>) -> Phase {
    if now < window.submission_start {
        Phase::Pending
    } else if now < window.submission_end {
        Phase::Submission
    } else if window.voting_start <= now && now < window.voting_end {
        Phase::Voting
    } else {
        Phase::Completed
    }
}

impl Cycle {
    pub fn phase(&self, now: DateTime<Utc>) -> Phase {
        evaluate_phase(&self.window, now)
    }
}

impl CycleWindow {
    pub fn is_well_formed(&self) -> bool {
        self.submission_start <= self.submission_end
            && self.submission_end <= self.voting_start
            && self.voting_start <= self.voting_end
    }
}

impl Cadence {
    pub fn new(cadence_days: u32, voting_days: u32) -> CvResult<Cadence> {
        let c = Cadence {
            cadence_days,
            voting_days,
        };
        c.validate()?;
        Ok(c)
    }

    /// Both windows must last at least a day.
    pub fn validate(&self) -> CvResult<()> {
        ensure!(
            self.voting_days > 0 && self.voting_days < self.cadence_days,
            InvalidCadenceSnafu {
                cadence_days: self.cadence_days,
                voting_days: self.voting_days,
            }
        );
        Ok(())
    }

    pub fn submission_days(&self) -> u32 {
        self.cadence_days.saturating_sub(self.voting_days)
    }

    /// The window of a cycle starting at `start`. The voting window opens
    /// exactly when the submission window closes.
    pub fn window_starting_at(&self, start: DateTime<Utc>) -> CvResult<CycleWindow> {
        self.validate()?;
        let submission_end = start + Duration::days(self.submission_days() as i64);
        let voting_end = submission_end + Duration::days(self.voting_days as i64);
        let window = CycleWindow {
            submission_start: start,
            submission_end,
            voting_start: submission_end,
            voting_end,
        };
        debug!("window_starting_at: {:?} -> {:?}", start, window);
        Ok(window)
    }
}

/// The successor of a cycle: numbered one more, starting right when the
/// voting of the previous one ends.
pub fn next_cycle(previous: &Cycle, cadence: &Cadence, now: DateTime<Utc>) -> CvResult<NewCycle> {
    Ok(NewCycle {
        group_id: previous.group_id,
        number: previous.number + 1,
        window: cadence.window_starting_at(previous.window.voting_end)?,
        created_at: now,
    })
}

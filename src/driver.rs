use log::{debug, info, warn};

use cycle_voting::clock::{Clock, FixedClock, SystemClock};
use cycle_voting::memory::{MemoryStore, Snapshot};
use cycle_voting::rollover::{run_rollover_for_all_groups, run_rollover_pass, FleetReport};
use cycle_voting::store::StoreError;
use cycle_voting::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::driver::settings::DriverSettings;

pub mod settings;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson { source: std::io::Error, path: String },
    #[snafu(display("Error writing file {path}"))]
    WritingJson { source: std::io::Error, path: String },
    #[snafu(display("Invalid JSON content in {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Could not produce the JSON output"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Invalid RFC 3339 timestamp: {value}"))]
    ParsingTime {
        source: chrono::ParseError,
        value: String,
    },
    #[snafu(display("No state file: use --state or statePath in the configuration"))]
    MissingState {},
    #[snafu(display("The interval between passes must be at least one second"))]
    ZeroInterval {},
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StoreError },
    #[snafu(display("{source}"))]
    Voting { source: CycleError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CliResult<T> = Result<T, CliError>;

/// The input of `cyclevote tally`.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TallyInput {
    pub candidates: Vec<SubmissionId>,
    #[serde(default)]
    pub ballots: Vec<Ballot>,
}

fn read_json_value(path: &str) -> CliResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read content: {:?}", contents);
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
}

fn read_tally_input(path: &str) -> CliResult<TallyInput> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(&contents).context(ParsingJsonSnafu { path })
}

fn build_summary_js(input: &TallyInput, result: &TallyResult) -> CliResult<JSValue> {
    let rounds = serde_json::to_value(&result.rounds).context(SerializingJsonSnafu)?;
    Ok(json!({
        "candidates": input.candidates,
        "totalBallots": input.ballots.len(),
        "winner": result.winner,
        "rounds": rounds,
    }))
}

fn write_output(out: Option<String>, content: &str) -> CliResult<()> {
    match out.as_deref() {
        None | Some("") | Some("stdout") => {
            println!("{}", content);
            Ok(())
        }
        Some(path) => fs::write(path, content).context(WritingJsonSnafu { path }),
    }
}

/// Runs the tally on a file of ballots and prints its summary.
///
/// With a reference summary, fails if the two summaries differ.
pub fn run_tally(input_path: &str, out: Option<String>, reference: Option<String>) -> CliResult<()> {
    let input = read_tally_input(input_path)?;
    info!(
        "run_tally: {} candidates, {} ballots",
        input.candidates.len(),
        input.ballots.len()
    );

    let result = tally(&input.candidates, &input.ballots);
    let result_js = build_summary_js(&input, &result)?;
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(SerializingJsonSnafu)?;
    write_output(out, &pretty_js_stats)?;

    if let Some(summary_p) = reference {
        let summary_ref = read_json_value(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu)?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary {}", summary_p);
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }
    Ok(())
}

fn read_state(path: &str) -> CliResult<Snapshot> {
    if !Path::new(path).exists() {
        info!("read_state: {} does not exist, starting from an empty state", path);
        return Ok(Snapshot::default());
    }
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(&contents).context(ParsingJsonSnafu { path })
}

// The state is written next to its final location first, so that a reader
// never sees a partial file.
fn write_state(path: &str, snapshot: &Snapshot) -> CliResult<()> {
    let contents = serde_json::to_string_pretty(snapshot).context(SerializingJsonSnafu)?;
    let tmp = format!("{}.tmp", path);
    fs::write(&tmp, contents).context(WritingJsonSnafu { path: tmp.as_str() })?;
    fs::rename(&tmp, path).context(WritingJsonSnafu { path })
}

fn run_selected_groups<C: Clock + ?Sized>(
    store: &MemoryStore,
    clock: &C,
    group_ids: &[GroupId],
) -> FleetReport {
    let mut report = FleetReport::default();
    for group_id in group_ids.iter().cloned() {
        match run_rollover_pass(store, clock, group_id) {
            Ok(outcome) => {
                if outcome.processed() {
                    report.groups_advanced += 1;
                }
                report.outcomes.push((group_id, outcome));
            }
            Err(e) => {
                warn!("run_selected_groups: group {}: {}", group_id, e);
                report.failures.push((group_id, e));
            }
        }
    }
    report
}

/// Runs one rollover pass over the state file and writes the state back.
pub fn run_pass<C: Clock + ?Sized>(settings: &DriverSettings, clock: &C) -> CliResult<FleetReport> {
    let store = MemoryStore::from_snapshot(read_state(&settings.state_path)?);
    let report = match settings.groups.as_ref() {
        Some(ids) => run_selected_groups(&store, clock, ids),
        None => run_rollover_for_all_groups(&store, clock).context(VotingSnafu)?,
    };
    for (group_id, outcome) in report.outcomes.iter() {
        debug!("run_pass: group {}: {:?}", group_id, outcome);
    }
    let snapshot = store.snapshot().context(StorageSnafu)?;
    write_state(&settings.state_path, &snapshot)?;
    Ok(report)
}

/// Runs the rollover passes: once, a fixed number of times or forever,
/// depending on the settings.
pub fn run_rollover(settings: &DriverSettings) -> CliResult<()> {
    info!("run_rollover: settings: {:?}", settings);
    let clock: Box<dyn Clock> = match settings.now {
        Some(t) => Box::new(FixedClock(t)),
        None => Box::new(SystemClock),
    };

    let mut pass_idx: u32 = 0;
    loop {
        pass_idx += 1;
        let report = run_pass(settings, clock.as_ref())?;
        info!(
            "run_rollover: pass {}: {} groups advanced, {} failures",
            pass_idx,
            report.groups_advanced,
            report.failures.len()
        );
        for (group_id, e) in report.failures.iter() {
            eprintln!("group {}: {}", group_id, e);
        }

        if settings.passes.map_or(false, |n| pass_idx >= n) {
            return Ok(());
        }
        match settings.interval_seconds {
            Some(secs) => thread::sleep(Duration::from_secs(secs)),
            None => return Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) fn temp_path(name: &str) -> String {
    std::env::temp_dir()
        .join(format!("cyclevote_{}_{}.json", name, std::process::id()))
        .display()
        .to_string()
}

#[cfg(test)]
fn run_tally_test(test_name: &str, input_lpath: &str, summary_lpath: &str) -> CliResult<()> {
    let test_dir = option_env!("CYCLEVOTE_TEST_DIR")
        .unwrap_or(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data"));
    info!("Running test {}", test_name);
    let out = format!("{}_out", test_name);
    run_tally(
        &format!("{}/{}/{}", test_dir, test_name, input_lpath),
        Some(temp_path(&out)),
        Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
    )
}

#[cfg(test)]
pub fn test_wrapper(test_name: &str) {
    let res = run_tally_test(
        test_name,
        format!("{}_ballots.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    );
    if let Err(e) = res {
        panic!("test {} failed: {}", test_name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cycle_voting::rollover::PassOutcome;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn majority_first_round() {
        init();
        test_wrapper("majority_first_round");
    }

    #[test]
    fn transfer_chain() {
        init();
        test_wrapper("transfer_chain");
    }

    #[test]
    fn exhausted_ballots() {
        init();
        test_wrapper("exhausted_ballots");
    }

    #[test]
    fn no_ballot() {
        init();
        test_wrapper("no_ballot");
    }

    #[test]
    #[should_panic]
    fn mismatching_reference() {
        init();
        test_wrapper("mismatching_reference");
    }

    fn fixture_state(name: &str, copy_name: &str) -> String {
        let src = format!(
            "{}/tests/data/{}/{}_state.json",
            env!("CARGO_MANIFEST_DIR"),
            name,
            name
        );
        let dst = temp_path(copy_name);
        fs::copy(&src, &dst).unwrap();
        dst
    }

    fn settings(state_path: &str, groups: Option<Vec<GroupId>>) -> DriverSettings {
        DriverSettings {
            state_path: state_path.to_string(),
            groups,
            interval_seconds: None,
            passes: Some(1),
            now: Some(Utc.with_ymd_and_hms(2024, 1, 16, 9, 0, 0).unwrap()),
        }
    }

    #[test]
    fn rollover_fixture() {
        init();
        let path = fixture_state("two_groups", "two_groups");
        let s = settings(&path, None);
        let clock = FixedClock(s.now.unwrap());

        let report = run_pass(&s, &clock).unwrap();
        assert_eq!(report.groups_advanced, 1);
        assert!(report.failures.is_empty());
        assert_eq!(
            report.outcomes[1],
            (
                GroupId(2),
                PassOutcome::InProgress {
                    cycle_id: CycleId(2),
                    phase: Phase::Submission
                }
            )
        );

        let state = read_state(&path).unwrap();
        assert_eq!(state.cycles.len(), 3);
        assert_eq!(state.results.len(), 1);
        let result = &state.results[0];
        assert_eq!(result.cycle_id, CycleId(1));
        assert_eq!(result.winning_submission_id, Some(SubmissionId(2)));
        assert_eq!(result.total_votes, 3);
        let next = state
            .cycles
            .iter()
            .find(|c| c.group_id == GroupId(1) && c.number == 2)
            .unwrap();
        assert_eq!(
            next.window.submission_start,
            Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap()
        );

        // A second pass over the written state changes nothing.
        let report = run_pass(&s, &clock).unwrap();
        assert_eq!(report.groups_advanced, 0);
        assert_eq!(read_state(&path).unwrap(), state);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn overwritten_pass_is_redone() {
        init();
        let path = fixture_state("two_groups", "overwritten_pass");
        let before = fs::read_to_string(&path).unwrap();
        let s = settings(&path, None);
        let clock = FixedClock(s.now.unwrap());

        run_pass(&s, &clock).unwrap();
        let after_first = read_state(&path).unwrap();

        // Another driver that read the file earlier writes its stale copy back.
        fs::write(&path, &before).unwrap();
        let report = run_pass(&s, &clock).unwrap();
        assert_eq!(report.groups_advanced, 1);
        assert_eq!(read_state(&path).unwrap(), after_first);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rollover_selected_groups() {
        init();
        let path = fixture_state("selected_groups", "selected_groups");
        let s = settings(&path, Some(vec![GroupId(2), GroupId(7)]));
        let report = run_pass(&s, &FixedClock(s.now.unwrap())).unwrap();
        // Group 1 is due but not selected. Group 7 does not exist.
        assert_eq!(report.groups_advanced, 0);
        assert_eq!(report.failures.len(), 0);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[1], (GroupId(7), PassOutcome::NoCycle));
        assert_eq!(read_state(&path).unwrap().cycles.len(), 2);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_state_file_is_created() {
        init();
        let path = temp_path("fresh_state");
        let _ = fs::remove_file(&path);
        run_rollover(&settings(&path, None)).unwrap();
        assert_eq!(read_state(&path).unwrap(), Snapshot::default());
        fs::remove_file(&path).unwrap();
    }
}

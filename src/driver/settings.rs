use crate::driver::*;

use chrono::{DateTime, Utc};
use cycle_voting::GroupId;

/// The content of the configuration file given with `--config`.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(rename = "statePath")]
    pub state_path: Option<String>,
    #[serde(rename = "intervalSeconds")]
    pub interval_seconds: Option<u64>,
    pub passes: Option<u32>,
    pub groups: Option<Vec<u64>>,
}

/// The options of a rollover run, once the configuration file and the
/// command line are merged.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DriverSettings {
    pub state_path: String,
    /// None for all the groups.
    pub groups: Option<Vec<GroupId>>,
    pub interval_seconds: Option<u64>,
    /// None to run until interrupted.
    pub passes: Option<u32>,
    pub now: Option<DateTime<Utc>>,
}

pub fn read_config(path: &str) -> CliResult<DriverConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(&contents).context(ParsingJsonSnafu { path })
}

fn parse_instant(value: &str) -> CliResult<DateTime<Utc>> {
    let t = DateTime::parse_from_rfc3339(value).context(ParsingTimeSnafu { value })?;
    Ok(t.with_timezone(&Utc))
}

impl DriverSettings {
    /// Merges the command line with the configuration file, if any. The
    /// command line wins.
    pub fn resolve(
        config_path: Option<String>,
        state: Option<String>,
        groups: Option<Vec<u64>>,
        interval: Option<u64>,
        passes: Option<u32>,
        now: Option<String>,
    ) -> CliResult<DriverSettings> {
        let config = match config_path {
            Some(p) => read_config(&p)?,
            None => DriverConfig::default(),
        };
        debug!("resolve: config file: {:?}", config);

        let state_path = state.or(config.state_path).context(MissingStateSnafu)?;
        let interval_seconds = interval.or(config.interval_seconds);
        ensure!(interval_seconds != Some(0), ZeroIntervalSnafu);
        // A single pass unless the driver runs periodically.
        let passes = match interval_seconds {
            Some(_) => passes.or(config.passes),
            None => Some(1),
        };
        let groups = groups
            .or(config.groups)
            .map(|ids| ids.into_iter().map(GroupId).collect());
        let now = now.as_deref().map(parse_instant).transpose()?;

        Ok(DriverSettings {
            state_path,
            groups,
            interval_seconds,
            passes,
            now,
        })
    }
}

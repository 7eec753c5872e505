use clap::{Parser, Subcommand};

/// Driver for recurring ranked-choice voting cycles.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Runs the instant-runoff tally on a file of ballots.
    Tally {
        /// (file path) A JSON file with the candidates and the ballots. See the manual of
        /// cycle_voting for the format.
        #[clap(short, long, value_parser)]
        input: String,

        /// (file path, 'stdout' or empty) If specified, the summary of the tally will be written
        /// in JSON format to the given location. Defaults to the standard output.
        #[clap(short, long, value_parser)]
        out: Option<String>,

        /// (file path) A reference file containing the expected summary in JSON format. If
        /// provided, cyclevote will check that the computed summary matches the reference.
        #[clap(short, long, value_parser)]
        reference: Option<String>,
    },
    /// Closes the completed cycles and opens their successors.
    Rollover {
        /// (file path, optional) A JSON configuration file. The other options override its
        /// values.
        #[clap(short, long, value_parser)]
        config: Option<String>,

        /// (file path) The JSON state of the groups and their cycles. It is written back after
        /// each pass, so a single rollover process should use a given file at a time.
        #[clap(short, long, value_parser)]
        state: Option<String>,

        /// (group ids, comma-separated) Only process these groups. All the groups by default.
        #[clap(short, long, value_parser, value_delimiter = ',')]
        group: Option<Vec<u64>>,

        /// (seconds) If specified, runs a pass every given number of seconds.
        #[clap(long, value_parser)]
        interval: Option<u64>,

        /// The number of passes to run when an interval is given. Runs forever otherwise.
        #[clap(long, value_parser)]
        passes: Option<u32>,

        /// (RFC 3339 timestamp) Runs the passes as if it was this instant.
        #[clap(long, value_parser)]
        now: Option<String>,
    },
}

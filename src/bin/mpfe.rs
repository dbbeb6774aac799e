use mpfe::comm::{ChannelCommunicator, SerialCommunicator};
use mpfe::config::ProblemConfig;
use mpfe::driver::{run, RunSummary};
use std::path::PathBuf;
use structopt::StructOpt;

/// Command line options
#[derive(StructOpt, Debug)]
#[structopt(name = "mpfe", about = "Runs a finite element problem described by a JSON configuration")]
struct Options {
    /// Problem configuration
    #[structopt(short, long, parse(from_os_str))]
    config: PathBuf,

    /// Step of the restart to start from, 0 for none
    #[structopt(short, long, default_value = "0")]
    restart: usize,

    /// Number of ranks, each run on its own thread
    #[structopt(long, default_value = "1")]
    ranks: usize,
}

fn run_problem(options: &Options) -> eyre::Result<RunSummary> {
    let config = ProblemConfig::from_json_file(&options.config)?;
    if options.ranks > 1 {
        ChannelCommunicator::run(options.ranks, |comm| run(&config, options.restart, comm))
            .into_iter()
            .reduce(|first, other| first.and(other))
            .unwrap_or_else(|| Err(eyre::eyre!("no ranks were run")))
    } else {
        run(&config, options.restart, SerialCommunicator::shared())
    }
}

fn main() {
    let options = Options::from_args();
    match run_problem(&options) {
        Ok(summary) => println!(
            "finished at step {} (t = {}), {} result tests passed",
            summary.final_step, summary.final_time, summary.results.test_count
        ),
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(1);
        }
    }
}

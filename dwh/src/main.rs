use dwh_common::{prelude::*, quick_main, tracing_support::initialize_tracing};
use structopt::StructOpt;

mod cmd;

/// Command-line options, parsed using `structopt`.
#[derive(Debug, StructOpt)]
#[structopt(about = "A tool for running a song-play data warehouse on Redshift.")]
struct Opt {
    /// Our configuration file. `provision` records the cluster's endpoint and
    /// role ARN here.
    #[structopt(long = "config", default_value = "dwh.toml", parse(from_os_str))]
    config: PathBuf,

    #[structopt(subcommand)]
    cmd: Command,
}

/// Our subcommands.
#[derive(Debug, StructOpt)]
enum Command {
    /// Create the IAM role and the Redshift cluster, and wait until the
    /// cluster is available.
    #[structopt(name = "provision")]
    Provision,

    /// Drop and recreate every warehouse table.
    #[structopt(name = "create-tables")]
    CreateTables,

    /// Load the staging tables from S3 and fill the warehouse tables.
    #[structopt(name = "etl")]
    Etl,

    /// Delete the Redshift cluster and wait until it is gone.
    #[structopt(name = "decommission")]
    Decommission,

    /// Show the current state of the cluster.
    #[structopt(name = "status")]
    Status,

    /// Commands for accessing the database.
    #[structopt(name = "db")]
    Db {
        #[structopt(subcommand)]
        cmd: cmd::db::Opt,
    },
}

quick_main!(run);

fn run() -> Result<()> {
    initialize_tracing();
    let opt = Opt::from_args();
    debug!("Args: {:?}", opt);

    let config = Config::from_file(&opt.config)?;
    match opt.cmd {
        Command::Provision => cmd::provision::run(&config, &opt.config),
        Command::CreateTables => cmd::create_tables::run(&config),
        Command::Etl => cmd::etl::run(&config),
        Command::Decommission => cmd::decommission::run(&config),
        Command::Status => cmd::status::run(&config),
        Command::Db { ref cmd } => cmd::db::run(&config, cmd),
    }
}

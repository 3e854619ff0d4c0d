use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use hookrun::runner::ShellRunner;
use hookrun::server::{self, AppState};
use hookrun::tasks::TaskBook;

/// Hookrun - trigger pre-configured shell tasks over HTTP
#[derive(Parser, Debug)]
#[command(name = "hookrun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Task list file
    #[arg(short = 'f', long = "file", env = "CONF", default_value = "hookrun.yml")]
    file: PathBuf,

    /// Listen on host:port
    #[arg(short, long, env = "LISTEN", default_value = "localhost:8080")]
    listen: String,

    /// Secret key
    #[arg(short, long, env = "KEY")]
    key: String,

    /// Batch mode for multi-line scripts
    #[arg(short, long)]
    batch: bool,

    /// Limit how many concurrent updates can be running
    #[arg(long, default_value_t = 10)]
    limit: usize,

    /// For how long an update task can be running, in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Fixed delay applied to every update request, in seconds
    #[arg(long, default_value_t = 1)]
    update_delay: u64,

    /// Show debug info
    #[arg(long, env = "DEBUG")]
    dbg: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_log(cli.dbg);
    log::info!("hookrun {}", env!("CARGO_PKG_VERSION"));

    let tasks = TaskBook::load(&cli.file)?;
    let runner = Arc::new(ShellRunner::new(
        cli.batch,
        cli.limit,
        Duration::from_secs(cli.timeout),
    ));

    let state = AppState {
        secret: Arc::new(cli.key),
        tasks: Arc::new(tasks),
        runner: runner.clone(),
        exec_timeout: Duration::from_secs(cli.timeout),
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let app = server::router(state, Duration::from_secs(cli.update_delay));
        let result = server::run_server(&cli.listen, app).await;
        // reject pending executions once the server loop is gone
        runner.shutdown();
        result
    })
}

fn setup_log(dbg: bool) {
    let filter = if dbg { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

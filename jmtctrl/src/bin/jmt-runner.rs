use clap::Parser;
use jmtcore::cache::MemoryTaskCache;
use jmtctrl::{
    executor::Executor,
    platform::Platform,
    settings::Settings,
};
use jmtdb_sqlite::SqliteBackend;
use jmttqs::runtime::Builder;
use std::sync::Arc;

/// Polling runner daemon: claims queued test plans from the store and
/// drives them through the external runner until shut down.
#[derive(Debug, Parser)]
struct Cli {
    #[clap(short = 'r', long = "runners", default_value = "8")]
    runners: usize,
    #[clap(long, value_name = "JMT_DB_URL", env = "JMT_DB_URL")]
    jmt_db_url: String,
    #[clap(flatten)]
    settings: Settings,
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    stderrlog::new()
        .modules([
            "jmtcore",
            "jmtctrl",
            "jmtdb_sqlite",
            "jmttqs",
            module_path!(),
        ])
        .verbosity((args.verbose as usize) + 1)
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;
    args.settings.ensure_dirs()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.runners.max(1))
        .enable_io()
        .enable_time()
        .build()?;
    let backend = runtime.block_on(SqliteBackend::tm(&args.jmt_db_url))?;
    let platform = Platform::new(
        Arc::new(backend),
        Arc::new(MemoryTaskCache::new()),
        args.settings.clone(),
    );
    let executor = Executor::new(platform);

    let mut tqs = Builder::from(executor)
        .permits(args.runners)
        .build_with_handle(runtime.handle().clone());
    tqs.start();
    log::info!("runner daemon started with {} permits", args.runners);
    tqs.wait();
    log::info!("runner daemon stopped");
    Ok(())
}

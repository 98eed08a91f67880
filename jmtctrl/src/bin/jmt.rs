use clap::{
    Parser,
    Subcommand,
};
use jmtcore::cache::MemoryTaskCache;
use jmtctrl::{
    platform::Platform,
    settings::Settings,
};
use jmtdb_sqlite::SqliteBackend;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[clap(name = "jmt")]
struct Cli {
    #[clap(long, value_name = "JMT_DB_URL", env = "JMT_DB_URL")]
    jmt_db_url: String,
    #[clap(flatten)]
    settings: Settings,
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a test plan to completion and print the final record
    Execute {
        file_name: String,
    },
    /// Queue a test plan for the runner daemon
    Queue {
        file_name: String,
    },
    /// List all task records
    List,
    /// Stop a task by its durable id
    Stop {
        id: i64,
    },
    /// Stop every task currently running according to the store
    StopAll,
    /// Render the HTML report for a completed task
    Report {
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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

    let backend = SqliteBackend::tm(&args.jmt_db_url).await?;
    let platform = Platform::new(
        Arc::new(backend),
        Arc::new(MemoryTaskCache::new()),
        args.settings.clone(),
    );

    match args.command {
        Command::Execute { file_name } => {
            let task = platform.execute_plan(&file_name).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Command::Queue { file_name } => {
            let task = platform.queue_plan(&file_name).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Command::List => {
            let tasks = platform.list_tasks().await?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        Command::Stop { id } => {
            let outcome = platform.stop_task(id).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::StopAll => {
            let outcomes = platform.stop_running_tasks().await?;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        Command::Report { id } => {
            let outcome = platform.generate_report(id).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }
    Ok(())
}

//! Watchman: job set scheduler for the analytics dashboard.
//!
//! Main binary with subcommands:
//! - `scheduler`: Advance job sets through their time windows
//! - `window`: Inspect a single window without changing it

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod inspect;
mod scheduler;

#[derive(Parser)]
#[command(name = "watchman")]
#[command(about = "Job set scheduler for the analytics dashboard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the job set scheduler until interrupted
    Scheduler {
        /// LoopBack API root (e.g. http://localhost:3000/api)
        #[arg(long, env = "API_ROOT")]
        api_root: Option<String>,

        /// Start of the first window in epoch milliseconds (defaults to now)
        #[arg(long, env = "SYSTEM_START_TIME")]
        system_start_time: Option<i64>,

        /// Window length in minutes
        #[arg(long, env = "JOBSET_QUERYSPAN_MIN", default_value_t = watchman_scheduler::DEFAULT_WINDOW_SPAN_MINUTES)]
        query_span_min: u64,

        /// Posts a window needs before its job set starts running
        #[arg(long, env = "MIN_POSTS", default_value_t = watchman_scheduler::DEFAULT_MIN_POSTS_THRESHOLD)]
        min_posts: u64,

        /// Stretch how long under-filled windows are retried (useful for slow producers)
        #[arg(long, env = "RETRY_MULTIPLIER", default_value_t = watchman_scheduler::DEFAULT_RETRY_MULTIPLIER)]
        retry_multiplier: f64,

        /// Delay in milliseconds before re-checking an open window or a failed cycle
        #[arg(long, env = "LOOP_INTERVAL_MS", default_value = "60000")]
        loop_interval_ms: u64,

        /// Delay in milliseconds between checks of a window still in progress
        #[arg(long, env = "POLL_INTERVAL_MS", default_value = "10000")]
        poll_interval_ms: u64,
    },

    /// Show the stored job set and post count for one window
    Window {
        /// LoopBack API root (e.g. http://localhost:3000/api)
        #[arg(long, env = "API_ROOT")]
        api_root: Option<String>,

        /// Window start in epoch milliseconds
        #[arg(long)]
        start: i64,

        /// Window length in minutes
        #[arg(long, env = "JOBSET_QUERYSPAN_MIN", default_value_t = watchman_scheduler::DEFAULT_WINDOW_SPAN_MINUTES)]
        query_span_min: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "watchman=info,watchman_scheduler=info,watchman_loopback=info".to_string()
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scheduler {
            api_root,
            system_start_time,
            query_span_min,
            min_posts,
            retry_multiplier,
            loop_interval_ms,
            poll_interval_ms,
        } => {
            scheduler::run(scheduler::SchedulerArgs {
                api_root,
                system_start_time,
                query_span_min,
                min_posts,
                retry_multiplier,
                loop_interval_ms,
                poll_interval_ms,
            })
            .await
        }

        Commands::Window {
            api_root,
            start,
            query_span_min,
        } => inspect::run(api_root, start, query_span_min).await,
    }
}

//! Scheduler command for running the window advancer.

use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tokio::sync::watch;
use tracing::info;

use watchman_loopback::LoopbackClient;
use watchman_scheduler::{
    AdvancerConfig, ConfigError, LoopbackPostCounter, LoopbackStore, WindowAdvancer,
};

/// Raw scheduler options as parsed from the command line and environment.
#[derive(Debug, Clone)]
pub struct SchedulerArgs {
    pub api_root: Option<String>,
    pub system_start_time: Option<i64>,
    pub query_span_min: u64,
    pub min_posts: u64,
    pub retry_multiplier: f64,
    pub loop_interval_ms: u64,
    pub poll_interval_ms: u64,
}

/// Resolve the advancer configuration, failing on missing or invalid values.
fn build_config(args: &SchedulerArgs) -> Result<AdvancerConfig, ConfigError> {
    let mut builder = AdvancerConfig::builder()
        .window_span_minutes(args.query_span_min)
        .min_posts_threshold(args.min_posts)
        .retry_multiplier(args.retry_multiplier)
        .loop_interval(Duration::from_millis(args.loop_interval_ms))
        .poll_interval(Duration::from_millis(args.poll_interval_ms));

    if let Some(ref api_root) = args.api_root {
        builder = builder.api_root(api_root);
    }
    if let Some(start) = args.system_start_time {
        builder = builder.system_start_time(start);
    }

    builder.build()
}

/// Run the scheduler until Ctrl-C.
pub async fn run(args: SchedulerArgs) -> Result<()> {
    let config = build_config(&args).map_err(|e| miette::miette!("{}", e))?;
    let config = Arc::new(config);

    info!(
        api_root = %config.api_root,
        system_start_time = config.system_start_time,
        window_span_minutes = config.window_span_minutes,
        retry_multiplier = config.retry_multiplier,
        "starting job set scheduler"
    );

    let client = Arc::new(
        LoopbackClient::new(config.api_root.as_str())
            .map_err(|e| miette::miette!("failed to create API client: {}", e))?,
    );
    let store = Arc::new(LoopbackStore::new(Arc::clone(&client)));
    let counter = Arc::new(LoopbackPostCounter::new(Arc::clone(&client)));

    let advancer = WindowAdvancer::new(Arc::clone(&config), store, counter);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let cursor = advancer.run(shutdown_rx).await;
    info!(next_window_start = cursor, "scheduler stopped");

    Ok(())
}

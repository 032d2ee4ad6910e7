//! chat-metrics - one-shot dashboard metrics over chat interaction logs

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_metrics::{
    config::{Args, Metric},
    db::{DocumentStore, MemoryStore, MongoStore},
    filters::RequestParams,
    metrics::MetricsService,
    pipeline::Executor,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Logs go to stderr; stdout carries the JSON result
    let log_level = args.log_level.clone();
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("chat_metrics={},warn", log_level).into()),
    );
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if args.log_json {
        registry.with(fmt_layer.json()).init();
    } else {
        registry.with(fmt_layer).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!(
        metric = ?args.metric,
        mode = if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" },
        db = %args.mongodb_db,
        "Starting chat-metrics"
    );

    let store = connect(&args).await?;
    let service = MetricsService::with_executor(Executor::new(
        store,
        args.retry_policy(),
        args.aggregate_options(),
    ));

    let params = RequestParams::from(args.request.clone());
    let request = params.parse(Utc::now())?;

    let output = match args.metric {
        Metric::Dashboard => serde_json::to_value(service.dashboard(&request).await?)?,
        Metric::Usage => serde_json::to_value(service.usage(&request).await?)?,
        Metric::Sessions => serde_json::to_value(service.sessions(&request).await?)?,
        Metric::Expert => serde_json::to_value(service.expert_eval(&request).await?)?,
        Metric::Ai => serde_json::to_value(service.ai_eval(&request).await?)?,
        Metric::PublicFeedback => serde_json::to_value(service.public_feedback(&request).await?)?,
        Metric::Departments => serde_json::to_value(service.departments(&request).await?)?,
        Metric::Chats => {
            let listing = params.listing()?;
            serde_json::to_value(service.chat_listing(&request, &listing).await?)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Connect to MongoDB, falling back to the in-memory store in dev mode
async fn connect(args: &Args) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match MongoStore::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(store) => {
            info!("MongoDB connected successfully");
            Ok(Arc::new(store))
        }
        Err(e) if args.dev_mode => {
            warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
            let store = match &args.fixtures {
                Some(path) => MemoryStore::from_fixtures(path)
                    .await
                    .with_context(|| format!("loading fixtures from {}", path.display()))?,
                None => MemoryStore::new(),
            };
            Ok(Arc::new(store))
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    }
}

mod config;
mod handlers;
mod models;
#[cfg(feature = "server")]
mod server;
mod services;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;

use config::Config;
use handlers::{format_snap_summary, SnapHandler};
use models::FoodItemUpdate;
use services::report::{format_goal_bar, format_month_calendar, GoalProgress};
use services::{FoodLogStore, ImageNormalizer, TrackerClient};

#[derive(Parser)]
#[command(name = "instant-health-tracker", version, about = "Track calories from food photos")]
struct Cli {
    /// Food log file (defaults to TRACKER_STORE or the user data dir)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Analysis server base URL (defaults to TRACKER_SERVER_URL)
    #[arg(long, global = true)]
    server_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the analysis server
    #[cfg(feature = "server")]
    Serve {
        /// Address to listen on (defaults to BIND_ADDR)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Analyze a food photo and add it to today's log
    Snap {
        photo: PathBuf,
        /// Extra context for the estimate, e.g. "half portion"
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Show the food logged on a day (today by default)
    Log {
        /// Day as YYYY-MM-DD
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Correct a logged item
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        calories: Option<u32>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Remove a logged item
    Delete { id: String },
    /// Show or set the daily calorie goal
    Goal { calories: Option<u32> },
    /// Show a month as a calorie heat-map
    Calendar {
        /// Month as YYYY-MM (current month by default)
        #[arg(long, value_parser = parse_month)]
        month: Option<NaiveDate>,
    },
}

fn parse_month(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .map_err(|_| format!("'{}' is not a month in YYYY-MM form", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    // Load environment variables
    dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    if let Some(server_url) = cli.server_url {
        config.server_url = server_url;
    }

    match cli.command {
        #[cfg(feature = "server")]
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            serve(config).await
        }
        Command::Snap { photo, description } => {
            let mut store = FoodLogStore::open(&config.store_path).await?;
            let handler = SnapHandler::new(
                ImageNormalizer::default(),
                TrackerClient::new(config.server_url.clone()),
            );

            let item = handler
                .handle_photo(&mut store, &photo, description.as_deref())
                .await?;
            let today_total = store.calories_for(Utc::now().date_naive());

            println!("{}", format_snap_summary(&item, today_total, store.daily_goal()));
            Ok(())
        }
        Command::Log { date } => {
            let store = FoodLogStore::open(&config.store_path).await?;
            let date = date.unwrap_or_else(|| Utc::now().date_naive());

            match store.log_for(date).filter(|log| !log.items.is_empty()) {
                Some(log) => {
                    println!("🍽️ Food log for {}\n", date);
                    for item in &log.items {
                        println!(
                            "[{}] {}  {} kcal  ({})",
                            item.id,
                            item.timestamp.format("%H:%M"),
                            item.calories,
                            item.name
                        );
                        if let Some(description) = item.description.as_deref() {
                            println!("      {}", description);
                        }
                    }
                    println!();
                }
                None => println!("No food logged on {}. Snap a photo to start tracking!\n", date),
            }

            let progress = GoalProgress::new(store.calories_for(date), store.daily_goal());
            println!("{}", format_goal_bar(&progress));
            Ok(())
        }
        Command::Edit {
            id,
            name,
            calories,
            description,
        } => {
            let mut store = FoodLogStore::open(&config.store_path).await?;
            if name.as_deref().map(str::trim) == Some("") || calories == Some(0) {
                anyhow::bail!("Name and calories must not be empty");
            }

            let update = FoodItemUpdate {
                name,
                description,
                calories,
            };
            if !store.update_item(&id, update).await? {
                anyhow::bail!("No logged item with id {}", id);
            }
            println!("✅ Updated {}", id);
            Ok(())
        }
        Command::Delete { id } => {
            let mut store = FoodLogStore::open(&config.store_path).await?;
            if !store.delete_item(&id).await? {
                anyhow::bail!("No logged item with id {}", id);
            }
            println!("🗑️ Deleted {}", id);
            Ok(())
        }
        Command::Goal { calories } => {
            let mut store = FoodLogStore::open(&config.store_path).await?;
            if let Some(calories) = calories {
                store.set_daily_goal(calories).await?;
            }

            let progress = GoalProgress::new(
                store.calories_for(Utc::now().date_naive()),
                store.daily_goal(),
            );
            println!("{}", format_goal_bar(&progress));
            Ok(())
        }
        Command::Calendar { month } => {
            let store = FoodLogStore::open(&config.store_path).await?;
            let month = month.unwrap_or_else(|| Utc::now().date_naive());

            println!("{}", format_month_calendar(store.logs(), month));
            Ok(())
        }
    }
}

#[cfg(feature = "server")]
async fn serve(config: Config) -> Result<()> {
    use services::{FoodAnalyzer, OpenAIService, VisionService};
    use std::sync::Arc;

    log::info!("🚀 Starting Instant Health Tracker server...");

    let vision = config.openai_api_key.clone().map(|api_key| {
        Arc::new(OpenAIService::new(
            api_key,
            config.openai_model.clone(),
            config.openai_base_url.clone(),
            config.max_output_tokens,
        )) as Arc<dyn VisionService>
    });
    match vision {
        Some(_) => log::info!("✅ OpenAI service initialized with model: {}", config.openai_model),
        None => log::warn!("⚠️ OPENAI_API_KEY not set, food analysis requests will fail"),
    }

    let analyzer = Arc::new(FoodAnalyzer::new(vision));
    let app = server::create_router(analyzer);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    log::info!("🌐 Server listening on {}", config.bind_addr);
    println!("🍎 Instant Health Tracker: http://{}", config.bind_addr);
    println!("🛑 Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("🛑 Shutting down...");
        })
        .await?;

    Ok(())
}

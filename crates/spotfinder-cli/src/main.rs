use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use spotfinder_core::{
    render_answer, render_events, render_locations, render_overview, render_ranked_spots,
    AppSettings, LlmSettings, OccupancyService, OutputFormat, SortOrder, SourceKind, SpotCategory,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "spotfinder",
    author,
    version,
    about = "Live campus occupancy: find a quiet place to study or work out"
)]
struct Cli {
    /// TOML settings file (sources, ranking, llm); `SPOTFINDER__*` env vars override it
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the quick summary plus every recreation facility and library
    Snapshot {
        /// Order of the per-source listings
        #[arg(long, value_enum, default_value_t = SortArg::Capacity)]
        sort: SortArg,
        #[arg(long)]
        json: bool,
    },
    /// Rank the least crowded open spots of one category
    Best {
        #[arg(long, value_enum)]
        category: CategoryArg,
        /// Number of spots to return (defaults to the configured ranking limit)
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Ask a free-form question; answers are at most three suggestions
    Ask {
        prompt: String,
        #[arg(long)]
        json: bool,
    },
    /// Every location with its fill percentage and confidence
    Locations {
        #[arg(long)]
        json: bool,
    },
    /// Upcoming campus events
    Events {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CategoryArg {
    Study,
    Workout,
}

impl From<CategoryArg> for SpotCategory {
    fn from(value: CategoryArg) -> Self {
        match value {
            CategoryArg::Study => SpotCategory::Study,
            CategoryArg::Workout => SpotCategory::Workout,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Capacity,
    Name,
}

impl From<SortArg> for SortOrder {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Capacity => SortOrder::Capacity,
            SortArg::Name => SortOrder::Name,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let settings = AppSettings::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("failed to load settings from {}", path.display()),
        None => "failed to load settings".to_string(),
    })?;
    let llm = LlmSettings::from_env_with(&settings.llm)?;
    let service = OccupancyService::from_settings(&settings, &llm)?;
    service.refresh().await;

    let command = cli.command.unwrap_or(Commands::Snapshot {
        sort: SortArg::Capacity,
        json: false,
    });
    tracing::debug!(?command, "dispatching command");
    let output = match command {
        Commands::Snapshot { sort, json } => {
            let summary = service.quick_summary().await;
            let recreation = service.list_samples(SourceKind::Recreation, sort.into()).await;
            let libraries = service.list_samples(SourceKind::Library, sort.into()).await;
            render_overview(&summary, &recreation, &libraries, OutputFormat::from_json_flag(json))?
        }
        Commands::Best {
            category,
            limit,
            json,
        } => {
            let category = SpotCategory::from(category);
            let spots = service.rank_best_spots(category, limit).await;
            render_ranked_spots(category, &spots, OutputFormat::from_json_flag(json))?
        }
        Commands::Ask { prompt, json } => {
            let results = service.answer_query(&prompt).await;
            render_answer(&results, OutputFormat::from_json_flag(json))?
        }
        Commands::Locations { json } => {
            let locations = service.list_all_locations_with_occupancy().await;
            render_locations(&locations, OutputFormat::from_json_flag(json))?
        }
        Commands::Events { limit, json } => {
            let events = service.events(limit).await;
            render_events(&events, OutputFormat::from_json_flag(json))?
        }
    };
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

use std::error::Error;
use std::fs::File;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hashnav::core::compaction::Compactor;
use hashnav::core::config::{self, ResolvedConfig};
use hashnav::core::events::{NavigationEvent, ShellHashChange, catalog};
use hashnav::core::filter::{FilterError, FilterVerdict, NavigationFilter};
use hashnav::core::hash::{self, Params};
use hashnav::core::router::ShellNavigation;
use hashnav::location::{Location, MemoryLocation};
use hashnav::persistence::MemoryStore;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

#[derive(Parser)]
#[command(name = "hashnav", about = "Hash-based shell navigation router")]
struct Args {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Config file to use instead of ~/.hashnav/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Navigate through fragments in order and print every event as JSON
    Replay {
        /// Fragments, e.g. '#Order-display?id=1&/items'
        fragments: Vec<String>,

        /// Abandon navigation to intents starting with this prefix
        #[arg(long)]
        block: Vec<String>,

        /// Report parameter-only changes as shellHashParamChanged
        #[arg(long)]
        param_listener: bool,
    },
    /// Compact key=value parameters into an in-memory store
    Compact {
        params: Vec<String>,

        /// Parameter to keep inline
        #[arg(long)]
        retain: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let file_config = match &args.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config().unwrap_or_else(|e| {
            eprintln!("Ignoring config: {e}");
            config::HashnavConfig::default()
        }),
    };
    let resolved = config::resolve(&file_config, args.log_level.as_deref());
    init_logging(&resolved);

    log::info!("hashnav starting up");

    match args.command {
        Command::Replay {
            fragments,
            block,
            param_listener,
        } => replay(&resolved, &fragments, block, param_listener),
        Command::Compact { params, retain } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(compact(&resolved, &params, &retain))
        }
    }
}

fn init_logging(config: &ResolvedConfig) {
    let level = config.log_level.parse().unwrap_or(LevelFilter::Debug);
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    if let Ok(log_file) = File::create(&config.log_file) {
        let _ = WriteLogger::init(level, log_config, log_file);
    }
}

fn replay(
    config: &ResolvedConfig,
    fragments: &[String],
    block: Vec<String>,
    param_listener: bool,
) -> Result<(), Box<dyn Error>> {
    let location = Rc::new(MemoryLocation::default());
    let router = ShellNavigation::new(
        location.clone(),
        Arc::new(MemoryStore::new()),
        config.router_config(),
        config.compaction_config(),
    );

    for descriptor in catalog() {
        if !param_listener && descriptor.name == "shellHashParamChanged" {
            continue;
        }
        router.on(descriptor.kind, Rc::new(print_event));
    }

    if !block.is_empty() {
        let blocker: Rc<dyn NavigationFilter> =
            Rc::new(move |new: &str, _old: &str| -> Result<FilterVerdict, FilterError> {
                let intent = hash::parse(new)
                    .map_err(|e| FilterError(e.to_string()))?
                    .intent
                    .unwrap_or_default();
                if block.iter().any(|prefix| intent.starts_with(prefix.as_str())) {
                    Ok(FilterVerdict::Abandon)
                } else {
                    Ok(FilterVerdict::Continue)
                }
            });
        router.register_filter(blocker);
    }

    router.init(Rc::new(|change: &ShellHashChange| -> Result<(), Box<dyn Error>> {
        log::info!("Shell callback: {:?}", change.new_shell_hash);
        Ok(())
    }));

    for fragment in fragments {
        location.set_fragment(fragment);
    }

    let summary = serde_json::json!({
        "history": location.history(),
        "state": router.navigation_state(),
    });
    println!("{summary}");
    Ok(())
}

fn print_event(event: &NavigationEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => log::warn!("Cannot serialize {:?}: {e}", event.kind()),
    }
}

async fn compact(config: &ResolvedConfig, pairs: &[String], retain: &[String]) -> Result<(), Box<dyn Error>> {
    let params: Params = pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.clone(), String::new()),
        })
        .collect();

    let compactor = Compactor::new(Arc::new(MemoryStore::new()), config.compaction_config());
    let compacted = compactor.compact(&params, retain, None, true).await?;
    println!("{}", serde_json::to_string_pretty(&compacted)?);

    let expanded = compactor.expand(&compacted.hash).await?;
    println!("{}", serde_json::json!({ "expanded": expanded }));
    Ok(())
}

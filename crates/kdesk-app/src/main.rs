//! kdesk operator CLI - Entry Point

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use kdesk_app::console::{
    algorithms_table, deployments_table, positions_table, session_line, settings_summary,
};
use kdesk_app::{AppConfig, Application, SettingsUpdate};
use kdesk_core::{AlgorithmDraft, OrderSide};
use kdesk_telemetry::Metrics;
use kdesk_workflow::OrderIntent;
use tracing::{info, warn};

/// Broker dashboard: credentials, algorithms, deployments and P&L
#[derive(Parser, Debug)]
#[command(name = "kdesk", version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via KDESK_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level when RUST_LOG is unset (overrides telemetry.log_level)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show or edit API settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Print the broker login URL
    LoginUrl,
    /// Verify the session, exchanging the request token if needed
    Connect,
    /// Show open positions
    Positions,
    /// Place a single market order
    Order {
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "buy")]
        side: OrderSide,
        #[arg(long)]
        quantity: u32,
    },
    /// Manage stored algorithms
    #[command(subcommand)]
    Algo(AlgoCommand),
    /// Deploy an algorithm and place its order
    Deploy {
        algorithm_id: String,
        /// Order symbol (defaults to the built-in order for NIFTY algorithms)
        #[arg(long, requires = "quantity")]
        symbol: Option<String>,
        #[arg(long, default_value = "buy")]
        side: OrderSide,
        #[arg(long, requires = "symbol")]
        quantity: Option<u32>,
        /// Keep running and refresh P&L until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// Stop a deployment
    Stop { deployment_id: String },
    /// List deployments
    Deployments,
    /// Connect, resume monitors for running deployments and refresh P&L until Ctrl-C
    Watch,
    /// Print Prometheus metrics collected by this process
    Metrics,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Show saved settings with secrets masked
    Show,
    /// Update saved settings; connects when key and access token are present
    Set {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        api_secret: Option<String>,
        #[arg(long)]
        request_token: Option<String>,
        #[arg(long)]
        access_token: Option<String>,
        #[arg(long)]
        redirect_url: Option<String>,
        #[arg(long)]
        max_positions: Option<u32>,
        #[arg(long)]
        risk_per_trade: Option<f64>,
        #[arg(long)]
        auto_trade: Option<bool>,
        /// Full URL the broker redirected to after login
        #[arg(long)]
        login_redirect: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum AlgoCommand {
    /// List algorithms, most recently updated first
    List,
    /// Print one algorithm including its code
    Show { id: String },
    /// Create or overwrite an algorithm from a code file
    Save {
        #[arg(long)]
        name: String,
        /// Path to the script text
        #[arg(long)]
        file: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Existing id to overwrite
        #[arg(long)]
        id: Option<String>,
    },
    /// Delete an algorithm; its deployments keep running
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Determine config path: CLI arg > KDESK_CONFIG env var > default
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("KDESK_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());
    let config_found = Path::new(&config_path).exists();
    let config = if config_found {
        AppConfig::from_file(&config_path)?
    } else {
        AppConfig::default()
    };

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.telemetry.log_level.clone());
    kdesk_telemetry::init_logging(&log_level)?;

    info!("Starting kdesk v{}", env!("CARGO_PKG_VERSION"));
    if config_found {
        info!(config_path = %config_path, "Configuration loaded");
    } else {
        warn!(config_path = %config_path, "Config file not found, using defaults");
    }

    let app = Application::new(config)?;
    let code = run(&app, args.command).await;
    app.shutdown();
    code
}

/// Actions that report through the notifier have already shown their
/// failure; only the exit code is left to set.
fn reported<T, E>(result: &std::result::Result<T, E>) -> ExitCode {
    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run(app: &Application, command: Command) -> Result<ExitCode> {
    match command {
        Command::Settings(SettingsCommand::Show) => {
            print!("{}", settings_summary(&app.credentials().get()));
            Ok(ExitCode::SUCCESS)
        }
        Command::Settings(SettingsCommand::Set {
            api_key,
            api_secret,
            request_token,
            access_token,
            redirect_url,
            max_positions,
            risk_per_trade,
            auto_trade,
            login_redirect,
        }) => {
            let update = SettingsUpdate {
                api_key,
                api_secret,
                request_token,
                access_token,
                redirect_url,
                max_positions,
                risk_per_trade,
                auto_trade,
                login_redirect,
            };
            if update.is_empty() {
                anyhow::bail!("nothing to update; pass at least one setting");
            }
            let saved = app.save_settings(update);
            let Ok((_, connect_ready)) = saved else {
                return Ok(ExitCode::FAILURE);
            };
            if connect_ready {
                return Ok(reported(&app.session().connect().await));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::LoginUrl => {
            let url = app.session().login_url()?;
            println!("{url}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Connect => Ok(reported(&app.session().connect().await)),
        Command::Positions => {
            if app.session().connect().await.is_err() {
                return Ok(ExitCode::FAILURE);
            }
            let rows = app.deployer().refresh_positions().await?;
            print!("{}", positions_table(&rows));
            if !rows.is_empty() {
                let total: f64 = rows.iter().map(|r| r.pnl).sum();
                println!("Total P&L: {}", kdesk_store::format_profit(total));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Order {
            symbol,
            side,
            quantity,
        } => {
            let result = app
                .orders()
                .place_order(None, &symbol, side, quantity)
                .await?;
            println!("Order placed. Order ID: {}", result.order_id);
            Ok(ExitCode::SUCCESS)
        }
        Command::Algo(cmd) => run_algo(app, cmd),
        Command::Deploy {
            algorithm_id,
            symbol,
            side,
            quantity,
            watch,
        } => {
            if app.session().connect().await.is_err() {
                return Ok(ExitCode::FAILURE);
            }
            let intent = symbol
                .zip(quantity)
                .map(|(symbol, quantity)| OrderIntent::new(symbol, side, quantity));
            if app.deployer().deploy(&algorithm_id, intent).await.is_err() {
                return Ok(ExitCode::FAILURE);
            }
            if watch {
                watch_loop(app).await?;
            } else {
                println!("Run `kdesk watch` to keep refreshing P&L for running deployments.");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Stop { deployment_id } => Ok(reported(&app.deployer().stop(&deployment_id))),
        Command::Deployments => {
            print!("{}", deployments_table(&app.deployment_rows(&Local)));
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch => {
            // Failures are reported by the session; monitors still resume.
            let _ = app.session().auto_connect().await;
            let resumed = app.deployer().resume_monitors();
            println!("Monitoring {resumed} running deployment(s). Press Ctrl-C to stop.");
            watch_loop(app).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Metrics => {
            print!("{}", Metrics::gather_text()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_algo(app: &Application, cmd: AlgoCommand) -> Result<ExitCode> {
    match cmd {
        AlgoCommand::List => {
            print!("{}", algorithms_table(&app.algorithms().list()));
            Ok(ExitCode::SUCCESS)
        }
        AlgoCommand::Show { id } => {
            let algorithm = app
                .algorithms()
                .get(&id)
                .with_context(|| format!("algorithm not found: {id}"))?;
            println!("id:          {}", algorithm.id);
            println!("name:        {}", algorithm.name);
            println!("description: {}", algorithm.description);
            println!("created:     {}", algorithm.created_at.with_timezone(&Local));
            println!("updated:     {}", algorithm.updated_at.with_timezone(&Local));
            println!();
            println!("{}", algorithm.code);
            Ok(ExitCode::SUCCESS)
        }
        AlgoCommand::Save {
            name,
            file,
            description,
            id,
        } => {
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read algorithm code from {file}"))?;
            let draft = AlgorithmDraft {
                id,
                name,
                description,
                code,
            };
            match app.save_algorithm(draft) {
                Ok(saved) => {
                    println!("{}", saved.id);
                    Ok(ExitCode::SUCCESS)
                }
                Err(_) => Ok(ExitCode::FAILURE),
            }
        }
        AlgoCommand::Delete { id } => Ok(reported(&app.delete_algorithm(&id))),
    }
}

/// Print session changes and the deployment table each monitor period
/// until Ctrl-C.
async fn watch_loop(app: &Application) -> Result<()> {
    let mut status_rx = app.session().subscribe();
    let mut ticker = tokio::time::interval(app.monitors().period());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for Ctrl-C")?;
                info!("Shutdown requested");
                break;
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", session_line(&status_rx.borrow_and_update()));
            }
            _ = ticker.tick() => {
                let deployments = app.registry().list();
                let running = deployments.iter().filter(|d| d.is_running()).count();
                let total: f64 = deployments.iter().map(|d| d.profit).sum();
                print!("{}", deployments_table(&app.deployment_rows(&Local)));
                println!(
                    "{running} running, total P&L {}\n",
                    kdesk_store::format_profit(total)
                );
            }
        }
    }
    Ok(())
}

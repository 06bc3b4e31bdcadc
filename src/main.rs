use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use companion_client::browser::{LoopbackBrowser, UrlOpener};
use companion_client::config::load_config;
use companion_client::context::AppContext;
use companion_client::handler::{CheckoutAction, CheckoutResultHandler};
use companion_client::matcher::match_by_months;
use companion_client::model::{CheckoutResult, DurationSelection, PlanTier};
use companion_client::{BackendClient, CheckoutSession, PlanCatalog};

/// Companion client: subscription plans and hosted checkout from the terminal
#[derive(Parser)]
#[command(name = "companion-client")]
#[command(about = "Browse subscription plans and run a hosted checkout against the companion backend.")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "COMPANION_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in subscription tiers
    Tiers,
    /// Fetch and print the backend plan catalog
    Plans,
    /// Show which backend plan a month count resolves to
    Match {
        /// Subscription length in months
        #[arg(short, long, allow_negative_numbers = true)]
        months: i64,
    },
    /// Run a hosted checkout in the system browser
    Checkout {
        /// Tier to buy (basic, standard, premium, premiumPlus)
        #[arg(short, long, conflicts_with = "months")]
        tier: Option<PlanTier>,
        /// Subscription length in months
        #[arg(short, long)]
        months: Option<i64>,
        /// Print the checkout URL instead of opening a browser
        #[arg(long)]
        print_url: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Tiers => {
            print_tiers();
            Ok(())
        }
        Commands::Plans => run_plans(cli.config).await,
        Commands::Match { months } => run_match(cli.config, months).await,
        Commands::Checkout {
            tier,
            months,
            print_url,
        } => run_checkout(cli.config, tier, months, print_url).await,
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_tiers() {
    println!("{:<12} {:>7} {:>8}", "TIER", "MONTHS", "PRICE");
    for tier in PlanTier::ALL {
        let selection = tier.selection();
        println!(
            "{:<12} {:>7} {:>8} ({})",
            tier.as_str(),
            selection.months,
            selection.price,
            selection.note
        );
    }
}

fn catalog_from(config: Option<PathBuf>) -> Result<PlanCatalog> {
    let config = load_config(config.as_deref()).context("loading configuration")?;
    let client = BackendClient::from_config(&config.backend)?;
    Ok(PlanCatalog::new(client))
}

async fn run_plans(config: Option<PathBuf>) -> Result<()> {
    let plans = catalog_from(config)?.fetch_plans().await?;
    if plans.is_empty() {
        println!("The backend returned no plans.");
        return Ok(());
    }
    for plan in &plans {
        println!("{plan}");
    }
    Ok(())
}

async fn run_match(config: Option<PathBuf>, months: i64) -> Result<()> {
    let plans = catalog_from(config)?.fetch_plans().await?;
    match match_by_months(&plans, months) {
        Some(plan) => println!("{months} months -> {plan}"),
        None => bail!("no matching plan for {months} months ({} plans fetched)", plans.len()),
    }
    Ok(())
}

async fn run_checkout(
    config: Option<PathBuf>,
    tier: Option<PlanTier>,
    months: Option<i64>,
    print_url: bool,
) -> Result<()> {
    let selection = match (tier, months) {
        (Some(tier), _) => tier.selection(),
        (None, Some(months)) => DurationSelection::from_months(months),
        (None, None) => bail!("pass --tier or --months"),
    };

    let config = load_config(config.as_deref()).context("loading configuration")?;
    let opener = if print_url {
        UrlOpener::Print
    } else {
        UrlOpener::System
    };
    let session = CheckoutSession::from_config(&config, LoopbackBrowser::new(opener))?;

    if let Err(e) = session.refresh_catalog().await {
        eprintln!("Could not load plans: {e}");
    }

    println!("Starting checkout for {} ({})", selection.label, selection.price);
    // An interrupt drops the attempt, which puts the session back to `Idle`.
    let result = tokio::select! {
        result = session.start(&selection) => result,
        Ok(()) = tokio::signal::ctrl_c() => {
            info!("checkout interrupted");
            CheckoutResult::Cancelled
        }
    };

    let mut ctx = AppContext::new();
    let mut handler = CheckoutResultHandler::new();
    match handler.handle(&result, &mut ctx.account) {
        CheckoutAction::NavigateHome => {
            println!(
                "Subscription active (plan #{}).",
                ctx.account.active_plan.unwrap_or_default()
            );
        }
        CheckoutAction::StayOnSelection => println!("Checkout cancelled."),
        CheckoutAction::ShowError { message } => bail!(message),
    }
    session.acknowledge();
    Ok(())
}

//! Cartsync CLI - inspect and edit the synced cart.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart
//! cartsync show
//!
//! # Add two units of a product
//! cartsync add 64f0c2 -q 2
//!
//! # Remove a product, or everything
//! cartsync remove 64f0c2
//! cartsync clear
//!
//! # Print only the total
//! cartsync total
//! ```
//!
//! Without `CART_API_TOKEN` the cart is a guest cart kept in
//! `CART_STORAGE_DIR`. With a token the guest draft is merged into the
//! signed-in user's cart and changes are saved to the user record.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartsync::CartConfig;

mod commands;

use commands::cart::{Session, render};

#[derive(Parser)]
#[command(name = "cartsync")]
#[command(author, version, about = "Cart sync client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cart
    Show,
    /// Add a product to the cart
    Add {
        /// Product id
        product: String,

        /// Number of units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove a product from the cart
    Remove {
        /// Product id
        product: String,
    },
    /// Remove every product
    Clear,
    /// Print the cart total
    Total,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Map tracing levels to Sentry: warnings and errors become events, the rest
/// breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match CartConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartsync=info,cartsync_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, &config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &CartConfig) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(config).await?;

    match cli.command {
        Commands::Show => {}
        Commands::Add { product, quantity } => session.add(&product, quantity).await?,
        Commands::Remove { product } => {
            if !session.remove(&product)? {
                tracing::info!(product_id = %product, "Product was not in the cart");
            }
        }
        Commands::Clear => session.clear(),
        Commands::Total => {
            println!("{}", session.total().formatted);
            session.close().await;
            return Ok(());
        }
    }

    print!("{}", render(&session.cart(), &session.total()));
    session.close().await;
    Ok(())
}

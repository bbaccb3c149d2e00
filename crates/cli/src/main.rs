//! Frozen Mango CLI - drive the storefront engine from a terminal.
//!
//! A thin harness over the engine for manual testing and operations: browse
//! the catalog, edit the cart, sign in and out, and submit a checkout.
//! Sessions and cart snapshots persist in the local state store, so flows
//! can span invocations the way they span restarts of a shell.
//!
//! # Usage
//!
//! ```bash
//! # List the catalog
//! fm-cli catalog
//!
//! # Put three of product 1 in the cart, then inspect it
//! fm-cli cart add 1 3
//! fm-cli cart show
//!
//! # Sign in (triggers the anonymous cart transfer) and out
//! fm-cli session login -e ana@example.com -p secret
//! fm-cli session logout
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "fm-cli")]
#[command(author, version, about = "Frozen Mango storefront CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the product catalog
    Catalog,
    /// Inspect and edit the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage the session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show cart contents and totals
    Show,
    /// Set the quantity of a product
    Add {
        /// Product id
        product_id: i32,
        /// New quantity (negative clamps to zero)
        quantity: i64,
    },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Sign in with email and password
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,
        /// Account password
        #[arg(short, long)]
        password: String,
    },
    /// Sign out
    Logout,
    /// Show the signed-in profile
    Profile,
}

#[tokio::main]
async fn main() {
    // Load .env before reading RUST_LOG or engine configuration
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Catalog => commands::catalog::list().await?,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show().await?,
            CartAction::Add {
                product_id,
                quantity,
            } => commands::cart::add(product_id, quantity).await?,
            CartAction::Clear => commands::cart::clear().await?,
        },
        Commands::Session { action } => match action {
            SessionAction::Login { email, password } => {
                commands::session::login(&email, &password).await?;
            }
            SessionAction::Logout => commands::session::logout().await?,
            SessionAction::Profile => commands::session::profile().await?,
        },
    }
    Ok(())
}

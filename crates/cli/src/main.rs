//! Bazaar CLI - Drive the marketplace from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in; the session is kept in BAZAAR_SESSION_FILE
//! bazaar login -e sam@example.com -p secret
//!
//! # Who am I?
//! bazaar whoami
//!
//! # Browse
//! bazaar categories
//! bazaar products --page 2 --category 3 --query lamp
//! bazaar product 42
//!
//! # Favorites
//! bazaar favorites toggle 42
//! bazaar favorites list
//!
//! # Is the backend up, and which endpoints answer?
//! bazaar health
//! bazaar probe
//! ```
//!
//! Every command prints JSON on stdout. Failures print a user-facing message
//! on stderr and exit with status 1.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "bazaar")]
#[command(author, version, about = "Bazaar marketplace client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "BAZAAR_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in with it
    Register {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Public display name
        #[arg(short, long)]
        username: String,

        /// Account password
        #[arg(short, long, env = "BAZAAR_PASSWORD", hide_env_values = true)]
        password: String,

        /// Password confirmation (defaults to the password)
        #[arg(long)]
        password_confirmation: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the stored session, refreshed against the server
    Whoami,
    /// List categories
    Categories,
    /// List products
    Products {
        /// Page number (1-indexed)
        #[arg(long)]
        page: Option<u32>,

        /// Page size
        #[arg(long)]
        limit: Option<u32>,

        /// Only products in this category
        #[arg(long)]
        category: Option<String>,

        /// Free-text search
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Show one product
    Product {
        /// Product id
        id: String,
    },
    /// Trending products
    Trending,
    /// Manage favorites
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
    /// Check that the backend is reachable
    Health,
    /// Call each read endpoint once and report the outcome
    Probe,
}

#[derive(Subcommand)]
enum FavoritesAction {
    /// List favorited products
    List {
        /// Page number (1-indexed)
        #[arg(long)]
        page: Option<u32>,
    },
    /// Favorite or unfavorite a product
    Toggle {
        /// Product id
        id: String,
    },
}

/// Initialize Sentry error tracking when `SENTRY_DSN` is set.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|v| !v.trim().is_empty())?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: std::env::var("SENTRY_ENVIRONMENT")
                .ok()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load .env before anything reads the environment
    let _ = dotenvy::dotenv();

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry();

    // Logs go to stderr so stdout stays valid JSON
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bazaar_client=warn,bazaar_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        #[allow(clippy::print_stderr)]
        {
            eprintln!("{}", e.user_message());
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let market = commands::open()?;

    let result = match cli.command {
        Commands::Login { email, password } => {
            commands::session::login(&market, email, password).await
        }
        Commands::Register {
            email,
            username,
            password,
            password_confirmation,
        } => {
            let confirmation = password_confirmation.unwrap_or_else(|| password.clone());
            commands::session::register(&market, email, username, password, confirmation).await
        }
        Commands::Logout => commands::session::logout(&market).await,
        Commands::Whoami => commands::session::whoami(&market).await,
        Commands::Categories => commands::catalog::categories(&market).await,
        Commands::Products {
            page,
            limit,
            category,
            query,
        } => commands::catalog::products(&market, page, limit, category, query).await,
        Commands::Product { id } => commands::catalog::product(&market, &id).await,
        Commands::Trending => commands::catalog::trending(&market).await,
        Commands::Favorites { action } => match action {
            FavoritesAction::List { page } => commands::catalog::favorites(&market, page).await,
            FavoritesAction::Toggle { id } => commands::catalog::toggle_favorite(&market, &id).await,
        },
        Commands::Health => commands::diagnostics::health(&market).await,
        Commands::Probe => commands::diagnostics::probe(&market).await,
    };

    market.session.dispose();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_products_filters() {
        let cli = Cli::try_parse_from([
            "bazaar", "products", "--page", "2", "--category", "3", "-q", "lamp",
        ])
        .unwrap_or_else(|e| panic!("{e}"));
        match cli.command {
            Commands::Products {
                page,
                limit,
                category,
                query,
            } => {
                assert_eq!(page, Some(2));
                assert_eq!(limit, None);
                assert_eq!(category.as_deref(), Some("3"));
                assert_eq!(query.as_deref(), Some("lamp"));
            }
            _ => panic!("expected products"),
        }
    }

    #[test]
    fn test_parse_favorites_toggle() {
        let cli = Cli::try_parse_from(["bazaar", "favorites", "toggle", "42"])
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            cli.command,
            Commands::Favorites {
                action: FavoritesAction::Toggle { ref id }
            } if id == "42"
        ));
    }
}

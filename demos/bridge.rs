//! Run the bridge against a local backend.
//!
//! Demonstrates:
//! - Loading bridge options (defaults or a JSON file)
//! - Registering a Grok page session authenticated by a cookie header
//! - Watching transport state changes until Ctrl+C
//!
//! Usage:
//!   GROK_COOKIE="sso=...; sso-rw=..." cargo run --example bridge
//!   cargo run --example bridge -- --config bridge.json
//!   cargo run --example bridge -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use grok_bridge::{Bridge, BridgeOptions, GrokExecutor, Result};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Page URL the Grok session is registered under.
const GROK_PAGE_URL: &str = "https://grok.com/";

/// Environment variable holding the cookie header.
const COOKIE_ENV: &str = "GROK_COOKIE";

// ============================================================================
// Args
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    config: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let config = args
            .iter()
            .position(|a| a == "--config")
            .and_then(|i| args.get(i + 1))
            .cloned();

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            config,
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Grok Bridge ===\n");

    // ========================================================================
    // Options
    // ========================================================================

    let options = match &args.config {
        Some(path) => {
            println!("[1] Loading options from {path}...");
            BridgeOptions::from_json(&std::fs::read_to_string(path)?)?
        }
        None => {
            println!("[1] Using default options...");
            BridgeOptions::default()
        }
    };
    println!("    Backend: {}", options.primary_url()?);
    if let Some(fallback) = options.fallback_url()? {
        println!("    Fallback: {fallback}");
    }
    println!("    ✓ Options ready\n");

    // ========================================================================
    // Bridge
    // ========================================================================

    println!("[2] Registering Grok page session...");
    let cookie = std::env::var(COOKIE_ENV).unwrap_or_default();
    if cookie.is_empty() {
        println!("    ! {COOKIE_ENV} is not set; Grok calls will be anonymous");
    }

    let bridge = Bridge::builder().options(options).build()?;
    let session_id = bridge
        .pages()
        .register(GROK_PAGE_URL, Arc::new(GrokExecutor::new(&cookie)?));
    println!("    ✓ Session {session_id} at {GROK_PAGE_URL}\n");

    println!("[3] Starting bridge...");
    let handle = bridge.spawn();
    let mut states = handle.subscribe_state();
    println!("    ✓ Running. Press Ctrl+C to exit...\n");

    // ========================================================================
    // Watch
    // ========================================================================

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("    state: {}", *states.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("\n[4] Shutting down...");
    handle.shutdown().await;
    println!("    ✓ Done");

    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "grok_bridge=debug"
    } else {
        "grok_bridge=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

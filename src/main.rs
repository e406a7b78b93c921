//! AuthRelay CLI
//!
//! Run with: cargo run --bin relay -- <command>
//! Or after build: ./target/release/relay <command>

#[tokio::main]
async fn main() {
    // Provider credentials usually come from .env
    let _ = dotenvy::dotenv();

    authrelay::init_logging();

    if let Err(e) = authrelay::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

//! Command-line entrypoint. Both the hub and the client start here.
use eyre::Result;

pub mod cli;
pub mod config;
pub mod create;
pub mod engine;
pub mod history;
pub mod hub;
pub mod llm;
pub mod logging;
pub mod notify;
pub mod patch;
pub mod plan;
pub mod prompting;
pub mod protocol;
pub mod store;
pub mod stream;
pub mod tools;
pub mod tree;

#[tokio::main]
async fn main() -> Result<()> {
    logging::setup_tracing();
    cli::run().await
}

//! Shopmate chat relay - Standalone Binary
//!
//! Serves `POST /api/chat` and proxies one streaming completion call per
//! request. For embedded use, import the library directly.

use clap::Parser;
use config::UpstreamConfig;
use llm::DeepSeekProvider;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on (0 for random)
    #[arg(short, long, default_value_t = 8787)]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Set up logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    config::load_env_file();
    let upstream = UpstreamConfig::load();

    let api_key = upstream
        .api_key
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DEEPSEEK_API_KEY is not set"))?;

    let provider = DeepSeekProvider::new(&upstream.base_url, api_key)?;
    let model = provider.create_chat_model(&upstream.model);

    let handle =
        shopmate_relay::start_server_on(&args.host, args.port, model, upstream.system_prompt)
            .await?;

    println!("Shopmate chat relay running at {}", handle.url());
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    handle.stop();
    Ok(())
}

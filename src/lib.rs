pub mod auth;
pub mod cli;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;

use cli::{ mask_secret, Args };
use log::info;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Identity Provider: {}{}", args.auth_base_url, args.auth_user_path);
    info!("Identity Provider Key: {}", mask_secret(&args.auth_anon_key));
    info!("Chat Endpoint: {}", args.chat_base_url);
    info!("Chat Model: {}", args.chat_model);
    info!("Chat API Key: {}", mask_secret(&args.chat_api_key));
    info!("Session Store Type: {}", args.store_type);
    if args.store_type == "redis" {
        info!("Session Store Host: {}", args.store_host);
    }
    info!("Session Key Prefix: {}", args.store_key_prefix);
    match args.stream_idle_timeout() {
        Some(timeout) => info!("Stream Idle Timeout: {}s", timeout.as_secs()),
        None => info!("Stream Idle Timeout: disabled"),
    }
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let server = Server::from_args(&args)?;
    info!("Starting server on: {}", args.server_addr);
    server.run().await?;

    Ok(())
}

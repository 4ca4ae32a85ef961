//! `atlas serve`: start the HTTP chat server.

use atlas_config::AppConfig;

pub async fn run(mut config: AppConfig, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🤖 Atlas Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.model);
    println!("   Static:    {}", config.gateway.static_dir.display());
    if !config.has_api_key() {
        println!("   ⚠️  OPENROUTER_API_KEY not set; /api/chat will answer 500");
    }

    atlas_gateway::start(config).await?;

    Ok(())
}

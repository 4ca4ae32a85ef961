//! `atlas doctor`: diagnose configuration and connectivity.

use std::path::Path;

use atlas_config::AppConfig;
use atlas_core::provider::Provider;
use atlas_providers::OpenAiCompatProvider;

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Atlas Doctor: System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    if config.has_api_key() {
        println!("  ✅ OPENROUTER_API_KEY configured");
    } else {
        println!("  ❌ OPENROUTER_API_KEY not set; chat is unavailable");
        issues += 1;
    }

    if config.has_conversion_key() {
        println!("  ✅ FREECRYPTO_API_KEY configured");
    } else {
        println!("  ⚠️  FREECRYPTO_API_KEY not set; running without live conversion quotes");
        issues += 1;
    }

    issues += check_document("Instructions", &config.knowledge.instructions_path);
    issues += check_document("Knowledge base", &config.knowledge.knowledge_base_path);

    let index = config.gateway.static_dir.join("index.html");
    if index.is_file() {
        println!("  ✅ Web front-end found at {}", index.display());
    } else {
        println!("  ⚠️  No index.html in {}", config.gateway.static_dir.display());
        issues += 1;
    }

    match OpenAiCompatProvider::from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Model endpoint reachable ({})", config.provider.base_url),
            Ok(false) => {
                println!("  ❌ Model endpoint rejected the health check");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Model endpoint unreachable: {e}");
                issues += 1;
            }
        },
        Err(_) => println!("  ⏭️  Skipping model endpoint check (no API key)"),
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

fn check_document(label: &str, path: &Path) -> usize {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            println!("  ✅ {label} loaded from {} ({} bytes)", path.display(), text.len());
            0
        }
        Err(e) => {
            println!(
                "  ⚠️  {label} unreadable at {} ({e}); the agent uses fallback instructions",
                path.display()
            );
            1
        }
    }
}

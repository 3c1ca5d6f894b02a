//! Server command implementation

use std::path::Path;

use anyhow::Result;
use ledgerly_core::AppConfig;

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
    app_config: AppConfig,
) -> Result<()> {
    println!("🚀 Starting Ledgerly web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    println!(
        "   Default organization: {}",
        app_config.default_organization_id
    );

    let config = ledgerly_server::ServerConfig {
        require_auth: !no_auth,
        allowed_origins: vec![],
        api_keys: vec![],
    }
    .with_env_api_keys();

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if config.api_keys.is_empty() {
        println!(
            "   ❌ Authentication required but {} is empty",
            ledgerly_server::API_KEYS_ENV
        );
    } else {
        println!(
            "   🔑 API keys: {} configured ({})",
            config.api_keys.len(),
            ledgerly_server::API_KEYS_ENV
        );
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;

    ledgerly_server::serve(db, host, port, config, app_config).await?;

    Ok(())
}

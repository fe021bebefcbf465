//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use ciclops_core::{AIClient, Pipeline};
use ciclops_server::ServerConfig;

use super::{load_config, open_db};

pub async fn cmd_serve(
    db_path: &Path,
    config_path: Option<&Path>,
    host: &str,
    port: u16,
    allowed_origins: Vec<String>,
    no_encrypt: bool,
) -> Result<()> {
    println!("🚀 Starting Ciclops web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    if !allowed_origins.is_empty() {
        println!("   CORS origins: {}", allowed_origins.join(", "));
    }

    let config = load_config(config_path)?;
    let db = open_db(db_path, no_encrypt)?;
    let ai = AIClient::from_env();
    let pipeline = Pipeline::new(db, &config, ai.clone()).context("Failed to start pipeline")?;

    let server_config = ServerConfig { allowed_origins };
    ciclops_server::serve(pipeline, ai, host, port, server_config).await
}

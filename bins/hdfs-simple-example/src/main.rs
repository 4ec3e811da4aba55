use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hdfs_client::{ClientConfig, OpenMode, Session};
use hdfs_logging::LogConfig;
use hdfs_stubs::{InMemoryConnector, InMemoryNamenode};
use hdfs_types::Endpoint;

/// HDFS client walkthrough
///
/// Starts an in-process namenode and runs a scripted session against it:
///   1. Connect and create a working directory
///   2. Write a file spanning several blocks
///   3. List, stat and locate its blocks
///   4. Read it back and compare
///   5. Clean up and disconnect
#[derive(Parser, Debug)]
#[command(name = "hdfs-simple-example", version, about)]
struct Args {
    /// Path to a client configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Namenode host name
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Namenode port (0 = default)
    #[arg(long, default_value_t = 0)]
    port: u16,

    /// Size of the demo file in bytes
    #[arg(long, default_value_t = 3 * 1024 * 1024 + 17)]
    size: usize,

    /// Block size for the demo file in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    block_size: i64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _guard = hdfs_logging::init_logging(&LogConfig {
        level: args.log_level.clone(),
        ..LogConfig::default()
    })?;

    let config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };
    tracing::info!(host = %args.host, port = args.port, user = %config.user, "Starting HDFS simple example");

    let namenode = InMemoryNamenode::new().into_arc();
    let connector = Arc::new(InMemoryConnector::new());
    connector.register(Endpoint::new(args.host.as_str(), args.port), namenode);

    let session = Session::connected(config, connector, &args.host, args.port).await?;
    let home = session.working_directory().await?;
    session.mkdir(&home).await?;

    let payload: Vec<u8> = (0..args.size).map(|i| (i % 251) as u8).collect();
    let mut writer = session
        .open("demo/data.bin", OpenMode::Write, 0, 0, args.block_size)
        .await?;
    writer.write(&payload).await?;
    writer.close().await?;
    tracing::info!(bytes = payload.len(), "file written");

    for info in session.list_directory("demo").await? {
        println!("{}", serde_json::to_string(&info)?);
    }
    let info = session.stat("demo/data.bin").await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    let blocks = session
        .get_block_locations("demo/data.bin", 0, info.size)
        .await?;
    println!("{}", serde_json::to_string_pretty(&blocks)?);

    let mut reader = session.open("demo/data.bin", OpenMode::Read, 0, 0, 0).await?;
    let mut read_back = Vec::with_capacity(payload.len());
    loop {
        let chunk = reader.read(reader.buffer_size()).await?;
        if chunk.is_empty() {
            break;
        }
        read_back.extend_from_slice(&chunk);
    }
    reader.close().await?;
    anyhow::ensure!(read_back == payload, "read back data differs from what was written");
    tracing::info!(bytes = read_back.len(), "file verified");

    println!(
        "capacity={} used={} default_block_size={}",
        session.capacity().await?,
        session.used().await?,
        session.default_block_size().await?
    );

    session.delete("demo").await?;
    session.disconnect().await?;
    tracing::info!("Simple example finished. Goodbye!");

    Ok(())
}

//! relaywire - Inspect and transcode relay protocol captures
//!
//! Captures are hex dumps of the raw byte stream of one connection.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use relaywire::config::{self, Config};
use relaywire::protocol::{
    negotiate_version, Framing, Message, MessageFactory, MessageKind, StreamAccumulator,
    VersionRegistry, WireMessage, MIN_KNOWN_VERSION,
};

/// relaywire - Relay protocol inspection and conversion
#[derive(Parser)]
#[command(name = "relaywire")]
#[command(author = "Relaywire Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Inspect and transcode relay wire protocol captures", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every message framed in a hex capture
    Inspect {
        /// Hex capture file, or - for stdin
        file: PathBuf,

        /// Protocol version of the capture (read from a leading hello if omitted)
        #[arg(long = "protocol")]
        protocol_version: Option<u32>,

        /// Print one JSON object per message
        #[arg(long)]
        json: bool,
    },

    /// Transcode every message in a hex capture to another version
    Convert {
        /// Hex capture file, or - for stdin
        file: PathBuf,

        /// Version of the capture
        #[arg(long)]
        from: u32,

        /// Version to convert to
        #[arg(long)]
        to: u32,
    },

    /// Print the protocol version declared by a leading hello
    Negotiate {
        /// Hex capture file, or - for stdin
        file: PathBuf,
    },

    /// List the supported protocol versions
    Versions,

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    match cli.command {
        Commands::Inspect {
            file,
            protocol_version,
            json,
        } => {
            let bytes = read_capture(&file)?;
            run_inspect(&config, bytes, protocol_version, json)?;
        }
        Commands::Convert { file, from, to } => {
            let bytes = read_capture(&file)?;
            run_convert(&config, bytes, from, to)?;
        }
        Commands::Negotiate { file } => {
            let bytes = read_capture(&file)?;
            match negotiate_version(&bytes) {
                Some(version) => println!("{}", version),
                None => bail!("Capture does not start with a complete hello"),
            }
        }
        Commands::Versions => {
            print_versions(&config)?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Read a hex capture, ignoring whitespace
fn read_capture(path: &Path) -> anyhow::Result<Bytes> {
    let mut text = String::new();
    if path == Path::new("-") {
        std::io::stdin().read_to_string(&mut text)?;
    } else {
        text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
    }

    let hex: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&hex).context("Capture is not valid hex")?;
    Ok(Bytes::from(bytes))
}

/// Split a capture into frames under `version`
fn extract_all(factory: &MessageFactory, bytes: Bytes) -> anyhow::Result<Vec<WireMessage>> {
    let mut stream = StreamAccumulator::new();
    stream.add(bytes);

    let mut messages = Vec::new();
    while let Some(msg) = factory.try_extract(&mut stream)? {
        messages.push(msg);
    }
    if !stream.is_empty() {
        tracing::warn!("{} trailing bytes do not form a complete message", stream.len());
    }
    Ok(messages)
}

fn run_inspect(
    config: &Config,
    bytes: Bytes,
    protocol_version: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let local = config.protocol.local_version;
    let version = match protocol_version.or_else(|| negotiate_version(&bytes)) {
        // A hello declares the sender's version; anything newer is read as ours
        Some(version) => version.min(local),
        None => local,
    };
    if version < MIN_KNOWN_VERSION {
        bail!("Unknown protocol version {}", version);
    }

    let factory = MessageFactory::new(version, config.protocol.max_message_size);
    let messages = extract_all(&factory, bytes)?;

    for (index, msg) in messages.iter().enumerate() {
        if json {
            println!("{}", message_json(msg));
        } else {
            print_message(index, msg);
        }
    }

    tracing::info!("{} messages under protocol v{}", messages.len(), version);
    Ok(())
}

fn print_message(index: usize, msg: &WireMessage) {
    println!(
        "#{} {} v{}: {} bytes (payload {})",
        index,
        msg.command(),
        msg.version(),
        msg.len(),
        msg.payload_len()
    );
    if let Ok(prefix) = msg.broadcast_prefix() {
        println!("    hash: {}", prefix.message_hash);
        if let Some(network_num) = prefix.network_num {
            println!("    network: {}", network_num);
        }
        if let Some(source_id) = prefix.source_id {
            println!("    source: {}", source_id);
        }
    }
    match msg.decode() {
        Ok(message) => println!("    {}", summarize(message)),
        Err(e) => println!("    undecodable: {}", e),
    }
}

fn message_json(msg: &WireMessage) -> serde_json::Value {
    let prefix = msg.broadcast_prefix().ok();
    serde_json::json!({
        "command": msg.command().as_str(),
        "version": msg.version(),
        "length": msg.len(),
        "payload_len": msg.payload_len(),
        "control_flags": msg.control_flags().map(|f| f.bits()),
        "hash": prefix.map(|p| p.message_hash.to_string()),
        "network_num": prefix.and_then(|p| p.network_num),
        "source_id": prefix.and_then(|p| p.source_id).map(|id| id.to_string()),
        "summary": msg.decode().map(summarize).ok(),
    })
}

fn summarize(message: &Message) -> String {
    match message {
        Message::Hello(m) => format!(
            "hello version={} network={} node={}",
            m.protocol_version, m.network_num, m.node_id
        ),
        Message::Ping(m) => format!("ping nonce={}", m.nonce),
        Message::Pong(m) => format!("pong nonce={} timestamp={}", m.nonce, m.timestamp),
        Message::Broadcast(m) => format!(
            "broadcast type={:?} encrypted={} blob={} bytes",
            m.broadcast_type,
            m.is_encrypted,
            m.blob.len()
        ),
        Message::Tx(m) => format!(
            "tx short_id={} flags={:#06x} timestamp={} value={} bytes",
            m.short_id,
            m.transaction_flag.to_bits(),
            m.timestamp,
            m.tx_val.len()
        ),
        Message::Key(_) => "key".to_string(),
        Message::GetTxs(m) => format!("gettxs {} short ids", m.short_ids.len()),
        Message::Txs(m) => format!("txs {} entries", m.txs.len()),
        Message::Notification(m) => format!("notify code={} {:?}", m.code, m.text),
        Message::TxCleanup(m) | Message::BlockConfirmation(m) => format!(
            "{} {} short ids, {} hashes",
            message.kind(),
            m.short_ids.len(),
            m.tx_hashes.len()
        ),
        other => other.kind().to_string(),
    }
}

fn run_convert(config: &Config, bytes: Bytes, from: u32, to: u32) -> anyhow::Result<()> {
    let registry = VersionRegistry::new(config.protocol_settings()?)?;
    let factory = registry.factory(from)?;

    let mut output = Vec::new();
    let mut converted = 0;
    for msg in extract_all(&factory, bytes)? {
        let out = registry
            .convert(&msg, from, to)
            .with_context(|| format!("Failed to convert {}", msg.kind()))?;
        output.extend_from_slice(out.as_bytes());
        converted += 1;
    }

    println!("{}", hex::encode(output));
    tracing::info!("Converted {} messages from v{} to v{}", converted, from, to);
    Ok(())
}

fn print_versions(config: &Config) -> anyhow::Result<()> {
    let registry = VersionRegistry::new(config.protocol_settings()?)?;

    println!("Local protocol version: {}", registry.local_version());
    println!("Supported versions:");
    for version in registry.versions() {
        let framing = Framing::for_version(version);
        let factory = registry.factory(version)?;
        let introduced: Vec<_> = MessageKind::ALL
            .into_iter()
            .filter(|kind| kind.introduced_in() == version)
            .map(|kind| kind.name())
            .collect();

        print!(
            "  v{:<3} {:?} framing, {}-byte header, {} kinds",
            version,
            framing,
            framing.header_len(),
            factory.kinds().len()
        );
        if introduced.is_empty() {
            println!();
        } else {
            println!(" (new: {})", introduced.join(", "));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["relaywire", "versions"]);
        assert!(cli.is_ok());

        let cli = Cli::try_parse_from(["relaywire", "convert", "-", "--from", "15", "--to", "22"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_extract_all_from_capture() {
        let factory = MessageFactory::new(22, 1024);
        let mut bytes = relaywire::protocol::encode(&Message::Ack, 22)
            .unwrap()
            .as_bytes()
            .to_vec();
        bytes.extend_from_slice(&[0xFF, 0xFE]);

        let messages = extract_all(&factory, Bytes::from(bytes)).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), MessageKind::Ack);
    }
}

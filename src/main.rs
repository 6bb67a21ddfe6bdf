//! Entry point for `udp-file-transfer`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client**
//! mode.  All actual protocol work is delegated to library modules; `main.rs`
//! owns only process setup (logging, argument parsing, exit status).

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use udp_file_transfer::socket::Socket;
use udp_file_transfer::{Client, RetryConfig, Server, ServerConfig};

/// Reliable single-file upload over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Receive uploads, writing each transfer to its own artifact.
    Server {
        /// UDP port to listen on (1024–65535).
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1024..))]
        port: u16,
        /// Directory where received files are written.
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Upload one file to a server.
    Client {
        /// Server hostname or address.
        #[arg(short, long)]
        server: String,
        /// Server UDP port (1024–65535).
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1024..))]
        port: u16,
        /// Path of the file to upload.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server { port, output_dir } => {
            let config = ServerConfig {
                output_dir,
                ..ServerConfig::default()
            };
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            let server = Server::bind(addr, config)
                .await
                .with_context(|| format!("failed to bind UDP port {port}"))?;
            println!("UDP server listening on port {port}");
            server.run().await?;
            Ok(())
        }
        Mode::Client { server, port, file } => {
            anyhow::ensure!(
                file.is_file(),
                "file not found or not a regular file: {}",
                file.display()
            );

            let dest = tokio::net::lookup_host((server.as_str(), port))
                .await
                .with_context(|| format!("cannot resolve {server}:{port}"))?
                .next()
                .with_context(|| format!("no address for {server}"))?;

            let socket = Socket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
            let client = Client::new(socket, dest, RetryConfig::default());

            println!("Sending file: {} to {dest}", file.display());
            let total = client
                .upload(&file)
                .await
                .context("transfer failed")?;
            println!("File sent successfully! Total bytes: {total}");
            Ok(())
        }
    }
}

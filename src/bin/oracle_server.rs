use padding_oracle::oracle::http::server;
use padding_oracle::MacPrefixOracle;

use axum::serve;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use std::sync::Arc;

/// Serve a MAC-then-encrypt padding oracle over HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// address to listen on
    #[arg(short, long, default_value_t = String::from("127.0.0.1:9000"))]
    address: String,

    /// the secret message to seal under fresh random keys
    #[arg(short, long, default_value_t = String::from("I'm back and I'm ringin' the bell"))]
    message: String,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut rng = rand::thread_rng();
    let oracle = MacPrefixOracle::from_rng(&mut rng);
    let ciphertext = oracle.seal_with_rng(args.message.as_bytes(), &mut rng);
    println!("{}", ciphertext.to_hex());

    let listener = TcpListener::bind(&args.address).await?;
    info!(addr = %listener.local_addr()?, "oracle server listening");
    serve(listener, server::router(Arc::new(oracle))).await
}

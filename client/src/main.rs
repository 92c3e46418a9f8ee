use clap::Parser;
use client::network::ChatClient;
use log::info;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:3000")]
    server: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Connecting to: {}", args.server);
    let client = ChatClient::connect(&args.server).await?;
    info!("Type a message and press Enter; /list shows who is online, /quit leaves");

    let stdin = BufReader::new(tokio::io::stdin());
    let received = client.run(stdin, tokio::io::stdout()).await?;
    info!("Disconnected after receiving {} bytes", received);

    Ok(())
}

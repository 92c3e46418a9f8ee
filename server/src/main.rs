use clap::Parser;
use log::{error, info};
use server::config::{DEFAULT_HOST, DEFAULT_MAX_LINE_LENGTH, DEFAULT_PIPELINE_CAPACITY};
use server::pipeline::LogSink;
use server::{ChatServer, ServerConfig};

/// Main-method of the chat server.
/// Parses command-line arguments, starts the server and shuts it down on Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = DEFAULT_HOST)]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
        port: u16,
        /// Messages buffered before chatting clients have to wait
        #[clap(long, default_value_t = DEFAULT_PIPELINE_CAPACITY)]
        pipeline_capacity: usize,
        /// Longest accepted line in bytes
        #[clap(long, default_value_t = DEFAULT_MAX_LINE_LENGTH)]
        max_line_length: usize,
        /// Maximum number of simultaneous clients (unbounded if omitted)
        #[clap(long)]
        max_clients: Option<usize>,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig::new(format!("{}:{}", args.host, args.port))
        .with_pipeline_capacity(args.pipeline_capacity)
        .with_max_line_length(args.max_line_length)
        .with_max_clients(args.max_clients);

    let server = ChatServer::bind(config).await?;

    // Handle shutdown gracefully
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Received Ctrl+C, shutting down gracefully...");
        shutdown.trigger();
    });

    let report = server.start(LogSink).await?;
    info!(
        "Served {} connection(s), delivered {} message(s)",
        report.connections_accepted, report.messages_delivered
    );

    Ok(())
}

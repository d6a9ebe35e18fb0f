use quorum_chat::{try_start_server, ServerConfig};
use slog::Drain;
use std::env;
use std::process;

#[tokio::main]
async fn main() {
    let config_path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("Usage: quorum-chat-server <config.json>");
            process::exit(2);
        }
    };

    let config = match ServerConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };

    let logger = create_root_logger_for_stdout(config.node_id.clone());
    let server = match try_start_server(config, logger.clone()).await {
        Ok(server) => server,
        Err(e) => {
            slog::crit!(logger, "Failed to start server: {}", e);
            // Dropping the last logger flushes the async drain.
            drop(logger);
            process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        slog::error!(logger, "Failed to listen for ctrl-c: {:?}", e);
    }
    slog::info!(logger, "Shutting down");
    server.shutdown();
}

fn create_root_logger_for_stdout(node_id: String) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("NodeId" => node_id))
}

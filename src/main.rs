use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;

use clap::Parser;
use tracing::{info, warn};

use gclangd::logging;
use gclangd::search::GrepSearch;
use gclangd::server::{writer_loop, Server, ServerConfig, SERVER_NAME};
use gclangd::uri;

/// Grep-backed language server for C/C++. Speaks LSP over stdio.
#[derive(Parser)]
#[command(name = SERVER_NAME, version, about)]
struct Cli {
    /// Restrict searches to these files instead of scanning the workspace
    /// root recursively.
    #[arg(long = "files", num_args = 1..)]
    files: Vec<PathBuf>,

    /// Write logs here instead of stderr.
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let log_file = cli.log_file.or_else(logging::default_log_file);
    let _logging = logging::init(log_file.as_deref());

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let serve_files: Vec<PathBuf> = cli
        .files
        .iter()
        .map(|p| uri::absolutize(&cwd, p))
        .collect();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        files = serve_files.len(),
        "starting"
    );

    let (tx, rx) = mpsc::channel();
    let writer = match thread::Builder::new()
        .name("gclangd-writer".to_string())
        .spawn(move || writer_loop(rx, io::stdout()))
    {
        Ok(handle) => handle,
        Err(err) => {
            warn!(error = %err, "failed to spawn writer thread");
            std::process::exit(1);
        }
    };

    let mut server = Server::new(
        ServerConfig { serve_files },
        Arc::new(GrepSearch::new()),
        tx,
    );
    let stdin = io::stdin();
    let code = server.run(&mut BufReader::new(stdin.lock()));
    info!(code, "exiting");

    // Dropping the server closes the writer channel; joining lets the
    // final responses reach the client before the process dies.
    drop(server);
    let _ = writer.join();
    std::process::exit(code);
}

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use scanbridge_core::AppConfig;
use tracing::info;

mod serve;
mod shell;

/// scanbridge - discover, describe and bridge printer/scanner devices
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "scanbridge_wsd=debug"
    #[arg(long, env = "SCANBRIDGE_LOG", default_value = "warn")]
    log: String,

    /// A single command to execute instead of the interactive shell
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() {
    // Install default crypto provider for rustls
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&args.log)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config from {:?}", path))?,
        None => AppConfig::default(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    let context = Arc::new(shell::ShellContext {
        runtime: runtime.handle().clone(),
        config,
    });
    let root = shell::root_command(&context);

    // One-shot mode: run the command line given on the OS argv.
    if !args.command.is_empty() {
        return root.run(&args.command);
    }

    // Interactive shell.
    println!("scanbridge interactive console.");
    println!("Confused? Say help!");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("scanbridge> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line.context("failed to read input")?;

        match shell::exec(&root, &line) {
            Ok(shell::ExecResult::Continue) => {}
            Ok(shell::ExecResult::Exit) => break,
            Err(err) => eprintln!("{}", err),
        }
    }

    info!("shell terminated");
    Ok(())
}

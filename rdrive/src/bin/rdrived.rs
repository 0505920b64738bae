use anyhow::Context;
use clap::Parser;
use std::io::Write;

use rdrive_tools_rdrive::{registry, session};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rdrived",
    version,
    about = "Folder synchronization server - holds the authoritative copy of every user's folder",
    long_about = "`rdrived` accepts connections from `rdrive` clients. Each connection is one \
round: a brand-new user registration, a new-device enrolment, or a normal sync exchanging change \
commands.

The authoritative folders live under the remotes root, one directory per user id. User state is \
kept in memory only; restarting the server forgets all registrations (the folders stay on disk)."
)]
struct Args {
    /// TCP port to listen on (0 binds an ephemeral port; the bound address
    /// is printed to stdout)
    listen_port: u16,

    /// Directory holding one authoritative folder per user
    #[arg(
        long,
        default_value = "./remotes",
        value_name = "DIR",
        help_heading = "Storage"
    )]
    remotes_root: std::path::PathBuf,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Output")]
    verbose: u8,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Output")]
    quiet: bool,
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&args.remotes_root)
        .await
        .with_context(|| format!("cannot create remotes root {:?}", args.remotes_root))?;
    let listener = session::bind_listener(args.listen_port)?;
    let addr = listener
        .local_addr()
        .context("failed reading the bound address")?;
    tracing::info!("listening on {addr}");
    // print the bound address so scripts and tests can attach
    println!("{addr}");
    std::io::stdout().flush().context("failed writing stdout")?;
    let registry = registry::Registry::new(args.remotes_root);
    tokio::select! {
        result = session::serve(listener, registry) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_tracing(args.quiet, args.verbose);
    if let Err(error) = async_main(args).await {
        tracing::error!("{error:#}");
        eprintln!("rdrived: {error:#}");
        std::process::exit(1);
    }
}

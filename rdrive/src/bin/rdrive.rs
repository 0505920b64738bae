use anyhow::Context;
use clap::Parser;
use std::io::Write;

use rdrive_tools_rdrive::{driver, enroll, queue, watcher};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rdrive",
    version,
    about = "Folder synchronization client - mirrors a local folder across all of a user's devices",
    long_about = "`rdrive` keeps a local folder in sync with a user's authoritative copy on an \
`rdrived` server.

On the first run, omit the user id: the client registers a new user, uploads the folder as the \
initial authoritative copy and prints the assigned 128-character id to stdout. Pass that id on \
every other device (and on subsequent runs) to enrol as an additional device and download the \
current folder before syncing.

EXAMPLES:
    # First device: register a new user and start syncing every 10 seconds
    rdrive sync.example.com 9744 ~/Drive

    # Another device of the same user, syncing every 5 seconds
    rdrive sync.example.com 9744 ~/Drive 5 <user-id>"
)]
struct Args {
    /// Server host name or address
    server_host: String,

    /// Server TCP port
    server_port: u16,

    /// Local folder to mirror (created if missing)
    folder: std::path::PathBuf,

    /// Seconds between sync rounds
    #[arg(default_value = "10")]
    sync_period: u64,

    /// 128-character user id from a previous registration; omit (or pass
    /// the all-zero sentinel) to register as a new user
    user_id: Option<String>,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Output")]
    verbose: u8,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Output")]
    quiet: bool,
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let server_addr = format!("{}:{}", args.server_host, args.server_port);
    tokio::fs::create_dir_all(&args.folder)
        .await
        .with_context(|| format!("cannot create folder {:?}", args.folder))?;
    let folder = args
        .folder
        .canonicalize()
        .with_context(|| format!("cannot resolve folder {:?}", args.folder))?;

    let (user_id, device_id) = match args.user_id {
        Some(ref id) if !wire::is_unassigned_user_id(id) => {
            anyhow::ensure!(
                id.len() == wire::USER_ID_LENGTH && id.bytes().all(|b| b.is_ascii_alphanumeric()),
                "the user id must be {} alphanumeric characters",
                wire::USER_ID_LENGTH
            );
            let device_id = enroll::register_device(&server_addr, id, &folder).await?;
            (id.clone(), device_id)
        }
        _ => {
            let user_id = enroll::register_user(&server_addr, &folder).await?;
            // print the assigned id so it can be passed on the next run
            println!("{user_id}");
            std::io::stdout().flush().context("failed writing stdout")?;
            (user_id, 0)
        }
    };

    let queue = queue::OutboundQueue::new();
    let capturer = watcher::ChangeCapturer::new(&folder, queue.clone())?;
    let config = driver::SyncConfig {
        server_addr,
        folder,
        user_id,
        device_id,
        period: std::time::Duration::from_secs(args.sync_period.max(1)),
    };
    tokio::select! {
        result = capturer.run() => result.context("change capture failed"),
        result = driver::run(config, queue) => result,
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
        eprintln!("rdrive: {error:#}");
        std::process::exit(1);
    }
}

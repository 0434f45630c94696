use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;

use common::copy::FsPath;
use common::local::LocalFs;
use common::sftp::SftpFs;
use common::wfs::Wfs;

mod target;
mod term;

/// Copy SOURCE to TARGET, or multiple SOURCE(s) to a directory TARGET.
/// Uses SFTP for remote file copies.
///
/// ccp will ask for passwords or passphrases if they are needed
/// for authentication.
///
/// The source and target may be specified as a local pathname or a remote
/// host with optional path in the form [user@]host:[path]. Local file names
/// can be made explicit using absolute or relative pathnames to avoid ccp
/// treating file names containing ':' as host specifiers.
#[derive(Parser, Debug)]
#[command(name = "ccp", version)]
struct Args {
    /// If an existing destination file cannot be opened, remove it and try
    /// again
    #[arg(short = 'f', long)]
    force: bool,

    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Source path(s) followed by the destination path
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<String>,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<bool> {
    let (src_targets, dst_target) = args.paths.split_at(args.paths.len() - 1);
    let dst_target = &dst_target[0];

    // One connection per remote host, shared by every target on that host.
    // Dialing happens before the runtime starts so password prompts work on
    // a plain terminal.
    let mut hosts: HashMap<String, Arc<SftpFs>> = HashMap::new();
    for tgt in &args.paths {
        let (host, _) = target::split_host_path(tgt);
        let Some(host) = host else {
            continue;
        };
        if hosts.contains_key(host) {
            continue;
        }
        let fs = SftpFs::dial(host)?;
        hosts.insert(host.to_string(), Arc::new(fs));
    }

    let local: Arc<dyn Wfs> = Arc::new(LocalFs::new());
    let to_fs_path = |tgt: &str| -> FsPath {
        match target::split_host_path(tgt) {
            (Some(host), path) => {
                let path = if path.is_empty() { "." } else { path };
                FsPath::new(hosts[host].clone(), path)
            }
            (None, path) => FsPath::new(local.clone(), path),
        }
    };
    let srcs: Vec<FsPath> = src_targets.iter().map(|tgt| to_fs_path(tgt)).collect();
    let dst = to_fs_path(dst_target);

    let reporter = Arc::new(term::TermProgress::new());
    let runtime = tokio::runtime::Runtime::new().context("ccp: cannot start runtime")?;
    runtime.block_on(common::copy::copy(
        reporter.clone(),
        &srcs,
        &dst,
        args.force,
    ));
    reporter.finish();

    for (host, fs) in &hosts {
        if let Err(err) = fs.close() {
            tracing::warn!("closing the connection to {} failed: {}", host, err);
        }
    }
    Ok(reporter.error_count() == 0)
}

fn main() {
    let args = Args::parse();
    if args.paths.len() < 2 {
        eprintln!("Usage: ccp [OPTION]... SOURCE... TARGET");
        eprintln!("Try 'ccp --help' for more information.");
        std::process::exit(2);
    }
    init_tracing(args.verbose);
    match run(&args) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("ccp: exiting with one or more errors");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(1);
        }
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use gzclean::Options;

/// gzclean - zero MTIME and drop FNAME/FHCRC from GZIP headers so compressed files are byte-stable
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Show what would be cleaned without making changes
    #[arg(long)]
    dry_run: bool,

    /// Show a status line for every file
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors and the summary
    #[arg(short, long)]
    quiet: bool,

    /// Number of files to process in parallel
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    jobs: u16,

    /// Directory to scan recursively for .gz files
    directory: PathBuf,
}

impl Args {
    fn log_level(&self) -> Level {
        if self.quiet {
            Level::ERROR
        } else if self.verbose {
            Level::DEBUG
        } else {
            Level::WARN
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let options = Options {
        dry_run: args.dry_run,
        jobs: usize::from(args.jobs),
    };

    match gzclean::run(&args.directory, &options) {
        Ok(summary) => {
            println!("{}", summary.report(options.dry_run));
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("gzclean: {}", err);
            ExitCode::FAILURE
        }
    }
}

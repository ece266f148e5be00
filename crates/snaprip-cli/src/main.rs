use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use snaprip_core::container::sniff::SNIFF_LEN;
use snaprip_core::{CancellationToken, ConflictPolicy, ImportControl, ImportOptions};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "snaprip", version, about = "Import camera cards into a date-organised photo library")]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy photos from a card into YYYY/YYYY-MM/YYYY-MM-DD folders
    Import {
        /// Card or folder to import from (DCIM is used when present)
        source: PathBuf,

        /// Library root; repeat to copy to several destinations
        #[arg(short, long = "dest", required = true)]
        destinations: Vec<PathBuf>,

        /// Label appended to each day folder
        #[arg(short, long, default_value = "")]
        shoot_name: String,

        /// What to do with files that already exist
        #[arg(long, value_enum, default_value_t = ConflictPolicy::Skip)]
        on_conflict: ConflictPolicy,

        /// Plan only, copy nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the capture date of each file
    Dates {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_import(options: ImportOptions) -> anyhow::Result<()> {
    let t_total = std::time::Instant::now();

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling after the current files...");
        handler_token.cancel();
    })?;
    let control = ImportControl::new().with_cancel_token(token);

    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {msg}")?);

    let cb_pb = pb.clone();
    let result = snaprip_core::import(&options, &control, &move |stage, current, total, message| {
        cb_pb.set_length(total);
        cb_pb.set_position((current + 1).min(total));
        cb_pb.set_message(format!("{} {}", stage, message));
    })?;
    pb.finish_and_clear();

    for warning in &result.warnings {
        eprintln!("warning: {}", warning);
    }
    if options.dry_run {
        eprintln!(
            "Dry run: {} photos over {} days, {} copies planned, {} existing files skipped",
            result.total_photos, result.days, result.planned, result.files_skipped
        );
        for conflict in &result.conflicts {
            eprintln!("  exists: {}", conflict.display());
        }
        return Ok(());
    }

    eprintln!(
        "Done! {} photos over {} days ({} dated from metadata, {} from file time), {} files written, {} skipped ({:.2}s)",
        result.total_photos,
        result.days,
        result.from_metadata,
        result.from_mtime,
        result.files_written,
        result.files_skipped,
        t_total.elapsed().as_secs_f64()
    );
    Ok(())
}

fn sniffed_format(path: &Path) -> anyhow::Result<snaprip_core::ContainerFormat> {
    let mut header = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?.take(SNIFF_LEN as u64).read_to_end(&mut header)?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    Ok(snaprip_core::sniff(&header, ext))
}

fn run_dates(paths: &[PathBuf], json: bool) -> anyhow::Result<()> {
    for path in paths {
        let result = snaprip_core::read_capture_date(path);
        let format = sniffed_format(path).ok();

        if json {
            let line = match &result {
                Ok(r) => serde_json::json!({
                    "path": path,
                    "format": format,
                    "date": r.date.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    "source": r.source,
                }),
                Err(err) => serde_json::json!({
                    "path": path,
                    "format": format,
                    "error": err.to_string(),
                }),
            };
            println!("{}", line);
            continue;
        }

        match result {
            Ok(r) => println!("{}\t{}\t{:?}", path.display(), r.date.format("%Y-%m-%d %H:%M:%S"), r.source),
            Err(err) => println!("{}\t-\t{}", path.display(), err),
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Import {
            source,
            destinations,
            shoot_name,
            on_conflict,
            dry_run,
        } => run_import(ImportOptions {
            source,
            destinations,
            shoot_name,
            conflict: on_conflict,
            dry_run,
        }),
        Command::Dates { paths, json } => run_dates(&paths, json),
    }
}

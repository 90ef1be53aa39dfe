//! catalog-walker - Nested Catalog Cost Mapper
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use catalog_walker::config::{CliArgs, CrawlConfig};
use catalog_walker::progress::{print_header, print_summary, ProgressReporter};
use catalog_walker::snapshot::{load_previous_tree, TreeSnapshot};
use catalog_walker::{CatalogNode, CatalogTreeBuilder, MemoryRepository};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose, args.quiet)?;

    let config = CrawlConfig::from_args(&args).context("Invalid configuration")?;

    let repository = MemoryRepository::from_json_file(&args.repository).with_context(|| {
        format!("Failed to load repository '{}'", args.repository.display())
    })?;

    if !args.quiet {
        print_header(&args.repository.display().to_string(), &config);
    }

    let previous = args
        .previous_tree
        .as_deref()
        .and_then(|path| load_previous_tree(path, &config));

    let progress = if args.quiet {
        ProgressReporter::hidden()
    } else {
        ProgressReporter::new()
    };
    progress.set_status("Fetching root catalog...");

    let mut builder = CatalogTreeBuilder::new(repository, config.clone())
        .with_previous_tree(previous)
        .with_progress(progress.callback());

    let tree = match builder.build() {
        Ok(tree) => tree,
        Err(e) => {
            progress.finish_and_clear();
            return Err(e).context("Catalog crawl failed");
        }
    };
    progress.finish("Crawl completed");

    let snapshot = TreeSnapshot::new(tree, &config);

    if let Some(path) = &args.save_tree {
        match snapshot.save(path) {
            Ok(()) => info!(path = %path.display(), "Saved tree for future incremental runs"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not save tree"),
        }
    }

    if args.json {
        write_json(&snapshot.tree, args.output.as_deref())?;
    }

    if !args.quiet {
        print_summary(&snapshot.tree, builder.stats(), builder.duration());
    }

    if builder.stats().errors > 0 {
        info!(errors = builder.stats().errors, "Crawl completed with errors");
    }

    Ok(())
}

/// Write the tree as JSON to `output`, or stdout if not given
fn write_json(tree: &CatalogNode, output: Option<&Path>) -> Result<()> {
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Failed to create output file '{}'", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    let mut writer = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut writer, tree).context("Failed to encode tree")?;
    writeln!(writer).context("Failed to write tree")?;
    writer.flush().context("Failed to write tree")?;
    Ok(())
}

fn setup_logging(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("catalog_walker=debug,warn")
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::new("catalog_walker=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

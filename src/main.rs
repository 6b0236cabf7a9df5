use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use dumpcb::app::tasks;
use dumpcb::config::settings;
use dumpcb::core::formatter::format_count;
use dumpcb::core::{posix_string, ContextAssembler, CoreError, MtimeStore, ScanCache};

#[derive(Parser, Debug)]
#[command(
    name = "dumpcb",
    version,
    about = "Concatenate a project into one LLM-ready Markdown document"
)]
struct Cli {
    /// Configuration file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the files that pass the ignore rules
    Scan {
        root: PathBuf,
        /// Ignore the cached scan
        #[arg(long)]
        force: bool,
        /// Also list ignored files
        #[arg(long)]
        ignored: bool,
    },
    /// Show which rule ignores a path
    Explain { root: PathBuf, path: PathBuf },
    /// Estimate tokens per file (all included files when no paths are given)
    Tokens { root: PathBuf, paths: Vec<PathBuf> },
    /// Write the context document
    Generate {
        root: PathBuf,
        files: Vec<PathBuf>,
        /// Select every included file
        #[arg(long)]
        all: bool,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Command {
    fn root(&self) -> &PathBuf {
        match self {
            Command::Scan { root, .. }
            | Command::Explain { root, .. }
            | Command::Tokens { root, .. }
            | Command::Generate { root, .. } => root,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the document on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = settings::load_config(cli.config.as_deref())?;
    let cache: Arc<dyn MtimeStore> = Arc::new(match config.cache_path() {
        Some(path) => ScanCache::open(path),
        None => ScanCache::in_memory(),
    });
    let assembler = Arc::new(
        ContextAssembler::open(cli.command.root(), &config, cache)
            .with_context(|| format!("Cannot open project {}", cli.command.root().display()))?,
    );

    match cli.command {
        Command::Scan { force, ignored, .. } => {
            let outcome = tasks::run_scan(Arc::clone(&assembler), force).await?;
            for path in &outcome.included {
                println!("{}", posix_string(path));
            }
            if ignored {
                for path in &outcome.ignored {
                    println!("ignored: {}", posix_string(path));
                }
            }
            eprintln!(
                "{} included, {} ignored{}",
                outcome.included.len(),
                outcome.ignored.len(),
                if outcome.cache_hit { " (cached)" } else { "" }
            );
        }
        Command::Explain { path, .. } => match assembler.explain_ignore(&path) {
            Some(rule) => println!(
                "{}: ignored by '{}' ({})",
                path.display(),
                rule.pattern,
                rule.display_source()
            ),
            None => println!("{}: not ignored", path.display()),
        },
        Command::Tokens { paths, .. } => {
            let paths = if paths.is_empty() {
                tasks::run_scan(Arc::clone(&assembler), false).await?.included
            } else {
                paths
            };
            let estimator = Arc::clone(&assembler);
            let tokens =
                tokio::task::spawn_blocking(move || estimator.estimate_tokens(&paths)).await?;
            for (path, count) in &tokens {
                println!("{:>10}  {}", format_count(*count), posix_string(path));
            }
            println!("{:>10}  total", format_count(tokens.values().sum()));
        }
        Command::Generate {
            files, all, output, ..
        } => {
            let selected = if all {
                tasks::run_scan(Arc::clone(&assembler), false).await?.included
            } else {
                files
            };
            let generated = match tasks::run_generate(Arc::clone(&assembler), selected).await {
                Ok(generated) => generated,
                Err(CoreError::NoValidSelection) => {
                    eprintln!("No readable text files selected; nothing to generate.");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, &generated.content)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!(
                        "Wrote {} files to {} ({} bytes, {} lines)",
                        generated.selected.len(),
                        path.display(),
                        generated.file_size,
                        generated.line_count
                    );
                }
                None => print!("{}", generated.content),
            }
        }
    }

    Ok(())
}

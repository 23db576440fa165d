//! pfat shell
//!
//! Interactive command loop over a pseudo-FAT image file

use anyhow::Context;
use clap::Parser;
use pfat_rs::shell::{Outcome, Shell};
use pfat_rs::FormatOptions;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pfat")]
#[command(about = "Pseudo-FAT filesystem shell")]
struct Args {
    /// Path to the filesystem image (created empty if missing)
    image: PathBuf,

    /// TOML file with format options (signature, cluster_size)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Command script to run before reading from stdin
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Exit after the script instead of starting the interactive loop
    #[arg(long, requires = "script")]
    batch: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();

    let options = match &args.config {
        Some(path) => FormatOptions::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => FormatOptions::default(),
    };

    let mut shell = Shell::open(&args.image, options)
        .with_context(|| format!("failed to open image {}", args.image.display()))?;

    if !shell.is_formatted() {
        println!("Filesystem not formatted. Use 'format' first.");
    } else {
        info!("Loaded {}", args.image.display());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Some(script) = &args.script {
        let (summary, outcome) = shell.run_script(script, &mut out)?;
        if !summary.failures.is_empty() {
            writeln!(out, "Load completed with {} errors.", summary.failures.len())?;
        }
        if outcome == Outcome::Exit || args.batch {
            shell.save()?;
            return Ok(());
        }
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next() else {
            break;
        };

        match shell.execute_line(&line?, &mut out) {
            Ok(Outcome::Continue) => {}
            Ok(Outcome::Exit) => return Ok(()),
            Err(e) => writeln!(out, "{}", e)?,
        }
    }

    // End of input behaves like exit
    shell.save()?;
    Ok(())
}

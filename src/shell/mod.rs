//! Command dispatcher and script driver
//!
//! [`Shell`] owns the optional live filesystem and the image path. Each
//! command is parsed, checked against the formatted state and dispatched to
//! the matching [`FileSystem`] operation; results are rendered to a writer.

pub mod command;

pub use command::Command;

use crate::core::config::FormatOptions;
use crate::core::error::{FsError, Result};
use crate::core::filesystem::FileSystem;
use crate::core::validation::parse_disk_size;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Maximum nesting of `load` scripts
pub const MAX_SCRIPT_DEPTH: usize = 8;

/// Whether the caller should keep reading commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Exit,
}

/// Failures collected while running a script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptSummary {
    pub executed: usize,
    /// (line number, line, error message)
    pub failures: Vec<(usize, String, String)>,
}

/// Interactive/batch front end over one image file
pub struct Shell {
    image_path: PathBuf,
    options: FormatOptions,
    fs: Option<FileSystem>,
    depth: usize,
    /// Failures of a nested `load`, handed to the enclosing script
    nested_failures: Vec<(usize, String, String)>,
}

impl Shell {
    /// Create a shell with no filesystem loaded
    pub fn new<P: AsRef<Path>>(image_path: P, options: FormatOptions) -> Self {
        Shell {
            image_path: image_path.as_ref().to_path_buf(),
            options,
            fs: None,
            depth: 0,
            nested_failures: Vec::new(),
        }
    }

    /// Create a shell and load the image if it holds a filesystem
    ///
    /// A missing image is created as an empty placeholder.
    pub fn open<P: AsRef<Path>>(image_path: P, options: FormatOptions) -> Result<Self> {
        let mut shell = Self::new(image_path, options);
        shell.fs = FileSystem::open(&shell.image_path)?;
        Ok(shell)
    }

    pub fn filesystem(&self) -> Option<&FileSystem> {
        self.fs.as_ref()
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn is_formatted(&self) -> bool {
        self.fs.is_some()
    }

    /// Persist the live filesystem, if any
    pub fn save(&self) -> Result<()> {
        match &self.fs {
            Some(fs) => fs.save(&self.image_path),
            None => Ok(()),
        }
    }

    /// Parse and run one line; blank lines and `#` comments do nothing
    pub fn execute_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Outcome> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(Outcome::Continue);
        }

        let command = Command::parse(line)?;
        self.execute(command, out)
    }

    /// Run one parsed command
    pub fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> Result<Outcome> {
        debug!("Executing {:?}", command);

        if command.requires_filesystem() && self.fs.is_none() {
            return Err(FsError::NotFormatted);
        }

        match command {
            Command::Format(size) => self.format(&size, out)?,
            Command::Load(script) => return self.load(&script, out),
            Command::Exit => {
                self.save()?;
                return Ok(Outcome::Exit);
            }
            other => {
                let fs = self.fs.as_mut().ok_or(FsError::NotFormatted)?;
                dispatch(fs, other, out)?;
            }
        }

        Ok(Outcome::Continue)
    }

    fn format<W: Write>(&mut self, size: &str, out: &mut W) -> Result<()> {
        let disk_size = parse_disk_size(size)?;
        let fs = FileSystem::format(disk_size, &self.options)?;
        fs.save(&self.image_path)?;

        let desc = fs.descriptor();
        writeln!(out, "Filesystem initialized:")?;
        writeln!(out, "  Disk size: {} B", desc.disk_size)?;
        writeln!(out, "  Cluster size: {} B", desc.cluster_size)?;
        writeln!(out, "  Cluster count: {}", desc.cluster_count)?;
        writeln!(out, "FORMAT COMPLETE")?;

        self.fs = Some(fs);
        Ok(())
    }

    /// Run every line of a script, counting failures
    pub fn run_script<W: Write>(&mut self, path: &Path, out: &mut W) -> Result<(ScriptSummary, Outcome)> {
        if self.depth >= MAX_SCRIPT_DEPTH {
            return Err(FsError::ScriptDepth(MAX_SCRIPT_DEPTH));
        }

        let file = std::fs::File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FsError::SourceNotFound(path.to_path_buf()),
            _ => FsError::Io(e),
        })?;

        info!("Running script {}", path.display());

        self.depth += 1;
        let result = self.run_lines(BufReader::new(file), out);
        self.depth -= 1;

        result
    }

    fn run_lines<R: BufRead, W: Write>(&mut self, reader: R, out: &mut W) -> Result<(ScriptSummary, Outcome)> {
        let mut summary = ScriptSummary::default();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            summary.executed += 1;
            let result = self.execute_line(trimmed, out);
            summary.failures.append(&mut self.nested_failures);

            match result {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Exit) => return Ok((summary, Outcome::Exit)),
                Err(e) => {
                    writeln!(
                        out,
                        "Error processing command on line {}: {} ({})",
                        idx + 1,
                        trimmed,
                        e
                    )?;
                    summary
                        .failures
                        .push((idx + 1, trimmed.to_string(), e.to_string()));
                }
            }
        }

        Ok((summary, Outcome::Continue))
    }

    fn load<W: Write>(&mut self, script: &Path, out: &mut W) -> Result<Outcome> {
        let (summary, outcome) = self.run_script(script, out)?;

        if summary.failures.is_empty() {
            writeln!(out, "OK")?;
        } else {
            writeln!(out, "Load completed with {} errors.", summary.failures.len())?;
        }

        // Inside a script the enclosing run counts these too
        if self.depth > 0 {
            self.nested_failures
                .extend(summary.failures.into_iter().map(|(line, command, err)| {
                    (line, format!("{}: {}", script.display(), command), err)
                }));
        }

        Ok(outcome)
    }
}

fn dispatch<W: Write>(fs: &mut FileSystem, command: Command, out: &mut W) -> Result<()> {
    match command {
        Command::Ls(path) => {
            let entries = fs.ls(path.as_deref())?;
            writeln!(out, "{:<13} {:<5} {:>10} {:>13}", "Name", "Type", "Size", "Start Cluster")?;
            writeln!(out, "{}", "-".repeat(44))?;
            if entries.is_empty() {
                writeln!(out, "Directory is empty.")?;
            }
            for entry in entries {
                writeln!(
                    out,
                    "{:<13} {:<5} {:>10} {:>13}",
                    entry.name,
                    entry.kind.to_string(),
                    entry.size,
                    entry.start_cluster
                )?;
            }
        }
        Command::Mkdir(path) => {
            fs.mkdir(&path)?;
            writeln!(out, "Directory '{}' created successfully.", path)?;
        }
        Command::Cd(path) => {
            fs.cd(&path)?;
            writeln!(out, "OK")?;
        }
        Command::Pwd => writeln!(out, "{}", fs.pwd())?,
        Command::Rmdir(path) => {
            fs.rmdir(&path)?;
            writeln!(out, "OK")?;
        }
        Command::Rm(path) => {
            fs.rm(&path)?;
            writeln!(out, "File '{}' removed successfully.", path)?;
        }
        Command::Cp { src, dest } => {
            fs.cp(&src, &dest)?;
            writeln!(out, "Successfully created a copy of '{}' at '{}'.", src, dest)?;
        }
        Command::Mv { src, dest } => {
            fs.mv(&src, &dest)?;
            writeln!(out, "Successfully moved '{}' to '{}'.", src, dest)?;
        }
        Command::Info(path) => writeln!(out, "{}", fs.info(&path)?)?,
        Command::Check => {
            for report in fs.check() {
                writeln!(out, "{}", report)?;
            }
            writeln!(out, "Filesystem check completed.")?;
        }
        Command::Bug(path) => {
            writeln!(out, "Corrupting filesystem...")?;
            writeln!(out, "{}", fs.bug(&path)?)?;
        }
        Command::Incp { source, dest } => {
            fs.incp(&source, &dest)?;
            writeln!(
                out,
                "File '{}' was successfully copied to '{}'.",
                source.display(),
                dest
            )?;
        }
        Command::Outcp { src, dest } => {
            fs.outcp(&src, &dest)?;
            writeln!(out, "OK")?;
        }
        Command::Cat(path) => {
            fs.cat(&path, out)?;
            writeln!(out)?;
        }
        Command::Format(_) | Command::Load(_) | Command::Exit => {}
    }

    Ok(())
}

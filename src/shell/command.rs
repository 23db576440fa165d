//! Textual command parsing
//!
//! One command per line, whitespace separated, case-sensitive verbs.

use crate::core::error::{FsError, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// A parsed shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `format <N>MB`
    Format(String),
    Ls(Option<String>),
    Mkdir(String),
    Cd(String),
    Pwd,
    Rmdir(String),
    Rm(String),
    Cp { src: String, dest: String },
    Mv { src: String, dest: String },
    Info(String),
    Check,
    Bug(String),
    Incp { source: PathBuf, dest: String },
    Outcp { src: String, dest: PathBuf },
    Cat(String),
    Load(PathBuf),
    Exit,
}

impl Command {
    /// Parse one line
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts
            .next()
            .ok_or_else(|| FsError::UnknownCommand(String::new()))?;
        let args: Vec<&str> = parts.collect();

        let command = match (verb, args.as_slice()) {
            ("format", [size]) => Command::Format(size.to_string()),
            ("ls", []) => Command::Ls(None),
            ("ls", [path]) => Command::Ls(Some(path.to_string())),
            ("mkdir", [path]) => Command::Mkdir(path.to_string()),
            ("cd", [path]) => Command::Cd(path.to_string()),
            ("pwd", []) => Command::Pwd,
            ("rmdir", [path]) => Command::Rmdir(path.to_string()),
            ("rm", [path]) => Command::Rm(path.to_string()),
            ("cp", [src, dest]) => Command::Cp {
                src: src.to_string(),
                dest: dest.to_string(),
            },
            ("mv", [src, dest]) => Command::Mv {
                src: src.to_string(),
                dest: dest.to_string(),
            },
            ("info", [path]) => Command::Info(path.to_string()),
            ("check", []) => Command::Check,
            ("bug", [path]) => Command::Bug(path.to_string()),
            ("incp", [source, dest]) => Command::Incp {
                source: PathBuf::from(source),
                dest: dest.to_string(),
            },
            ("outcp", [src, dest]) => Command::Outcp {
                src: src.to_string(),
                dest: PathBuf::from(dest),
            },
            ("cat", [path]) => Command::Cat(path.to_string()),
            ("load", [script]) => Command::Load(PathBuf::from(script)),
            ("exit", []) => Command::Exit,
            (verb, _) => {
                return Err(match Self::usage(verb) {
                    Some(usage) => FsError::InvalidCommand(usage),
                    None => FsError::UnknownCommand(verb.to_string()),
                })
            }
        };

        Ok(command)
    }

    /// Usage line for a known verb
    pub fn usage(verb: &str) -> Option<&'static str> {
        let usage = match verb {
            "format" => "format <N>MB",
            "ls" => "ls [path]",
            "mkdir" => "mkdir <path>",
            "cd" => "cd <path>",
            "pwd" => "pwd",
            "rmdir" => "rmdir <path>",
            "rm" => "rm <name>",
            "cp" => "cp <source> <destination>",
            "mv" => "mv <source> <destination>",
            "info" => "info <path>",
            "check" => "check",
            "bug" => "bug <name>",
            "incp" => "incp <source> <destination>",
            "outcp" => "outcp <source> <destination>",
            "cat" => "cat <path>",
            "load" => "load <script>",
            "exit" => "exit",
            _ => return None,
        };
        Some(usage)
    }

    /// Whether the command needs a formatted filesystem
    ///
    /// `load` is exempt; every line of the script is checked on its own.
    pub fn requires_filesystem(&self) -> bool {
        !matches!(self, Command::Format(_) | Command::Load(_) | Command::Exit)
    }
}

impl FromStr for Command {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        Command::parse(s)
    }
}

// src/exec/command.rs

//! Command-string handling: engine resolution and argv splitting.
//!
//! Commands arrive as a single shell-like string. They are never handed to a
//! shell; instead they are split into a program and a literal argument
//! vector here, so metacharacters in file names are inert.

use std::path::Path;

use crate::config::EngineConfig;
use crate::errors::{RenderError, Result};

/// A command split into its executable and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ParsedCommand {
    /// Split `command` and take the first token as the program.
    ///
    /// Fails with a validation error when there is no program to run.
    pub fn parse(command: &str) -> Result<Self> {
        let mut tokens = split_command(command).into_iter();
        match tokens.next() {
            Some(program) if !program.is_empty() => Ok(Self {
                program,
                args: tokens.collect(),
            }),
            _ => Err(RenderError::Validation(
                "command must name a program to run".to_string(),
            )),
        }
    }
}

/// Split a command string into tokens.
///
/// Tokens are separated by whitespace, except inside double quotes. Quote
/// characters are removed, so `-o "/a b/c"` yields `-o` and `/a b/c`. An
/// unterminated quote extends to the end of the input.
pub fn split_command(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;

    for ch in command.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        tokens.push(current);
    }

    tokens
}

/// Rewrite a submitted command into a runnable one.
///
/// - A leading `<alias>` word is replaced by the configured engine path
///   (quoted when it contains whitespace).
/// - The first `/uploads/` is replaced by `<upload_dir>/`, turning the
///   client's upload reference into an absolute path.
pub fn resolve_command(raw: &str, engine: &EngineConfig, upload_dir: &Path) -> String {
    let trimmed = raw.trim();

    let resolved = match trimmed.strip_prefix(engine.alias.as_str()) {
        Some(rest) if rest.starts_with(char::is_whitespace) => {
            format!("{}{}", quote_if_needed(&engine.path), rest)
        }
        _ => trimmed.to_string(),
    };

    resolved.replacen("/uploads/", &format!("{}/", upload_dir.display()), 1)
}

fn quote_if_needed(token: &str) -> String {
    if token.contains(char::is_whitespace) {
        format!("\"{token}\"")
    } else {
        token.to_string()
    }
}

/// Where the render engine is normally installed on this platform.
pub fn default_engine_path() -> Option<&'static str> {
    if cfg!(target_os = "macos") {
        Some("/Applications/Blender.app/Contents/MacOS/Blender")
    } else if cfg!(target_os = "windows") {
        Some(r"C:\Program Files\Blender Foundation\Blender 4.0\blender.exe")
    } else if cfg!(target_os = "linux") {
        Some("/usr/bin/blender")
    } else {
        None
    }
}

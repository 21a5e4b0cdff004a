// src/config/validate.rs

use std::net::SocketAddr;

use crate::config::model::{ConfigFile, EngineConfig, RawConfigFile, StorageSection};
use crate::errors::{RenderError, Result};
use crate::exec::command::default_engine_path;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = RenderError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let engine = resolve_engine(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.server,
            raw.storage,
            engine,
            raw.progress,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_server(cfg)?;
    validate_storage(&cfg.storage)?;
    validate_progress(cfg)?;
    Ok(())
}

fn validate_server(cfg: &RawConfigFile) -> Result<()> {
    parse_bind(&cfg.server.bind)?;
    Ok(())
}

fn parse_bind(bind: &str) -> Result<SocketAddr> {
    bind.parse::<SocketAddr>().map_err(|e| {
        RenderError::Config(format!(
            "[server].bind must be a socket address like 127.0.0.1:3000 (got {bind:?}: {e})"
        ))
    })
}

impl ConfigFile {
    /// Replace the listen address (e.g. from `--bind`), with the same
    /// validation a config file value gets.
    pub fn override_bind(&mut self, bind: String) -> Result<()> {
        parse_bind(&bind)?;
        self.server.bind = bind;
        Ok(())
    }
}

fn validate_storage(storage: &StorageSection) -> Result<()> {
    for (key, value) in [
        ("log_file_name", &storage.log_file_name),
        ("output_dir_name", &storage.output_dir_name),
        ("video_file_name", &storage.video_file_name),
    ] {
        if !is_plain_file_name(value) {
            return Err(RenderError::Config(format!(
                "[storage].{key} must be a plain file name (got {value:?})"
            )));
        }
    }
    if storage.max_upload_bytes == 0 {
        return Err(RenderError::Config(
            "[storage].max_upload_bytes must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_progress(cfg: &RawConfigFile) -> Result<()> {
    if cfg.progress.tail_lines == 0 {
        return Err(RenderError::Config(
            "[progress].tail_lines must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.progress.args_lookahead == 0 {
        return Err(RenderError::Config(
            "[progress].args_lookahead must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn resolve_engine(cfg: &RawConfigFile) -> Result<EngineConfig> {
    if cfg.engine.alias.trim().is_empty() || cfg.engine.alias.contains(char::is_whitespace) {
        return Err(RenderError::Config(format!(
            "[engine].alias must be a single word (got {:?})",
            cfg.engine.alias
        )));
    }

    let path = match &cfg.engine.path {
        Some(p) if p.trim().is_empty() => {
            return Err(RenderError::Config(
                "[engine].path must not be empty".to_string(),
            ));
        }
        Some(p) => p.clone(),
        None => default_engine_path()
            .ok_or_else(|| {
                RenderError::Config(format!(
                    "no default engine path for platform '{}'; set [engine].path",
                    std::env::consts::OS
                ))
            })?
            .to_string(),
    };

    Ok(EngineConfig {
        path,
        alias: cfg.engine.alias.clone(),
    })
}

/// A single path component: no separators, not `.`/`..`, not empty.
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

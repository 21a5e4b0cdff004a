#![allow(dead_code)]

use std::path::Path;

use rendertask::config::{ConfigFile, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from defaults with a fixed engine path so tests do not depend on
/// the host platform.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.engine.path = Some("/usr/bin/blender".to_string());
        Self { config }
    }

    /// Place uploads and task dirs under `root`.
    pub fn with_storage_root(mut self, root: &Path) -> Self {
        self.config.storage.upload_dir = root.join("uploads");
        self.config.storage.tasks_dir = root.join("uploads").join("tasks");
        self
    }

    pub fn with_engine_path(mut self, path: &str) -> Self {
        self.config.engine.path = Some(path.to_string());
        self
    }

    pub fn with_engine_alias(mut self, alias: &str) -> Self {
        self.config.engine.alias = alias.to_string();
        self
    }

    pub fn with_tail_lines(mut self, n: usize) -> Self {
        self.config.progress.tail_lines = n;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

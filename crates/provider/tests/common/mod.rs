#![allow(dead_code)]

use mimedb_config::{Config, LayerConfig};
use mimedb_format::{CACHE_FILE_NAME, GLOBS_FILE_NAME};
use mimedb_format::writer::CacheWriter;
use mimedb_provider::MimeDatabase;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A database over temporary layer directories, most-local first. Keep the
/// fixture alive for as long as the database is used.
pub struct Fixture {
    pub dirs: Vec<TempDir>,
    pub database: MimeDatabase,
}
impl Fixture {
    pub fn new(layers: Vec<CacheWriter>) -> Self {
        Self::with_config(layers, |_| {})
    }

    pub fn with_config(layers: Vec<CacheWriter>, configure: impl FnOnce(&mut Config)) -> Self {
        let dirs: Vec<TempDir> = layers.iter().map(|_| tempfile::tempdir().unwrap()).collect();
        for (dir, writer) in dirs.iter().zip(&layers) {
            writer.write(dir.path().join(CACHE_FILE_NAME)).unwrap();
            std::fs::write(dir.path().join(GLOBS_FILE_NAME), writer.to_globs2()).unwrap();
        }
        let mut config = Config {
            layers: dirs
                .iter()
                .enumerate()
                .map(|(index, dir)| LayerConfig::new(format!("layer-{index}"), dir.path()))
                .collect(),
            recheck_interval: 0,
            ..Config::default()
        };
        configure(&mut config);
        let database = MimeDatabase::from_config(&config);
        Self { dirs, database }
    }

    pub fn cache_path(&self, layer: usize) -> PathBuf {
        self.dirs[layer].path().join(CACHE_FILE_NAME)
    }

    pub fn dir(&self, layer: usize) -> &Path {
        self.dirs[layer].path()
    }
}

pub fn mimes(database: &MimeDatabase, file_name: &str) -> Vec<String> {
    database.classify_by_name(file_name).into_iter().map(|found| found.mime).collect()
}

//! Document Loader: a flat directory of text files as a [`DocumentSource`].
//!
//! Only regular files directly inside the directory are considered (no
//! recursion) and only those whose file name matches one of the include
//! globs. Listing happens when [`scan`](DocumentSource::scan) is called;
//! each file is read as UTF-8 only when the iterator reaches it, so memory
//! stays bounded by the largest single file.

use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use docrag_core::error::LoadError;
use docrag_core::models::Document;
use docrag_core::reconcile::{DocumentIter, DocumentSource};

use crate::config::DocumentsConfig;

pub struct DirectorySource {
    dir: PathBuf,
    include: GlobSet,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, include_globs: &[String]) -> Result<Self> {
        Ok(Self {
            dir: dir.into(),
            include: build_globset(include_globs)?,
        })
    }

    pub fn from_config(config: &DocumentsConfig) -> Result<Self> {
        Self::new(&config.dir, &config.include_globs)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Matching files in name order. The id is `None` when the file name is
    /// not valid UTF-8; such files surface as read failures.
    fn list(&self) -> Result<Vec<(Option<String>, PathBuf)>, LoadError> {
        if !self.dir.is_dir() {
            return Err(LoadError::MissingDirectory(self.dir.clone()));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| LoadError::Scan {
                path: self.dir.clone(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if !self.include.is_match(entry.file_name()) {
                continue;
            }
            let name = entry.file_name().to_str().map(str::to_string);
            files.push((name, entry.into_path()));
        }
        Ok(files)
    }
}

impl DocumentSource for DirectorySource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn scan(&self) -> Result<DocumentIter<'_>, LoadError> {
        let files = self.list()?;
        Ok(Box::new(files.into_iter().map(|(name, path)| read_document(name, path))))
    }
}

fn read_document(id: Option<String>, path: PathBuf) -> Result<Document, LoadError> {
    let Some(id) = id else {
        return Err(LoadError::Read {
            path,
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "file name is not valid UTF-8",
            ),
        });
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(Document {
            id,
            path: Some(path),
            text,
        }),
        Err(source) => Err(LoadError::Read { path, source }),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

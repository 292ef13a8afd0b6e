//! Local directory input source.

use std::path::{Path, PathBuf};

use flowork_core::inputs::source::DEFAULT_SOURCE_CAPACITY;
use flowork_core::inputs::{PathFilter, PathSource, SourceFeed};
use flowork_types::error::SourceError;
use flowork_types::files::StorePath;

/// Every regular file directly inside `dir` that passes all `filters`,
/// in file-name order.
///
/// Subdirectories are not descended into and symlinks are skipped. A
/// listing failure is yielded as a single error item and ends the source.
/// Must be called from within a Tokio runtime.
pub fn local_dir_source(dir: impl Into<PathBuf>, filters: Vec<PathFilter>) -> PathSource {
    let dir = dir.into();
    PathSource::spawn(DEFAULT_SOURCE_CAPACITY, move |feed| async move {
        feed_dir(&dir, &filters, &feed).await;
    })
}

async fn feed_dir(dir: &Path, filters: &[PathFilter], feed: &SourceFeed) {
    let dir_display = dir.display().to_string();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(source) => {
            feed.send(Err(SourceError::List {
                path: dir_display,
                source,
            }))
            .await;
            return;
        }
    };

    let mut files = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(source) => {
                if !feed
                    .send(Err(SourceError::Entry {
                        path: dir_display.clone(),
                        source,
                    }))
                    .await
                {
                    return;
                }
                break;
            }
        };

        match entry.file_type().await {
            Ok(kind) if kind.is_file() => files.push(entry.path()),
            Ok(_) => tracing::trace!(path = %entry.path().display(), "skipping non-regular entry"),
            Err(source) => {
                if !feed
                    .send(Err(SourceError::Entry {
                        path: entry.path().display().to_string(),
                        source,
                    }))
                    .await
                {
                    return;
                }
            }
        }
    }
    files.sort();
    tracing::debug!(dir = %dir_display, count = files.len(), "listed input directory");

    for file in files {
        let item = match file.to_str() {
            Some(path) => {
                let path = StorePath::new(path);
                if !PathFilter::matches_all(filters, &path) {
                    continue;
                }
                Ok(path)
            }
            None => Err(SourceError::NonUtf8(file.display().to_string())),
        };
        if !feed.send(item).await {
            return;
        }
    }
}

//! `docrag reconcile`: index new documents from the configured directory.

use anyhow::Result;
use std::path::PathBuf;

use docrag_core::reconcile::{DocumentSource, ReconcileReport};

use crate::app::build_service;
use crate::config::Config;
use crate::loader::DirectorySource;

pub async fn run_reconcile(config: &Config, dir: Option<PathBuf>) -> Result<()> {
    let app = build_service(config).await?;
    let source = match dir {
        Some(dir) => DirectorySource::new(dir, &config.documents.include_globs)?,
        None => app.document_source()?,
    };

    let report = app.service.reconcile_index(&source).await?;
    print_report(&source.describe(), &report);
    Ok(())
}

fn print_report(location: &str, report: &ReconcileReport) {
    println!("reconcile {}", location);
    println!("  documents indexed: {}", report.documents_indexed);
    println!("  documents skipped: {}", report.documents_skipped);
    if report.documents_empty > 0 {
        println!("  documents empty: {}", report.documents_empty);
    }
    println!("  chunks written: {}", report.total_chunks);
    println!("  index size: {}", report.index_size);
    for failure in &report.failures {
        println!("  failed: {} ({})", failure.document, failure.error);
    }
    if let Some(warning) = &report.warning {
        println!("  warning: {}", warning);
    }
    println!("ok");
}

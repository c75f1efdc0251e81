//! `smap freshness` command implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use clap::Args;
use smap_cache::{Cache, TextLoader};
use smap_config::{CliSettings, Config};
use smap_freshness::{Conditional, FileResource, RequestContext, RequestSummary, Resource};
use smap_negotiate::{ClientPreferences, NegotiationPolicy};

use crate::error::CliError;
use crate::output::Output;

/// Partition name for source documents.
const DOCUMENTS_PARTITION: &str = "documents";

/// Arguments for the freshness command.
#[derive(Args)]
pub(crate) struct FreshnessArgs {
    /// Files the response is built from, relative to the document root.
    #[arg(required = true)]
    files: Vec<String>,

    /// Path to configuration file (default: auto-discover smap.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Document root (overrides config).
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Cache limit, 0 for unlimited (overrides config).
    #[arg(long)]
    cache_limit: Option<i64>,

    /// Client `If-Modified-Since` header.
    #[arg(long, env = "HTTP_IF_MODIFIED_SINCE")]
    if_modified_since: Option<String>,
}

/// Outcome for one file.
#[derive(Debug)]
enum FileStatus {
    Fresh(Option<SystemTime>),
    Lost,
}

/// Outcome of one simulated request.
#[derive(Debug)]
struct Report {
    files: Vec<(String, FileStatus)>,
    conditional: Conditional,
    last_modified: Option<String>,
    summary: RequestSummary,
}

/// Load every file through a fresh cache and decide the conditional response.
fn check_files(
    root: &Path,
    limit: i64,
    policy: NegotiationPolicy,
    keys: &[String],
    if_modified_since: Option<&str>,
) -> Result<Report, CliError> {
    tracing::info!(root = %root.display(), files = keys.len(), limit, "checking freshness");
    let cache = Cache::new();
    cache.set_limit(limit)?;
    let documents = cache.file_partition(DOCUMENTS_PARTITION, root, TextLoader)?;
    let mut ctx = RequestContext::new(cache, ClientPreferences::default(), policy);

    let mut files = Vec::with_capacity(keys.len());
    for key in keys {
        let file = Arc::new(FileResource::new(documents.clone(), key.as_str()));
        let resource = Arc::clone(&file) as Arc<dyn Resource>;
        match ctx.use_resource(&resource) {
            Ok(()) => {
                file.load()?;
                files.push((key.clone(), FileStatus::Fresh(file.last_modified())));
            }
            Err(err) if err.is_lost() => files.push((key.clone(), FileStatus::Lost)),
            Err(err) => return Err(err.into()),
        }
    }

    let conditional = ctx.check_not_modified(if_modified_since);
    let last_modified = ctx.freshness().last_modified_header();
    let summary = ctx.finish();
    Ok(Report {
        files,
        conditional,
        last_modified,
        summary,
    })
}

impl FreshnessArgs {
    /// Execute the freshness command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or a file cannot be decoded.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            cache_limit: self.cache_limit,
            root: self.root,
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let root = &config.documents_resolved.root;
        output.field("Document root", &root.display().to_string());

        let report = check_files(
            root,
            config.cache.limit,
            config.negotiation,
            &self.files,
            self.if_modified_since.as_deref(),
        )?;

        for (key, status) in &report.files {
            match status {
                FileStatus::Fresh(Some(modified)) => {
                    output.field(key, &httpdate::fmt_http_date(*modified));
                }
                FileStatus::Fresh(None) => output.field(key, "unknown"),
                FileStatus::Lost => output.warning(&format!("{key}: not found")),
            }
        }

        match report.conditional {
            Conditional::NotModified => output.success("304 Not Modified"),
            Conditional::Proceed => output.info("200 OK"),
            Conditional::NoCache => {
                output.info("200 OK");
                output.field("Cache-Control", "no-cache");
            }
        }
        if let Some(last_modified) = &report.last_modified {
            output.field("Last-Modified", last_modified);
        }
        if report.summary.evicted > 0 {
            output.field("Evicted", &report.summary.evicted.to_string());
        }
        Ok(())
    }
}

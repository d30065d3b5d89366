//! Reference gathering: one `textDocument/references` round-trip, flattened
//! into rows. No recursion and no cycle detection; references are a flat set.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::session::Session;
use crate::types::{LspLocation, LspPosition, LspRange, parse_locations, uri_to_path};

pub trait ReferenceSource: Send + Sync {
    fn ensure_open(&self, path: &Path) -> impl Future<Output = Result<()>> + Send;
    fn references(
        &self,
        path: &Path,
        position: LspPosition,
        include_declaration: bool,
    ) -> impl Future<Output = Result<Vec<LspLocation>>> + Send;
}

impl ReferenceSource for Session {
    async fn ensure_open(&self, path: &Path) -> Result<()> {
        self.open_from_disk(path).await
    }

    async fn references(
        &self,
        path: &Path,
        position: LspPosition,
        include_declaration: bool,
    ) -> Result<Vec<LspLocation>> {
        let value = Session::references(self, path, position, include_declaration).await?;
        parse_locations(value)
    }
}

#[derive(Debug, Clone)]
pub struct ReferencesRequest {
    pub file_path: PathBuf,
    pub position: LspPosition,
    pub include_declaration: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceRow {
    pub file_path: String,
    pub uri: String,
    pub range: LspRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<lsnav_core::snippet::Snippet>,
}

impl ReferenceRow {
    pub fn from_location(location: LspLocation) -> Self {
        Self {
            file_path: uri_to_path(&location.uri)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| location.uri.clone()),
            uri: location.uri,
            range: location.range,
            snippet: None,
        }
    }
}

/// An empty row list is the normal "no usages" outcome; an `Err` is a session
/// failure the caller recovers into a tagged error status.
pub async fn resolve_references<S: ReferenceSource>(
    source: &S,
    request: &ReferencesRequest,
) -> Result<Vec<ReferenceRow>> {
    source.ensure_open(&request.file_path).await?;
    let locations = source
        .references(
            &request.file_path,
            request.position,
            request.include_declaration,
        )
        .await
        .context("textDocument/references failed")?;
    debug!(count = locations.len(), "gathered references");
    Ok(locations.into_iter().map(ReferenceRow::from_location).collect())
}

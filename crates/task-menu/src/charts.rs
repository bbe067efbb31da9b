//! Chart rendering seam.
//!
//! The router never draws anything itself; a [`ChartRenderer`]
//! implementation (plotting backend, external service, test stub)
//! turns a [`ChartKind`] request into an image on disk. Without a
//! renderer installed the chart menu degrades to a plain message.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use crate::command::ChartKind;

/// A rendered chart on disk, with a caption for the message carrying it.
#[derive(Debug, Clone)]
pub struct ChartArtifact {
    pub path: PathBuf,
    pub caption: String,
}

#[derive(Debug, Error)]
#[error("chart rendering failed: {0}")]
pub struct ChartError(pub String);

/// Renders charts for a chat's tasks.
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render(
        &self,
        kind: ChartKind,
        chat_id: Option<i64>,
    ) -> Result<ChartArtifact, ChartError>;
}

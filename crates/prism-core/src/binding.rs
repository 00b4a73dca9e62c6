//! Subscription from a snapshot stream to a display surface

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use crate::error::Result;
use crate::providers::types::TextStream;

/// A display region showing one markdown document at a time
#[async_trait]
pub trait ResponsePanel: Send {
    /// Replace the whole displayed content
    async fn replace(&mut self, markdown: &str) -> Result<()>;
}

/// Outcome of a completed binding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindSummary {
    /// Number of snapshots rendered
    pub snapshots: usize,
    /// Last rendered text (the full answer)
    pub text: String,
}

/// Drive `stream` into `panel`, one full replace per snapshot.
///
/// Stops at the first stream or panel error. The stream is dropped on return,
/// which closes any vendor connection still open.
pub async fn bind<P>(mut stream: TextStream, panel: &mut P) -> Result<BindSummary>
where
    P: ResponsePanel + ?Sized,
{
    let mut summary = BindSummary::default();
    while let Some(snapshot) = stream.next().await {
        let snapshot = snapshot?;
        panel.replace(&snapshot).await?;
        summary.snapshots += 1;
        summary.text = snapshot;
    }
    debug!("Binding finished after {} snapshots", summary.snapshots);
    Ok(summary)
}

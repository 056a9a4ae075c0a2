use std::collections::HashSet;
use std::path::PathBuf;

use pagesync_core::{PageError, RemoteStore};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::markdown::render_page;
use super::paths::{PathClaims, attachment_file_name, page_file, relative_path};
use super::state::{SyncState, timestamp_now};
use crate::config::{PageOptions, SlugCollisions};
use crate::convert::{ConvertError, Converter};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("authentication rejected while syncing page {page_id}: {source}")]
    Auth {
        page_id: String,
        #[source]
        source: PageError,
    },
}

/// Reasons a single page ends up `Failed`; none of them stop the traversal.
#[derive(Debug, Error)]
enum NodeError {
    #[error(transparent)]
    Remote(#[from] PageError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timestamp formatting failed: {0}")]
    Time(#[from] time::error::Format),
    #[error("page {0} appears more than once in the tree; the remote hierarchy has a cycle")]
    Revisited(String),
}

impl NodeError {
    /// A re-run may succeed (rate limit, server error, timeout).
    fn is_retryable(&self) -> bool {
        matches!(self, NodeError::Remote(err) if err.is_retryable())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    Synced,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncTotals {
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncTotals {
    pub fn record(&mut self, outcome: NodeOutcome) {
        match outcome {
            NodeOutcome::Synced => self.synced += 1,
            NodeOutcome::Skipped => self.skipped += 1,
            NodeOutcome::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: SyncTotals) {
        self.synced += other.synced;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Where one tracked root page and its descendants land on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRoot {
    pub page_id: String,
    /// Directory holding the root page's file.
    pub dest_dir: PathBuf,
    /// Shared per-project attachment directory.
    pub assets_dir: PathBuf,
    pub options: PageOptions,
}

struct PendingNode {
    page_id: String,
    dir: PathBuf,
}

struct Placed {
    stem: String,
    outcome: NodeOutcome,
}

/// Walks a remote page tree depth-first, writing changed pages as markdown.
pub struct TreeSync<'a, S, C> {
    store: &'a S,
    converter: &'a C,
    force: bool,
    claims: PathClaims,
}

impl<'a, S: RemoteStore, C: Converter> TreeSync<'a, S, C> {
    pub fn new(store: &'a S, converter: &'a C) -> Self {
        Self {
            store,
            converter,
            force: false,
            claims: PathClaims::default(),
        }
    }

    /// Re-write pages even when the recorded version matches.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Syncs `root` and every descendant; each page is visited at most once.
    ///
    /// Only an authentication failure ends the walk early. Records for pages
    /// synced before that point stay in `state`.
    pub async fn sync_tree(
        &mut self,
        root: &SyncRoot,
        state: &mut SyncState,
    ) -> Result<SyncTotals, EngineError> {
        let mut totals = SyncTotals::default();
        let mut visited = HashSet::new();
        let mut stack = vec![PendingNode {
            page_id: root.page_id.clone(),
            dir: root.dest_dir.clone(),
        }];

        while let Some(node) = stack.pop() {
            if !visited.insert(node.page_id.clone()) {
                let err = NodeError::Revisited(node.page_id.clone());
                warn!(page_id = %node.page_id, "{err}");
                totals.record(NodeOutcome::Failed);
                continue;
            }

            let placed = match self.visit(&node, root, state).await {
                Ok(placed) => placed,
                Err(NodeError::Remote(source)) if source.is_session_fatal() => {
                    return Err(EngineError::Auth {
                        page_id: node.page_id,
                        source,
                    });
                }
                Err(err) => {
                    warn!(
                        page_id = %node.page_id,
                        error = %err,
                        retryable = err.is_retryable(),
                        "failed to sync page"
                    );
                    totals.record(NodeOutcome::Failed);
                    continue;
                }
            };
            totals.record(placed.outcome);

            if !root.options.sync_children {
                continue;
            }
            match self.store.list_children(&node.page_id).await {
                Ok(children) => {
                    let child_dir = node.dir.join(&placed.stem);
                    // Reversed so the first listed child is popped first.
                    stack.extend(children.into_iter().rev().map(|child| PendingNode {
                        page_id: child.id,
                        dir: child_dir.clone(),
                    }));
                }
                Err(source) if source.is_session_fatal() => {
                    return Err(EngineError::Auth {
                        page_id: node.page_id,
                        source,
                    });
                }
                Err(err) => {
                    warn!(
                        page_id = %node.page_id,
                        error = %err,
                        retryable = err.is_retryable(),
                        "failed to list child pages"
                    );
                    totals.record(NodeOutcome::Failed);
                }
            }
        }

        Ok(totals)
    }

    /// Syncs the root page alone, ignoring its children.
    pub async fn sync_page(
        &mut self,
        root: &SyncRoot,
        state: &mut SyncState,
    ) -> Result<NodeOutcome, EngineError> {
        let node = PendingNode {
            page_id: root.page_id.clone(),
            dir: root.dest_dir.clone(),
        };
        match self.visit(&node, root, state).await {
            Ok(placed) => Ok(placed.outcome),
            Err(NodeError::Remote(source)) if source.is_session_fatal() => {
                Err(EngineError::Auth {
                    page_id: node.page_id,
                    source,
                })
            }
            Err(err) => {
                warn!(
                    page_id = %node.page_id,
                    error = %err,
                    retryable = err.is_retryable(),
                    "failed to sync page"
                );
                Ok(NodeOutcome::Failed)
            }
        }
    }

    async fn visit(
        &mut self,
        node: &PendingNode,
        root: &SyncRoot,
        state: &mut SyncState,
    ) -> Result<Placed, NodeError> {
        let page = self.store.fetch_page(&node.page_id).await?;
        let stem = self.claims.stem_for(
            &node.dir,
            &page.title,
            &node.page_id,
            root.options.slug_collisions == SlugCollisions::AppendId,
        );

        if !self.force && state.is_current(&node.page_id, page.version) {
            info!(title = %page.title, version = page.version, "skipping page, version unchanged");
            return Ok(Placed {
                stem,
                outcome: NodeOutcome::Skipped,
            });
        }

        let markdown = self.converter.to_markdown(&page.body)?;
        let assets_rel = relative_path(&node.dir, &root.assets_dir);
        let document = render_page(&page.title, &node.page_id, &markdown, &assets_rel);
        let target = page_file(&node.dir, &stem);
        tokio::fs::create_dir_all(&node.dir).await?;
        tokio::fs::write(&target, document).await?;
        info!(title = %page.title, version = page.version, path = %target.display(), "synced page");

        if root.options.sync_attachments {
            self.sync_attachments(&node.page_id, &page.title, root)
                .await;
        }

        state.record(&node.page_id, &page.title, page.version, timestamp_now()?);
        Ok(Placed {
            stem,
            outcome: NodeOutcome::Synced,
        })
    }

    /// Best effort: failures are logged and never fail the owning page.
    async fn sync_attachments(&self, page_id: &str, title: &str, root: &SyncRoot) {
        let attachments = match self.store.list_attachments(page_id).await {
            Ok(attachments) => attachments,
            Err(err) => {
                warn!(title, error = %err, "failed to fetch attachments");
                return;
            }
        };

        for attachment in attachments {
            let Some(locator) = attachment.download.as_deref() else {
                debug!(name = %attachment.title, "attachment has no download link");
                continue;
            };
            let name = match attachment_file_name(
                page_id,
                &attachment.title,
                root.options.attachment_prefix_with_page_id,
            ) {
                Ok(name) => name,
                Err(err) => {
                    warn!(title, error = %err, "skipping attachment");
                    continue;
                }
            };
            let target = root.assets_dir.join(&name);
            match self.store.download_attachment(locator, &target).await {
                Ok(()) => info!(name = %name, "downloaded attachment"),
                Err(err) => warn!(name = %name, error = %err, "failed to download attachment"),
            }
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

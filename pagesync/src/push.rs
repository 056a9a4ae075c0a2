use pagesync_core::{PageError, PageWriter, RemoteStore};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Access, PageEntry, Project};
use crate::convert::Converter;
use crate::sync::engine::{NodeOutcome, TreeSync};
use crate::sync::session::{SessionError, root_for};
use crate::sync::state::StateStore;

#[derive(Debug, Error)]
pub enum PushError {
    #[error(
        "page `{0}` is configured as read-only; set `access: read-write` in sources.yaml to enable updates"
    )]
    ReadOnly(String),
    #[error("content is empty; refusing to replace the page with a blank body")]
    EmptyContent,
    #[error("failed to fetch current page state: {0}")]
    Fetch(#[source] PageError),
    #[error("failed to update page: {0}")]
    Update(#[source] PageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub title: String,
    pub previous_version: u64,
    pub new_version: u64,
    /// False when the page was updated but the local copy could not be refreshed.
    pub resynced: bool,
}

/// Checked before credentials are read or any request is made.
pub fn ensure_writable(entry: &PageEntry) -> Result<(), PushError> {
    match entry.access {
        Access::ReadWrite => Ok(()),
        Access::ReadOnly => Err(PushError::ReadOnly(entry.name.clone())),
    }
}

/// Replaces the remote body of `entry` with `markdown`, then refreshes the local copy.
pub async fn push_page<S, C>(
    project: &Project,
    entry: &PageEntry,
    markdown: &str,
    store: &S,
    converter: &C,
) -> Result<PushOutcome, PushError>
where
    S: RemoteStore + PageWriter,
    C: Converter,
{
    ensure_writable(entry)?;
    if markdown.trim().is_empty() {
        return Err(PushError::EmptyContent);
    }

    let html = converter.to_html(markdown);
    let current = store
        .fetch_page(&entry.page_id)
        .await
        .map_err(PushError::Fetch)?;
    let updated = store
        .replace_page(&entry.page_id, &current.title, &html, current.version)
        .await
        .map_err(PushError::Update)?;
    info!(
        title = %current.title,
        from = current.version,
        to = updated.version,
        "updated remote page"
    );

    let resynced = match resync_page(project, entry, store, converter).await {
        Ok(NodeOutcome::Synced) => true,
        Ok(outcome) => {
            warn!(?outcome, "page updated remotely but the local copy was not refreshed");
            false
        }
        Err(err) => {
            warn!(error = %err, "page updated remotely but local re-sync failed; run `pagesync sync` to refresh it");
            false
        }
    };

    Ok(PushOutcome {
        title: current.title,
        previous_version: current.version,
        new_version: updated.version,
        resynced,
    })
}

async fn resync_page<S: RemoteStore, C: Converter>(
    project: &Project,
    entry: &PageEntry,
    store: &S,
    converter: &C,
) -> Result<NodeOutcome, SessionError> {
    let state_store = StateStore::for_project(&project.dir);
    let mut state = state_store.load().await?;
    let outcome = TreeSync::new(store, converter)
        .with_force(true)
        .sync_page(&root_for(project, entry), &mut state)
        .await?;
    state_store.save(&state).await?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageOptions;
    use crate::convert::HtmlMarkdown;
    use pagesync_core::PageClient;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(access: Access) -> PageEntry {
        PageEntry {
            name: "Runbook".into(),
            page_id: "42".into(),
            local_path: PathBuf::from("ops/runbook.md"),
            access,
            options: PageOptions {
                sync_attachments: false,
                ..PageOptions::default()
            },
        }
    }

    fn project(dir: &Path, entry: PageEntry) -> Project {
        Project {
            name: "demo".into(),
            dir: dir.to_path_buf(),
            assets_dir: dir.join("pages/assets"),
            pages: vec![entry],
        }
    }

    fn page_json(version: u64, html: &str) -> serde_json::Value {
        json!({
            "id": "42",
            "title": "Runbook",
            "version": { "number": version },
            "body": { "storage": { "value": html } }
        })
    }

    #[tokio::test]
    async fn read_only_page_is_rejected_without_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(1, "")))
            .expect(0)
            .mount(&server)
            .await;
        let dir = tempdir().unwrap();
        let entry = entry(Access::ReadOnly);
        let project = project(dir.path(), entry.clone());
        let client = PageClient::new(&server.uri(), "me@example.com", "token").unwrap();

        let err = push_page(&project, &entry, "# Hi\n", &client, &HtmlMarkdown::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PushError::ReadOnly(name) if name == "Runbook"));
    }

    #[tokio::test]
    async fn blank_content_is_refused() {
        let dir = tempdir().unwrap();
        let entry = entry(Access::ReadWrite);
        let project = project(dir.path(), entry.clone());
        let client = PageClient::new("http://127.0.0.1:9", "me@example.com", "token").unwrap();

        let err = push_page(&project, &entry, " \n\t", &client, &HtmlMarkdown::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PushError::EmptyContent));
    }

    #[tokio::test]
    async fn push_bumps_version_and_resyncs_local_copy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(5, "<p>old</p>")))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/42"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_json(6, "<p>fresh steps</p>")),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/rest/api/content/42"))
            .and(body_partial_json(json!({
                "title": "Runbook",
                "version": { "number": 6 }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_json(6, "<p>fresh steps</p>")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let entry = entry(Access::ReadWrite);
        let project = project(dir.path(), entry.clone());
        let client = PageClient::new(&server.uri(), "me@example.com", "token").unwrap();

        let outcome = push_page(
            &project,
            &entry,
            "fresh steps\n",
            &client,
            &HtmlMarkdown::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            PushOutcome {
                title: "Runbook".into(),
                previous_version: 5,
                new_version: 6,
                resynced: true,
            }
        );
        let local = std::fs::read_to_string(dir.path().join("ops/runbook.md")).unwrap();
        assert!(local.starts_with("# Runbook\n\n"), "{local}");
        assert!(local.contains("fresh steps"), "{local}");
        let state = StateStore::for_project(dir.path()).load().await.unwrap();
        assert!(state.is_current("42", 6));
    }

    #[tokio::test]
    async fn update_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_json(2, "")))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/rest/api/content/42"))
            .respond_with(ResponseTemplate::new(409).set_body_string("version conflict"))
            .mount(&server)
            .await;
        let dir = tempdir().unwrap();
        let entry = entry(Access::ReadWrite);
        let project = project(dir.path(), entry.clone());
        let client = PageClient::new(&server.uri(), "me@example.com", "token").unwrap();

        let err = push_page(&project, &entry, "text", &client, &HtmlMarkdown::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PushError::Update(PageError::Api { .. })));
        assert!(!dir.path().join("ops/runbook.md").exists());
    }
}

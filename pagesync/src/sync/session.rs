use pagesync_core::RemoteStore;
use thiserror::Error;
use tracing::{error, info};

use super::engine::{EngineError, SyncRoot, SyncTotals, TreeSync};
use super::state::{StateError, StateStore};
use crate::config::{PageEntry, Project};
use crate::convert::Converter;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub fn root_for(project: &Project, entry: &PageEntry) -> SyncRoot {
    SyncRoot {
        page_id: entry.page_id.clone(),
        dest_dir: entry.dest_dir(&project.dir),
        assets_dir: project.assets_dir.clone(),
        options: entry.options,
    }
}

/// Syncs `entries` in order against one state file, saved once at the end.
///
/// The state is saved even when an authentication failure stops the run.
pub async fn run_sync<S, C>(
    project: &Project,
    entries: &[&PageEntry],
    store: &S,
    converter: &C,
    force: bool,
) -> Result<SyncTotals, SessionError>
where
    S: RemoteStore,
    C: Converter,
{
    let state_store = StateStore::for_project(&project.dir);
    let mut state = state_store.load().await?;
    let mut engine = TreeSync::new(store, converter).with_force(force);
    let mut totals = SyncTotals::default();
    let mut aborted = None;

    for entry in entries {
        info!(project = %project.name, page = %entry.name, page_id = %entry.page_id, "syncing page tree");
        match engine.sync_tree(&root_for(project, entry), &mut state).await {
            Ok(entry_totals) => totals.merge(entry_totals),
            Err(err) => {
                error!(page = %entry.name, error = %err, "sync aborted");
                aborted = Some(err);
                break;
            }
        }
    }

    state_store.save(&state).await?;
    if let Some(err) = aborted {
        return Err(err.into());
    }
    info!(
        synced = totals.synced,
        skipped = totals.skipped,
        failed = totals.failed,
        "sync complete"
    );
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Access, PageOptions};
    use crate::convert::HtmlMarkdown;
    use crate::sync::state::STATE_FILE_NAME;
    use pagesync_core::PageClient;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(name: &str, page_id: &str, local_path: &str) -> PageEntry {
        PageEntry {
            name: name.into(),
            page_id: page_id.into(),
            local_path: PathBuf::from(local_path),
            access: Access::ReadOnly,
            options: PageOptions {
                sync_attachments: false,
                ..PageOptions::default()
            },
        }
    }

    fn project(dir: &Path, pages: Vec<PageEntry>) -> Project {
        Project {
            name: "demo".into(),
            dir: dir.to_path_buf(),
            assets_dir: dir.join("pages/assets"),
            pages,
        }
    }

    async fn mount_leaf(server: &MockServer, id: &str, title: &str, version: u64, html: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/rest/api/content/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "title": title,
                "version": { "number": version },
                "body": { "storage": { "value": html } }
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/rest/api/content/{id}/child/page")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "results": [], "size": 0 })),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn root_uses_entry_directory_and_project_assets() {
        let project = project(Path::new("/work/projects/demo"), Vec::new());
        let root = root_for(&project, &entry("Runbook", "7", "ops/runbook.md"));

        assert_eq!(root.page_id, "7");
        assert_eq!(root.dest_dir, PathBuf::from("/work/projects/demo/ops"));
        assert_eq!(root.assets_dir, PathBuf::from("/work/projects/demo/pages/assets"));
    }

    #[tokio::test]
    async fn state_is_persisted_and_reused_across_runs() {
        let server = MockServer::start().await;
        mount_leaf(&server, "100", "Overview", 3, "<p>Hello world</p>").await;
        let dir = tempdir().unwrap();
        let project = project(dir.path(), vec![entry("Overview", "100", "pages/overview.md")]);
        let entries = project.select(None).unwrap();
        let client = PageClient::new(&server.uri(), "me@example.com", "token").unwrap();
        let converter = HtmlMarkdown::new();

        let first = run_sync(&project, &entries, &client, &converter, false)
            .await
            .unwrap();
        assert_eq!(first.synced, 1);
        let written = std::fs::read_to_string(dir.path().join("pages/overview.md")).unwrap();
        assert!(written.starts_with("# Overview\n\n"), "{written}");
        assert!(written.contains("Hello world"), "{written}");

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(STATE_FILE_NAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["100"]["version"], 3);
        assert_eq!(saved["100"]["title"], "Overview");

        let second = run_sync(&project, &entries, &client, &converter, false)
            .await
            .unwrap();
        assert_eq!(second.synced, 0);
        assert_eq!(second.skipped, 1);
    }

    #[tokio::test]
    async fn restricted_and_rate_limited_children_fail_alone() {
        let server = MockServer::start().await;
        mount_leaf(&server, "202", "Open Child", 1, "<p>visible</p>").await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "100",
                "title": "Overview",
                "version": { "number": 1 },
                "body": { "storage": { "value": "<p>root</p>" } }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/100/child/page"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "id": "200", "title": "Restricted" },
                    { "id": "201", "title": "Busy" },
                    { "id": "202", "title": "Open Child" }
                ],
                "size": 3
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/200"))
            .respond_with(ResponseTemplate::new(403).set_body_string("restricted"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/201"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let dir = tempdir().unwrap();
        let project = project(dir.path(), vec![entry("Overview", "100", "pages/overview.md")]);
        let entries = project.select(None).unwrap();
        let client = PageClient::new(&server.uri(), "me@example.com", "token").unwrap();

        let totals = run_sync(&project, &entries, &client, &HtmlMarkdown::new(), false)
            .await
            .unwrap();

        assert_eq!(
            totals,
            SyncTotals {
                synced: 2,
                skipped: 0,
                failed: 2
            }
        );
        assert!(dir.path().join("pages/overview/open-child.md").exists());
        let state = StateStore::for_project(dir.path()).load().await.unwrap();
        assert!(state.is_current("202", 1));
        assert!(state.get("200").is_none());
    }

    #[tokio::test]
    async fn auth_failure_still_saves_earlier_entries() {
        let server = MockServer::start().await;
        mount_leaf(&server, "100", "Overview", 1, "<p>ok</p>").await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/200"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let dir = tempdir().unwrap();
        let project = project(
            dir.path(),
            vec![
                entry("Overview", "100", "pages/overview.md"),
                entry("Secret", "200", "pages/secret.md"),
            ],
        );
        let entries = project.select(None).unwrap();
        let client = PageClient::new(&server.uri(), "me@example.com", "token").unwrap();

        let err = run_sync(&project, &entries, &client, &HtmlMarkdown::new(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Engine(EngineError::Auth { .. })));
        let state = StateStore::for_project(dir.path()).load().await.unwrap();
        assert!(state.is_current("100", 1));
        assert!(state.get("200").is_none());
    }
}

use std::future::Future;
use std::path::Path;

use crate::client::{Attachment, Page, PageClient, PageError, PageRef};

/// Read-side capabilities the tree sync needs from a remote page store.
pub trait RemoteStore {
    fn fetch_page(&self, id: &str) -> impl Future<Output = Result<Page, PageError>>;

    /// All direct children, in the order the store lists them.
    fn list_children(&self, id: &str) -> impl Future<Output = Result<Vec<PageRef>, PageError>>;

    fn list_attachments(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Vec<Attachment>, PageError>>;

    fn download_attachment(
        &self,
        locator: &str,
        target: &Path,
    ) -> impl Future<Output = Result<(), PageError>>;
}

pub trait PageWriter {
    /// Replaces the page body wholesale, submitting `expected_version + 1`.
    fn replace_page(
        &self,
        id: &str,
        title: &str,
        body: &str,
        expected_version: u64,
    ) -> impl Future<Output = Result<Page, PageError>>;
}

impl RemoteStore for PageClient {
    fn fetch_page(&self, id: &str) -> impl Future<Output = Result<Page, PageError>> {
        self.get_page(id)
    }

    fn list_children(&self, id: &str) -> impl Future<Output = Result<Vec<PageRef>, PageError>> {
        self.get_child_pages(id)
    }

    fn list_attachments(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Vec<Attachment>, PageError>> {
        self.get_attachments(id)
    }

    fn download_attachment(
        &self,
        locator: &str,
        target: &Path,
    ) -> impl Future<Output = Result<(), PageError>> {
        self.download_to_path(locator, target)
    }
}

impl PageWriter for PageClient {
    fn replace_page(
        &self,
        id: &str,
        title: &str,
        body: &str,
        expected_version: u64,
    ) -> impl Future<Output = Result<Page, PageError>> {
        self.update_page(id, title, body, expected_version)
    }
}

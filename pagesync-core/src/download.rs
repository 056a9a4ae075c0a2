use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Method;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::client::{PageClient, PageError};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

impl PageClient {
    /// Streams an attachment to `target`, replacing any existing file.
    pub async fn download_to_path(&self, locator: &str, target: &Path) -> Result<(), PageError> {
        let url = self.resolve_locator(locator)?;
        let response = self
            .authed_request(Method::GET, url.clone())
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PageError::Download {
                status: response.status(),
                url: url.to_string(),
            });
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        if let Err(err) = write_stream(response, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }
        tokio::fs::rename(partial, target).await?;
        Ok(())
    }

    pub fn resolve_locator(&self, locator: &str) -> Result<Url, PageError> {
        match Url::parse(locator) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let separator = if locator.starts_with('/') { "" } else { "/" };
                Ok(Url::parse(&format!(
                    "{}{separator}{locator}",
                    self.base_url()
                ))?)
            }
            Err(err) => Err(err.into()),
        }
    }
}

async fn write_stream(response: reqwest::Response, partial: &Path) -> Result<(), PageError> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}

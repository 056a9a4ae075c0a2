use std::fmt;
use std::path::{Path, PathBuf};

use pagesync_core::{PageClient, PageError};
use thiserror::Error;

use crate::config::{EnvVarNames, Workspace};

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error(
        "missing required environment variables: {}; copy .env.example to .env and fill in your credentials",
        .0.join(", ")
    )]
    Missing(Vec<String>),
    #[error("failed to load {path}: {source}")]
    DotEnv {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Reads `<workspace>/.env` (process variables win) and resolves the configured names.
    pub fn resolve(workspace: &Workspace) -> Result<Self, CredentialsError> {
        load_dotenv(&workspace.root().join(".env"))?;
        Self::from_lookup(&workspace.settings().remote.env_vars, |name| {
            std::env::var(name).ok()
        })
    }

    pub fn from_lookup<F>(names: &EnvVarNames, lookup: F) -> Result<Self, CredentialsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut read = |name: &str| match lookup(name).filter(|value| !value.trim().is_empty()) {
            Some(value) => value,
            None => {
                missing.push(name.to_string());
                String::new()
            }
        };
        let base_url = read(&names.base_url);
        let email = read(&names.email);
        let api_token = read(&names.api_token);

        if !missing.is_empty() {
            return Err(CredentialsError::Missing(missing));
        }
        Ok(Self {
            base_url,
            email,
            api_token,
        })
    }

    pub fn client(&self) -> Result<PageClient, PageError> {
        PageClient::new(&self.base_url, self.email.clone(), self.api_token.clone())
    }
}

/// A missing file is fine; a malformed one is reported.
fn load_dotenv(path: &Path) -> Result<(), CredentialsError> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(source) => Err(CredentialsError::DotEnv {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn resolves_all_configured_variables() {
        let creds = Credentials::from_lookup(
            &EnvVarNames::default(),
            lookup_from(&[
                ("PAGESYNC_BASE_URL", "https://acme.example/wiki"),
                ("PAGESYNC_EMAIL", "me@example.com"),
                ("PAGESYNC_API_TOKEN", "secret"),
            ]),
        )
        .unwrap();

        assert_eq!(creds.base_url, "https://acme.example/wiki");
        assert!(!format!("{creds:?}").contains("secret"));
        assert!(creds.client().is_ok());
    }

    #[test]
    fn reports_every_missing_variable_at_once() {
        let err = Credentials::from_lookup(
            &EnvVarNames::default(),
            lookup_from(&[("PAGESYNC_EMAIL", "me@example.com"), ("PAGESYNC_API_TOKEN", " ")]),
        )
        .unwrap_err();

        match err {
            CredentialsError::Missing(names) => {
                assert_eq!(names, vec!["PAGESYNC_BASE_URL", "PAGESYNC_API_TOKEN"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_dotenv_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dotenv(&dir.path().join(".env")).is_ok());
    }

    #[test]
    fn malformed_dotenv_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "PAGESYNC_NOT VALID\n").unwrap();

        let err = load_dotenv(&path).unwrap_err();

        assert!(
            matches!(&err, CredentialsError::DotEnv { path: reported, .. } if reported == &path),
            "{err:?}"
        );
    }
}

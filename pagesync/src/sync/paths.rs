use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("attachment name is empty")]
    Empty,
    #[error("attachment name `{0}` contains an unsupported component")]
    UnsupportedComponent(String),
}

/// Filesystem-safe form of a page title: lower-case, alphanumerics joined by single hyphens.
pub fn slugify(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut separator = false;
    for ch in lowered.chars() {
        if ch.is_whitespace() || ch == '_' || ch == '-' {
            separator = true;
        } else if ch.is_alphanumeric() {
            if separator && !slug.is_empty() {
                slug.push('-');
            }
            separator = false;
            slug.push(ch);
        }
        // Anything else is dropped and does not end a separator run.
    }
    slug
}

pub fn page_file(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}.md"))
}

pub fn attachment_file_name(page_id: &str, title: &str, prefix: bool) -> Result<String, PathError> {
    if title.is_empty() {
        return Err(PathError::Empty);
    }
    if title.contains(['/', '\\']) {
        return Err(PathError::UnsupportedComponent(title.to_string()));
    }
    let mut components = Path::new(title).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return Err(PathError::UnsupportedComponent(title.to_string())),
    }
    Ok(if prefix {
        format!("{page_id}-{title}")
    } else {
        title.to_string()
    })
}

/// `/`-joined path leading from `from_dir` to `to_dir`, for links inside markdown.
pub fn relative_path(from_dir: &Path, to_dir: &Path) -> String {
    let from: Vec<_> = from_dir
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let to: Vec<_> = to_dir
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = Vec::new();
    parts.extend((common..from.len()).map(|_| "..".to_string()));
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// File stems handed out during one session, keyed by directory.
#[derive(Debug, Default)]
pub struct PathClaims {
    claimed: HashSet<PathBuf>,
}

impl PathClaims {
    /// Stem for a page placed in `dir`. With `disambiguate`, a stem already claimed by
    /// another page gets the page id appended; otherwise the later page overwrites.
    pub fn stem_for(&mut self, dir: &Path, title: &str, page_id: &str, disambiguate: bool) -> String {
        let slug = slugify(title);
        let base = if slug.is_empty() {
            page_id.to_string()
        } else {
            slug
        };
        if self.claimed.insert(dir.join(&base)) || !disambiguate {
            return base;
        }
        let stem = format!("{base}-{page_id}");
        self.claimed.insert(dir.join(&stem));
        stem
    }
}

use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sync::paths::slugify;

pub const GLOBAL_SETTINGS_PATH: &str = "config/global-settings.yaml";
pub const PROJECTS_DIR: &str = "projects";
pub const SOURCES_FILE_NAME: &str = "sources.yaml";

const DEFAULT_PAGES_DIR: &str = "pages";
const DEFAULT_ASSETS_DIR: &str = "pages/assets";
const DEFAULT_BASE_URL_VAR: &str = "PAGESYNC_BASE_URL";
const DEFAULT_EMAIL_VAR: &str = "PAGESYNC_EMAIL";
const DEFAULT_API_TOKEN_VAR: &str = "PAGESYNC_API_TOKEN";

static PAGES_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/pages/(\d+)").expect("pages pattern compiles"));
static PAGE_ID_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]pageId=(\d+)").expect("pageId pattern compiles"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("no sources.yaml found for project `{project}` at {path}")]
    MissingSources { project: String, path: PathBuf },
    #[error("page entry `{0}` needs either `page_id` or `url`")]
    MissingPageId(String),
    #[error("could not extract a page id from `{0}`; expected a URL containing /pages/<id> or ?pageId=<id>")]
    BadUrl(String),
    #[error("page `{page}` is not listed in sources.yaml for project `{project}`")]
    UnknownPage { page: String, project: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    #[default]
    ReadOnly,
    ReadWrite,
}

/// What to do when two pages in one directory derive the same file name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlugCollisions {
    /// Last page written wins.
    #[default]
    Overwrite,
    /// The later page gets its id appended to the file name.
    AppendId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    pub sync_children: bool,
    pub sync_attachments: bool,
    pub attachment_prefix_with_page_id: bool,
    pub slug_collisions: SlugCollisions,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            sync_children: true,
            sync_attachments: true,
            attachment_prefix_with_page_id: true,
            slug_collisions: SlugCollisions::Overwrite,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageOverrides {
    #[serde(default)]
    pub sync_children: Option<bool>,
    #[serde(default)]
    pub sync_attachments: Option<bool>,
    #[serde(default)]
    pub attachment_prefix_with_page_id: Option<bool>,
    #[serde(default)]
    pub access: Option<Access>,
    #[serde(default)]
    pub slug_collisions: Option<SlugCollisions>,
}

impl PageOverrides {
    fn resolve(&self, defaults: &PageOverrides) -> (Access, PageOptions) {
        let builtin = PageOptions::default();
        let options = PageOptions {
            sync_children: self
                .sync_children
                .or(defaults.sync_children)
                .unwrap_or(builtin.sync_children),
            sync_attachments: self
                .sync_attachments
                .or(defaults.sync_attachments)
                .unwrap_or(builtin.sync_attachments),
            attachment_prefix_with_page_id: self
                .attachment_prefix_with_page_id
                .or(defaults.attachment_prefix_with_page_id)
                .unwrap_or(builtin.attachment_prefix_with_page_id),
            slug_collisions: self
                .slug_collisions
                .or(defaults.slug_collisions)
                .unwrap_or(builtin.slug_collisions),
        };
        let access = self.access.or(defaults.access).unwrap_or_default();
        (access, options)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnvVarNames {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

impl Default for EnvVarNames {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL_VAR.to_string(),
            email: DEFAULT_EMAIL_VAR.to_string(),
            api_token: DEFAULT_API_TOKEN_VAR.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteSettings {
    #[serde(default)]
    pub env_vars: EnvVarNames,
}

/// `config/global-settings.yaml`; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub defaults: PageOverrides,
    #[serde(default)]
    pub assets_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawSources {
    #[serde(default)]
    pages: Vec<RawPageEntry>,
}

#[derive(Debug, Deserialize)]
struct RawPageEntry {
    name: String,
    #[serde(default)]
    page_id: Option<RawPageId>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    local_path: Option<PathBuf>,
    #[serde(flatten)]
    overrides: PageOverrides,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPageId {
    Number(u64),
    Text(String),
}

/// One tracked root page of a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub name: String,
    pub page_id: String,
    /// Relative to the project directory.
    pub local_path: PathBuf,
    pub access: Access,
    pub options: PageOptions,
}

impl PageEntry {
    /// Directory holding the root page's file.
    pub fn dest_dir(&self, project_dir: &Path) -> PathBuf {
        match self.local_path.parent() {
            Some(parent) => project_dir.join(parent),
            None => project_dir.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub dir: PathBuf,
    pub assets_dir: PathBuf,
    pub pages: Vec<PageEntry>,
}

impl Project {
    pub fn page(&self, name: &str) -> Result<&PageEntry, ConfigError> {
        self.pages
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| ConfigError::UnknownPage {
                page: name.to_string(),
                project: self.name.clone(),
            })
    }

    /// Every entry, or only the named one.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<&PageEntry>, ConfigError> {
        match name {
            Some(name) => Ok(vec![self.page(name)?]),
            None => Ok(self.pages.iter().collect()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    settings: GlobalSettings,
}

impl Workspace {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let root = root.into();
        let settings_path = root.join(GLOBAL_SETTINGS_PATH);
        let settings = match std::fs::read_to_string(&settings_path) {
            Ok(content) if content.trim().is_empty() => GlobalSettings::default(),
            Ok(content) => serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: settings_path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => GlobalSettings::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: settings_path,
                    source,
                });
            }
        };
        Ok(Self { root, settings })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.root.join(PROJECTS_DIR).join(project)
    }

    pub fn load_project(&self, project: &str) -> Result<Project, ConfigError> {
        let dir = self.project_dir(project);
        let sources_path = dir.join(SOURCES_FILE_NAME);
        let content = match std::fs::read_to_string(&sources_path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::MissingSources {
                    project: project.to_string(),
                    path: sources_path,
                });
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: sources_path,
                    source,
                });
            }
        };
        let raw: RawSources = if content.trim().is_empty() {
            RawSources { pages: Vec::new() }
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: sources_path.clone(),
                source,
            })?
        };

        let pages = raw
            .pages
            .into_iter()
            .map(|entry| self.resolve_entry(entry))
            .collect::<Result<Vec<_>, _>>()?;
        let assets_dir = dir.join(
            self.settings
                .assets_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR)),
        );

        Ok(Project {
            name: project.to_string(),
            dir,
            assets_dir,
            pages,
        })
    }

    fn resolve_entry(&self, raw: RawPageEntry) -> Result<PageEntry, ConfigError> {
        let page_id = match (raw.page_id, raw.url.as_deref()) {
            (Some(RawPageId::Number(id)), _) => id.to_string(),
            (Some(RawPageId::Text(id)), _) => id,
            (None, Some(url)) => extract_page_id(url)?,
            (None, None) => return Err(ConfigError::MissingPageId(raw.name)),
        };
        let local_path = raw.local_path.unwrap_or_else(|| {
            PathBuf::from(DEFAULT_PAGES_DIR).join(format!("{}.md", slugify(&raw.name)))
        });
        let (access, options) = raw.overrides.resolve(&self.settings.defaults);
        Ok(PageEntry {
            name: raw.name,
            page_id,
            local_path,
            access,
            options,
        })
    }
}

/// Page id from a URL containing `/pages/<id>` or a `pageId=<id>` query parameter.
pub fn extract_page_id(url: &str) -> Result<String, ConfigError> {
    PAGES_SEGMENT
        .captures(url)
        .or_else(|| PAGE_ID_PARAM.captures(url))
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| ConfigError::BadUrl(url.to_string()))
}

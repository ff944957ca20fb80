//! Reports produced by a build, and their persisted form.
//!
//! Registries are written once, after rendering, and read back whenever the
//! build is served. Older builds stored a single index file name instead of a
//! list of reports; those are upgraded right after reading, see
//! [`PersistedState::normalize`].

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::module::ModuleId;

/// Directory inside a build holding its reports.
pub const REPORT_DIR: &str = "ivyreport";

/// Name of the persisted registry inside [`REPORT_DIR`].
pub const REGISTRY_FILE: &str = "registry.json";

/// A report generated for one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub module: ModuleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
    /// Entry point of the report.
    pub path: Utf8PathBuf,
}

/// Immutable collection of the reports of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRegistry {
    dir: Utf8PathBuf,
    reports: Vec<ReportArtifact>,
}

impl ReportRegistry {
    pub fn new(dir: impl Into<Utf8PathBuf>, reports: Vec<ReportArtifact>) -> Self {
        Self {
            dir: dir.into(),
            reports,
        }
    }

    /// Directory the reports, and the files they reference, live in.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn reports(&self) -> &[ReportArtifact] {
        &self.reports
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// First report of the module with the given file-system token.
    pub fn find(&self, token: &str) -> Option<&ReportArtifact> {
        self.reports
            .iter()
            .find(|report| report.module.to_fs_name() == token)
    }

    /// Writes the registry in the current format.
    pub fn save(&self, path: &Utf8Path) -> Result<(), RegistryError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reads a registry written by any version, `build_root` being the root
    /// directory of the build it belongs to.
    pub fn load(path: &Utf8Path, build_root: &Utf8Path) -> Result<Self, RegistryError> {
        let text = fs::read_to_string(path)?;
        let state: PersistedState = serde_json::from_str::<RawState>(&text)?.into();
        Ok(state.normalize(build_root))
    }
}

/// Union of every field ever written.
#[derive(Debug, Deserialize)]
struct RawState {
    #[serde(default)]
    dir: Option<Utf8PathBuf>,
    #[serde(default)]
    reports: Vec<ReportArtifact>,
    #[serde(default, rename = "indexFileName")]
    index_file_name: Option<String>,
}

/// Shapes a registry was persisted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistedState {
    /// Single report, known only by its file name.
    Legacy { index_file_name: String },
    Current {
        dir: Option<Utf8PathBuf>,
        reports: Vec<ReportArtifact>,
    },
}

impl From<RawState> for PersistedState {
    fn from(raw: RawState) -> Self {
        match raw.index_file_name {
            Some(index_file_name) if raw.reports.is_empty() => {
                PersistedState::Legacy { index_file_name }
            }
            _ => PersistedState::Current {
                dir: raw.dir,
                reports: raw.reports,
            },
        }
    }
}

impl PersistedState {
    /// Converts any persisted shape into a registry.
    pub fn normalize(self, build_root: &Utf8Path) -> ReportRegistry {
        match self {
            PersistedState::Legacy { index_file_name } => {
                let dir = build_root.join(REPORT_DIR);
                let report = ReportArtifact {
                    module: ModuleId::from_token(&index_file_name),
                    configuration: None,
                    path: dir.join(&index_file_name),
                };
                ReportRegistry::new(dir, vec![report])
            }
            PersistedState::Current { dir, reports } => {
                let dir = dir.unwrap_or_else(|| build_root.join(REPORT_DIR));
                ReportRegistry::new(dir, reports)
            }
        }
    }
}

//! Maps request paths onto the reports of a build.
//!
//! A request is tried against each [`Lookup`] in turn: first the module
//! tokens of the registry, then the files sitting next to the reports
//! (stylesheets, images, diagrams). The second lookup never leaves the
//! registry directory.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::registry::{ReportArtifact, ReportRegistry};

/// Outcome of routing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    /// The report of a module.
    Artifact(&'a ReportArtifact),
    /// Any other file inside the registry directory.
    File(Utf8PathBuf),
    NotFound,
}

/// One way of resolving a request path, already stripped of its leading
/// separator.
pub trait Lookup: Send + Sync {
    fn lookup<'a>(&self, registry: &'a ReportRegistry, path: &str) -> Option<Route<'a>>;
}

/// Matches the path against module tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactLookup;

impl Lookup for ArtifactLookup {
    fn lookup<'a>(&self, registry: &'a ReportRegistry, path: &str) -> Option<Route<'a>> {
        registry.find(path).map(Route::Artifact)
    }
}

/// Serves existing files below the registry directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiblingFileLookup;

impl Lookup for SiblingFileLookup {
    fn lookup<'a>(&self, registry: &'a ReportRegistry, path: &str) -> Option<Route<'a>> {
        let relative = confine(path)?;
        let file = registry.dir().join(relative);

        if !file.is_file() {
            return None;
        }

        // symlinks may still point outside
        let root = registry.dir().canonicalize_utf8().ok()?;
        let real = file.canonicalize_utf8().ok()?;
        if !real.starts_with(&root) {
            debug!(path = %file, "refusing a file outside the report directory");
            return None;
        }

        Some(Route::File(file))
    }
}

/// Turns a request path into a relative path which can't climb above its
/// base. Paths with `..`, roots or prefixes are rejected, as are empty ones.
pub fn confine(path: &str) -> Option<Utf8PathBuf> {
    let mut relative = Utf8PathBuf::new();

    for component in Utf8Path::new(path).components() {
        match component {
            Utf8Component::Normal(part) => relative.push(part),
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir | Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                return None;
            }
        }
    }

    (!relative.as_str().is_empty()).then_some(relative)
}

/// Router over the reports of a single build.
pub struct ReportRouter {
    registry: ReportRegistry,
    lookups: Vec<Box<dyn Lookup>>,
}

impl ReportRouter {
    pub fn new(registry: ReportRegistry) -> Self {
        Self {
            registry,
            lookups: vec![Box::new(ArtifactLookup), Box::new(SiblingFileLookup)],
        }
    }

    pub fn registry(&self) -> &ReportRegistry {
        &self.registry
    }

    /// Routes a request path, with or without its leading `/`.
    pub fn route(&self, request: &str) -> Route<'_> {
        let path = request.strip_prefix('/').unwrap_or(request);

        self.lookups
            .iter()
            .find_map(|lookup| lookup.lookup(&self.registry, path))
            .unwrap_or(Route::NotFound)
    }
}

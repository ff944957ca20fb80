use std::fs::File;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::descriptor::{Descriptor, DescriptorParser, IvyXmlParser};
use crate::error::{SettingsError, SyncError};
use crate::module::ModuleId;
use crate::settings::{ResolverSettings, Settings};
use crate::sync::{RemoteFile, sync_if_newer};

/// Name of the descriptor backup, relative to the build directory.
const BACKUP_FILE_NAME: &str = "ivy.xml";

/// Path of the descriptor backup of `module` inside `build_dir`.
pub fn backup_path(build_dir: &Utf8Path, module: &ModuleId) -> Utf8PathBuf {
    build_dir.join(format!("{}${BACKUP_FILE_NAME}", module.to_fs_name()))
}

/// Splits a comma separated list of configuration patterns.
pub fn requested_configurations(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|conf| !conf.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
enum Resolution {
    Unresolved,
    Resolved(Arc<Descriptor>),
}

/// Resolves the descriptor of a single module, keeping the backup of the
/// build in sync with the workspace.
///
/// The parsed descriptor is kept until [`refresh`](Self::refresh) starts a
/// new sync cycle. Failures other than an unwritable backup leave the
/// resolver without a descriptor, and expansion then passes requests
/// through unchanged.
pub struct DescriptorResolver {
    module: ModuleId,
    backup: Utf8PathBuf,
    source: Option<Box<dyn RemoteFile>>,
    workspace: Option<Utf8PathBuf>,
    settings: ResolverSettings,
    parser: Arc<dyn DescriptorParser>,
    state: Resolution,
}

impl DescriptorResolver {
    pub fn new(module: ModuleId, backup: impl Into<Utf8PathBuf>) -> Self {
        Self {
            module,
            backup: backup.into(),
            source: None,
            workspace: None,
            settings: ResolverSettings::default(),
            parser: Arc::new(IvyXmlParser),
            state: Resolution::Unresolved,
        }
    }

    /// Descriptor inside the workspace. Without one the backup is used as is.
    pub fn source(mut self, source: impl RemoteFile + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Workspace root the settings are looked up in.
    pub fn workspace(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.workspace = Some(root.into());
        self
    }

    pub fn settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn parser(mut self, parser: Arc<dyn DescriptorParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    pub fn backup(&self) -> &Utf8Path {
        &self.backup
    }

    /// Starts a new sync cycle, the next [`resolve`](Self::resolve) syncs and
    /// parses again.
    pub fn refresh(&mut self) {
        self.state = Resolution::Unresolved;
    }

    /// Returns the parsed descriptor, syncing and parsing it first unless
    /// this cycle already did. `Ok(None)` means no descriptor is usable; the
    /// only error is a backup that can't be written.
    pub fn resolve(&mut self) -> Result<Option<Arc<Descriptor>>, SyncError> {
        if let Resolution::Resolved(descriptor) = &self.state {
            return Ok(Some(descriptor.clone()));
        }

        debug!(module = %self.module, "recomputing the module descriptor");

        let Some(settings) = self.load_settings() else {
            return Ok(None);
        };

        match sync_if_newer(self.source.as_deref(), &self.backup) {
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e @ SyncError::Interrupted(_)) => {
                warn!(module = %self.module, "{e}");
                if readable(&self.backup) {
                    warn!(module = %self.module, "will try to use the existing backup");
                }
            }
            Err(e) => {
                warn!(module = %self.module, "failed to access the workspace descriptor: {e}");
                return Ok(None);
            }
        }

        if !readable(&self.backup) {
            warn!(module = %self.module, backup = %self.backup, "cannot read the descriptor backup");
            return Ok(None);
        }

        match self.parser.parse(&self.backup, &settings) {
            Ok(descriptor) => {
                let descriptor = Arc::new(descriptor);
                self.state = Resolution::Resolved(descriptor.clone());
                Ok(Some(descriptor))
            }
            Err(e) => {
                warn!(module = %self.module, backup = %self.backup, "{e}");
                Ok(None)
            }
        }
    }

    /// Expands the requested configuration patterns against the declared
    /// configurations of the module, see [`expand_configurations`].
    pub fn expand<S: AsRef<str>>(&mut self, requested: &[S]) -> Result<Vec<String>, SyncError> {
        let descriptor = self.resolve()?;
        Ok(expand_configurations(descriptor.as_deref(), requested))
    }

    fn load_settings(&self) -> Option<Settings> {
        let loaded = match &self.workspace {
            Some(root) => self.settings.load(root),
            None => match &self.settings.settings_file {
                Some(file) => Err(SettingsError::Unavailable(file.clone())),
                None => Ok(Settings::default()),
            },
        };

        loaded
            .inspect_err(|e| warn!(module = %self.module, "{e}"))
            .ok()
    }
}

fn readable(path: &Utf8Path) -> bool {
    File::open(path).is_ok()
}

/// Expands wildcards in `requested` and keeps the names the descriptor
/// declares, in order of first occurrence. Without a descriptor the request
/// is returned untouched.
pub fn expand_configurations<S: AsRef<str>>(
    descriptor: Option<&Descriptor>,
    requested: &[S],
) -> Vec<String> {
    let Some(descriptor) = descriptor else {
        return requested.iter().map(|s| s.as_ref().to_string()).collect();
    };

    let declared = descriptor.configuration_names();
    let mut expanded = descriptor.replace_wildcards(requested);
    expanded.retain(|name| declared.contains(&name.as_str()));
    expanded
}

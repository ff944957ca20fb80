//! The post-build step: sync descriptors, expand configurations, render one
//! report per configuration and record the results.

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use console::style;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{error, info, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::descriptor::{DescriptorParser, IvyXmlParser};
use crate::error::PublishError;
use crate::io::{PROGRESS_STYLE, as_overhead};
use crate::module::ModuleId;
use crate::registry::{REGISTRY_FILE, REPORT_DIR, ReportArtifact, ReportRegistry};
use crate::render::{RenderJob, ReportRenderer};
use crate::resolver::{DescriptorResolver, backup_path, expand_configurations, requested_configurations};
use crate::settings::ResolverSettings;
use crate::sync::{Cancellation, LocalFile};

/// A module taking part in the build.
#[derive(Debug, Clone)]
pub struct ModuleSource {
    pub module: ModuleId,
    /// Descriptor location, relative to the workspace root.
    pub descriptor: Utf8PathBuf,
}

impl ModuleSource {
    pub fn new(module: ModuleId, descriptor: impl Into<Utf8PathBuf>) -> Self {
        Self {
            module,
            descriptor: descriptor.into(),
        }
    }
}

/// Result of a publish run. Modules which failed are missing from the
/// registry and listed in `failures`.
#[derive(Debug)]
pub struct Publication {
    pub registry: ReportRegistry,
    pub failures: Vec<PublishError>,
}

/// Publishes the dependency reports of a build. Created through
/// [`Publisher::config`].
pub struct Publisher {
    report_dir: String,
    configurations: Vec<String>,
    settings: ResolverSettings,
    parser: Arc<dyn DescriptorParser>,
    renderer: Arc<dyn ReportRenderer>,
    cancel: Cancellation,
}

impl Publisher {
    pub fn config(renderer: impl ReportRenderer + 'static) -> Config {
        Config::new(Arc::new(renderer))
    }

    /// Directory of the reports inside a build directory.
    pub fn report_dir(&self, build_dir: &Utf8Path) -> Utf8PathBuf {
        build_dir.join(&self.report_dir)
    }

    /// Runs the step for `modules`. Without a workspace the descriptor
    /// backups of `build_dir` are used as they are.
    pub fn publish(
        &self,
        build_dir: &Utf8Path,
        workspace: Option<&Utf8Path>,
        modules: &[ModuleSource],
    ) -> Result<Publication, PublishError> {
        info!("Publishing {} report...", style("ivy").cyan());
        let s = Instant::now();

        if self.cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }

        let out = self.report_dir(build_dir);
        fs::create_dir_all(&out).map_err(|e| PublishError::Target(out.clone(), e))?;

        // report files are named after the resolve id, which two modules may share
        let mut claimed = HashSet::new();
        let (unique, duplicates): (Vec<_>, Vec<_>) = modules
            .iter()
            .partition(|source| claimed.insert(source.module.resolve_id()));

        let span = tracing::info_span!("publishing");
        span.pb_set_length(unique.len() as u64);
        span.pb_set_style(&PROGRESS_STYLE);
        span.pb_set_message("Rendering reports...");
        let _enter = span.enter();

        let results: Vec<_> = unique
            .par_iter()
            .map(|source| {
                let result = self.publish_module(build_dir, workspace, &out, source);
                span.pb_inc(1);
                result
            })
            .collect();

        let mut reports = Vec::new();
        let mut failures: Vec<_> = duplicates
            .into_iter()
            .map(|source| PublishError::Duplicate(source.module.clone(), source.module.resolve_id()))
            .inspect(|e| error!("{e}"))
            .collect();

        for result in results {
            match result {
                Ok(artifacts) => reports.extend(artifacts),
                Err(PublishError::Cancelled) => return Err(PublishError::Cancelled),
                Err(e) => {
                    error!("{e}");
                    failures.push(e);
                }
            }
        }

        let registry = ReportRegistry::new(out, reports);
        registry.save(&registry.dir().join(REGISTRY_FILE))?;

        info!(
            "Published {} reports {}",
            registry.reports().len(),
            as_overhead(s)
        );

        Ok(Publication { registry, failures })
    }

    fn publish_module(
        &self,
        build_dir: &Utf8Path,
        workspace: Option<&Utf8Path>,
        out: &Utf8Path,
        source: &ModuleSource,
    ) -> Result<Vec<ReportArtifact>, PublishError> {
        let module = &source.module;
        let mut resolver = DescriptorResolver::new(module.clone(), backup_path(build_dir, module))
            .settings(self.settings.clone())
            .parser(self.parser.clone());

        if let Some(root) = workspace {
            resolver = resolver
                .workspace(root)
                .source(LocalFile::new(root.join(&source.descriptor)).with_cancel(self.cancel.clone()));
        }

        let descriptor = resolver
            .resolve()
            .map_err(|e| PublishError::Sync(module.clone(), e))?;

        if self.cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }

        let configurations = expand_configurations(descriptor.as_deref(), &self.configurations);
        if configurations.is_empty() {
            info!(module = %module, "no configuration to report");
        }

        let resolve_id = module.resolve_id();
        let mut artifacts = Vec::with_capacity(configurations.len());

        for configuration in &configurations {
            if self.cancel.is_cancelled() {
                return Err(PublishError::Cancelled);
            }

            let job = RenderJob {
                module,
                descriptor: descriptor.as_deref(),
                configuration,
                resolve_id: &resolve_id,
                output_dir: out,
            };

            self.renderer
                .render(&job)
                .map_err(|e| PublishError::Render(module.clone(), configuration.clone(), e))?;

            let entry = job.entry();
            if !entry.is_file() {
                warn!(module = %module, configuration = %configuration, "renderer produced no report");
                continue;
            }

            artifacts.push(ReportArtifact {
                module: module.clone(),
                configuration: Some(configuration.clone()),
                path: entry,
            });
        }

        Ok(artifacts)
    }
}

/// A builder for [`Publisher`].
pub struct Config {
    report_dir: String,
    configurations: Vec<String>,
    settings: ResolverSettings,
    parser: Arc<dyn DescriptorParser>,
    renderer: Arc<dyn ReportRenderer>,
    cancel: Cancellation,
}

impl Config {
    fn new(renderer: Arc<dyn ReportRenderer>) -> Self {
        Self {
            report_dir: REPORT_DIR.to_string(),
            configurations: vec!["*".to_string()],
            settings: ResolverSettings::default(),
            parser: Arc::new(IvyXmlParser),
            renderer,
            cancel: Cancellation::new(),
        }
    }

    /// Requested configurations as a comma separated list of names and
    /// wildcards, `*` by default.
    pub fn configurations(mut self, list: &str) -> Self {
        self.configurations = requested_configurations(list);
        self
    }

    pub fn report_dir(mut self, name: impl Into<String>) -> Self {
        self.report_dir = name.into();
        self
    }

    pub fn settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn parser(mut self, parser: impl DescriptorParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    pub fn cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn finish(self) -> Publisher {
        Publisher {
            report_dir: self.report_dir,
            configurations: self.configurations,
            settings: self.settings,
            parser: self.parser,
            renderer: self.renderer,
            cancel: self.cancel,
        }
    }
}

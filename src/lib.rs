#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod descriptor;
mod error;
mod io;
#[cfg(feature = "logging")]
mod logging;
mod module;
mod publish;
mod registry;
mod render;
mod resolver;
mod router;
#[cfg(feature = "server")]
pub mod server;
mod settings;
mod sync;

pub use crate::descriptor::{Configuration, Descriptor, DescriptorParser, IvyXmlParser, Visibility};
pub use crate::error::*;
#[cfg(feature = "logging")]
pub use crate::logging::init_logging;
pub use crate::module::ModuleId;
pub use crate::publish::{Config, ModuleSource, Publication, Publisher};
pub use crate::registry::{
    PersistedState, REGISTRY_FILE, REPORT_DIR, ReportArtifact, ReportRegistry,
};
pub use crate::render::{REPORT_EXTENSION, RenderJob, ReportRenderer, SvgReport, report_file_name};
pub use crate::resolver::{
    DescriptorResolver, backup_path, expand_configurations, requested_configurations,
};
pub use crate::router::{ArtifactLookup, Lookup, ReportRouter, Route, SiblingFileLookup, confine};
pub use crate::settings::{ResolverSettings, Settings};
pub use crate::sync::{Cancellation, LocalFile, RemoteFile, sync_if_newer};

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::descriptor::Descriptor;
use crate::module::{ModuleId, sanitize};

/// Extension of the entry point of every report.
pub const REPORT_EXTENSION: &str = "html";

/// Name of a report file, `{resolve_id}-{configuration}.{ext}`.
pub fn report_file_name(resolve_id: &str, configuration: &str, ext: &str) -> String {
    format!("{}-{}.{ext}", sanitize(resolve_id), sanitize(configuration))
}

/// A single (module, configuration) pair to render.
#[derive(Debug, Clone, Copy)]
pub struct RenderJob<'a> {
    pub module: &'a ModuleId,
    /// Missing when the descriptor couldn't be resolved and the configuration
    /// comes straight from the request.
    pub descriptor: Option<&'a Descriptor>,
    pub configuration: &'a str,
    pub resolve_id: &'a str,
    pub output_dir: &'a Utf8Path,
}

impl RenderJob<'_> {
    /// Path of the output file with the given extension.
    pub fn file(&self, ext: &str) -> Utf8PathBuf {
        self.output_dir
            .join(report_file_name(self.resolve_id, self.configuration, ext))
    }

    /// Entry point of the report, the file recorded in the registry.
    pub fn entry(&self) -> Utf8PathBuf {
        self.file(REPORT_EXTENSION)
    }
}

/// Renders the report of one (module, configuration) pair into
/// [`RenderJob::output_dir`]. The renderer must at least produce
/// [`RenderJob::entry`].
pub trait ReportRenderer: Send + Sync {
    fn render(&self, job: &RenderJob<'_>) -> anyhow::Result<()>;
}

impl<F> ReportRenderer for F
where
    F: Fn(&RenderJob<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn render(&self, job: &RenderJob<'_>) -> anyhow::Result<()> {
        self(job)
    }
}

/// Renderer for diagrams drawn as SVG. The diagram lands next to an HTML
/// page which embeds it, so both share the same stem.
pub struct SvgReport<F> {
    draw: F,
}

impl<F> SvgReport<F>
where
    F: Fn(&RenderJob<'_>) -> anyhow::Result<String> + Send + Sync,
{
    pub fn new(draw: F) -> Self {
        Self { draw }
    }
}

impl<F> ReportRenderer for SvgReport<F>
where
    F: Fn(&RenderJob<'_>) -> anyhow::Result<String> + Send + Sync,
{
    fn render(&self, job: &RenderJob<'_>) -> anyhow::Result<()> {
        let svg = (self.draw)(job)?;
        let svg_path = job.file("svg");

        fs::write(&svg_path, svg)?;
        fs::write(job.entry(), wrapper_page(job, &svg_path))?;

        Ok(())
    }
}

fn wrapper_page(job: &RenderJob<'_>, svg: &Utf8Path) -> String {
    let title = escape(&format!("{} ({})", job.module, job.configuration));
    let data = escape(svg.file_name().unwrap_or_default());

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
</head>
<body>
<h1>{title}</h1>
<object data="{data}" type="image/svg+xml"></object>
</body>
</html>
"#
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_file_name() {
        assert_eq!(
            report_file_name("entropysoft-test", "compile", "html"),
            "entropysoft-test-compile.html"
        );
        assert_eq!(report_file_name("a", "../*", "svg"), "a-_.__.svg");
    }

    #[test]
    fn test_svg_report_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let module = ModuleId::new("entropysoft", "test");
        let job = RenderJob {
            module: &module,
            descriptor: None,
            configuration: "compile",
            resolve_id: "entropysoft-test",
            output_dir: &out,
        };

        let renderer = SvgReport::new(|job: &RenderJob<'_>| {
            Ok(format!("<svg><text>{}</text></svg>", job.configuration))
        });
        renderer.render(&job).unwrap();

        let html = fs::read_to_string(out.join("entropysoft-test-compile.html")).unwrap();
        assert!(html.contains(
            r#"<object data="entropysoft-test-compile.svg" type="image/svg+xml">"#
        ));
        assert!(html.contains("<title>entropysoft#test (compile)</title>"));
        assert_eq!(
            fs::read_to_string(out.join("entropysoft-test-compile.svg")).unwrap(),
            "<svg><text>compile</text></svg>"
        );
    }
}

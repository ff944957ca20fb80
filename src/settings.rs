use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SettingsError;

/// Where the resolver finds its settings, relative to the workspace root.
#[derive(Debug, Clone, Default)]
pub struct ResolverSettings {
    /// JSON settings file. Once configured it has to exist.
    pub settings_file: Option<Utf8PathBuf>,
    /// `key=value` property files, missing ones are skipped.
    pub property_files: Vec<Utf8PathBuf>,
}

impl ResolverSettings {
    pub fn settings_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.settings_file = Some(path.into());
        self
    }

    /// Adds property files from a comma separated list.
    pub fn property_files(mut self, list: &str) -> Self {
        self.property_files.extend(
            list.split(',')
                .map(str::trim)
                .filter(|file| !file.is_empty())
                .map(Utf8PathBuf::from),
        );
        self
    }

    /// Loads the settings against a workspace root. Property files are read
    /// first, properties from the settings file override them.
    pub fn load(&self, workspace: &Utf8Path) -> Result<Settings, SettingsError> {
        let settings_path = self.settings_file.as_ref().map(|file| workspace.join(file));

        if let Some(path) = &settings_path {
            if !path.exists() {
                return Err(SettingsError::Unavailable(path.clone()));
            }
        }

        let mut settings = Settings::default();

        for file in &self.property_files {
            let path = workspace.join(file);
            if !path.exists() {
                warn!(path = %path, "skipped property file");
                continue;
            }
            settings.properties.extend(parse_properties(&fs::read_to_string(&path)?));
        }

        match settings_path {
            Some(path) => {
                let text = fs::read_to_string(&path)?;
                let file: SettingsFile = serde_json::from_str(&text)
                    .map_err(|e| SettingsError::Malformed(path.clone(), e))?;

                settings.validate = file.validate;
                settings.properties.extend(file.properties);
                debug!(path = %path, "configured the resolver using custom settings");
            }
            None => debug!("configured the resolver using default settings"),
        }

        Ok(settings)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SettingsFile {
    validate: bool,
    properties: BTreeMap<String, String>,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            validate: true,
            properties: BTreeMap::new(),
        }
    }
}

/// Loaded resolver settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Whether descriptors are validated while parsing.
    pub validate: bool,
    pub properties: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            validate: true,
            properties: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Replaces `${name}` references with property values. Unknown
    /// references are left as they are.
    pub fn substitute(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let tail = &rest[start + 2..];

            match tail.find('}') {
                Some(end) => {
                    let name = &tail[..end];
                    match self.properties.get(name) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&rest[start..start + end + 3]),
                    }
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        out.push_str(rest);
        out
    }
}

fn parse_properties(text: &str) -> impl Iterator<Item = (String, String)> + '_ {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let (key, value) = line.split_at(split);
            Some((key.trim().to_string(), value[1..].trim().to_string()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, root)
    }

    #[test]
    fn test_defaults_without_files() {
        let (_dir, root) = workspace();
        let settings = ResolverSettings::default().load(&root).unwrap();
        assert!(settings.validate);
        assert!(settings.properties.is_empty());
    }

    #[test]
    fn test_missing_settings_file_is_unavailable() {
        let (_dir, root) = workspace();
        let err = ResolverSettings::default()
            .settings_file("ivyconf.json")
            .load(&root)
            .unwrap_err();
        assert!(matches!(err, SettingsError::Unavailable(_)));
    }

    #[test]
    fn test_settings_override_properties() {
        let (_dir, root) = workspace();
        fs::write(
            root.join("ivyconf.properties"),
            "# comment\norg = entropysoft\nrev: 1.0\n",
        )
        .unwrap();
        fs::write(
            root.join("ivyconf.json"),
            r#"{ "validate": false, "properties": { "rev": "2.0" } }"#,
        )
        .unwrap();

        let settings = ResolverSettings::default()
            .settings_file("ivyconf.json")
            .property_files("ivyconf.properties, missing.properties,")
            .load(&root)
            .unwrap();

        assert!(!settings.validate);
        assert_eq!(settings.properties["org"], "entropysoft");
        assert_eq!(settings.properties["rev"], "2.0");
    }

    #[test]
    fn test_malformed_settings() {
        let (_dir, root) = workspace();
        fs::write(root.join("ivyconf.json"), "{ nope").unwrap();
        let err = ResolverSettings::default()
            .settings_file("ivyconf.json")
            .load(&root)
            .unwrap_err();
        assert!(matches!(err, SettingsError::Malformed(..)));
    }

    #[test]
    fn test_substitute() {
        let mut settings = Settings::default();
        settings.properties.insert("org".into(), "acme".into());

        assert_eq!(settings.substitute("${org}-${org}"), "acme-acme");
        assert_eq!(settings.substitute("a ${missing} b"), "a ${missing} b");
        assert_eq!(settings.substitute("open ${org"), "open ${org");
    }
}

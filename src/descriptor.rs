//! Module descriptors, reduced to what reports need: the module identity and
//! its declared configurations.
//!
//! Parsing goes through the [`DescriptorParser`] seam. The bundled
//! [`IvyXmlParser`] understands the `<info>` and `<configurations>` parts of
//! an `ivy.xml` file and ignores everything else, dependencies included.

use std::collections::HashSet;
use std::fs;

use camino::Utf8Path;
use glob::Pattern;
use roxmltree::Document;

use crate::error::DescriptorError;
use crate::module::ModuleId;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub name: String,
    pub visibility: Visibility,
    pub extends: Vec<String>,
    pub description: Option<String>,
}

impl Configuration {
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            extends: Vec::new(),
            description: None,
        }
    }

    pub fn private(name: impl Into<String>) -> Self {
        Self {
            visibility: Visibility::Private,
            ..Self::public(name)
        }
    }
}

/// Parsed form of a descriptor snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub module: ModuleId,
    pub revision: Option<String>,
    pub configurations: Vec<Configuration>,
}

impl Descriptor {
    /// Declared configuration names, in declaration order.
    pub fn configuration_names(&self) -> Vec<&str> {
        self.configurations.iter().map(|c| c.name.as_str()).collect()
    }

    fn names_where(&self, visibility: Visibility) -> impl Iterator<Item = &str> {
        self.configurations
            .iter()
            .filter(move |c| c.visibility == visibility)
            .map(|c| c.name.as_str())
    }

    /// Replaces wildcards in `requested` with declared configuration names.
    ///
    /// - `*` stands for every declared configuration,
    /// - `*(public)` and `*(private)` for those of the given visibility,
    /// - `!name` removes `name` from the result,
    /// - other patterns with glob metacharacters match declared names,
    /// - anything else is kept verbatim, declared or not.
    ///
    /// The result keeps the order of first occurrence and has no duplicates.
    pub fn replace_wildcards<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut excluded = Vec::new();

        let mut push = |name: &str| {
            if seen.insert(name.to_string()) {
                result.push(name.to_string());
            }
        };

        for pattern in requested.iter().map(AsRef::as_ref) {
            match pattern {
                "*" => self.configuration_names().into_iter().for_each(&mut push),
                "*(public)" => self.names_where(Visibility::Public).for_each(&mut push),
                "*(private)" => self.names_where(Visibility::Private).for_each(&mut push),
                _ if pattern.starts_with('!') => excluded.push(Matcher::new(&pattern[1..])),
                _ => match Matcher::new(pattern) {
                    Matcher::Literal(name) => push(&name),
                    glob => self
                        .configuration_names()
                        .into_iter()
                        .filter(|name| glob.matches(name))
                        .for_each(&mut push),
                },
            }
        }

        result.retain(|name| !excluded.iter().any(|e| e.matches(name)));
        result
    }
}

enum Matcher {
    Literal(String),
    Glob(Pattern),
}

impl Matcher {
    fn new(pattern: &str) -> Self {
        if pattern.contains(['*', '?', '[']) {
            if let Ok(glob) = Pattern::new(pattern) {
                return Matcher::Glob(glob);
            }
        }

        Matcher::Literal(pattern.to_string())
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Matcher::Literal(literal) => literal == name,
            Matcher::Glob(glob) => glob.matches(name),
        }
    }
}

/// Turns a descriptor file into a [`Descriptor`].
pub trait DescriptorParser: Send + Sync {
    fn parse(&self, path: &Utf8Path, settings: &Settings) -> Result<Descriptor, DescriptorError>;
}

/// Parser for `ivy.xml` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct IvyXmlParser;

impl DescriptorParser for IvyXmlParser {
    fn parse(&self, path: &Utf8Path, settings: &Settings) -> Result<Descriptor, DescriptorError> {
        let text = settings.substitute(&fs::read_to_string(path)?);
        parse_ivy_xml(path, &text, settings.validate)
    }
}

fn parse_ivy_xml(path: &Utf8Path, text: &str, validate: bool) -> Result<Descriptor, DescriptorError> {
    let document = Document::parse(text).map_err(|e| DescriptorError::Parse {
        path: path.to_owned(),
        line: e.pos().row as usize,
        reason: e.to_string(),
    })?;

    read_descriptor(&document, validate).map_err(DescriptorError::Validation)
}

fn read_descriptor(document: &Document<'_>, validate: bool) -> Result<Descriptor, String> {
    if validate && !document.root_element().has_tag_name("ivy-module") {
        return Err("missing <ivy-module> root element".to_string());
    }

    let (organisation, module, revision) =
        match document.descendants().find(|node| node.has_tag_name("info")) {
            Some(info) => (
                info.attribute("organisation").unwrap_or_default(),
                info.attribute("module").unwrap_or_default(),
                info.attribute("revision").map(str::to_string),
            ),
            None if validate => return Err("missing <info> element".to_string()),
            None => ("", "", None),
        };

    let section = document
        .descendants()
        .find(|node| node.has_tag_name("configurations"));

    let Some(section) = section else {
        return Ok(Descriptor {
            module: ModuleId::new(organisation, module),
            revision,
            configurations: vec![Configuration::public("default")],
        });
    };

    let mut configurations: Vec<Configuration> = Vec::new();

    for conf in section.children().filter(|node| node.has_tag_name("conf")) {
        let name = conf.attribute("name").unwrap_or_default().trim();
        if name.is_empty() {
            if validate {
                return Err("configuration without a name".to_string());
            }
            continue;
        }

        if configurations.iter().any(|c| c.name == name) {
            if validate {
                return Err(format!("configuration '{name}' declared twice"));
            }
            continue;
        }

        let visibility = match conf.attribute("visibility") {
            None | Some("public") => Visibility::Public,
            Some("private") => Visibility::Private,
            Some(other) if validate => {
                return Err(format!("unknown visibility '{other}' for '{name}'"));
            }
            Some(_) => Visibility::Public,
        };

        configurations.push(Configuration {
            name: name.to_string(),
            visibility,
            extends: conf
                .attribute("extends")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|e| !e.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            description: conf.attribute("description").map(str::to_string),
        });
    }

    Ok(Descriptor {
        module: ModuleId::new(organisation, module),
        revision,
        configurations,
    })
}

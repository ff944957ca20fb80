use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Identity of a dependency module, an organisation and name pair.
///
/// Besides the pair itself the identity carries a file-system safe token,
/// computed once on creation. The token is what shows up in report URLs and
/// in the names of descriptor backups, so it never contains path separators.
/// Distinct identities always get distinct tokens.
///
/// The [resolve id](Self::resolve_id) follows the Ivy `org-module`
/// convention and is lossy: `a-b#c` and `a#b-c` share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleId {
    organisation: String,
    name: String,
    token: String,
}

impl ModuleId {
    pub fn new(organisation: impl Into<String>, name: impl Into<String>) -> Self {
        let organisation = organisation.into();
        let name = name.into();
        let token = format!("{}${}", escape(&organisation), escape(&name));

        Self {
            organisation,
            name,
            token,
        }
    }

    /// Identity known only by its file-system token, used for registries
    /// written before reports were tracked per module.
    pub(crate) fn from_token(token: impl Into<String>) -> Self {
        let token = token.into();

        Self {
            organisation: String::new(),
            name: token.clone(),
            token,
        }
    }

    pub fn organisation(&self) -> &str {
        &self.organisation
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File-system safe form of this identity.
    pub fn to_fs_name(&self) -> &str {
        &self.token
    }

    /// Default resolve id, the stem shared by all report files of the module.
    pub fn resolve_id(&self) -> String {
        if self.organisation.is_empty() {
            return sanitize(&self.name);
        }

        format!("{}-{}", sanitize(&self.organisation), sanitize(&self.name))
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.organisation.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}#{}", self.organisation, self.name)
        }
    }
}

/// Reversible form of `part` made of `[A-Za-z0-9.-]` and `_XX` escapes, one
/// per byte of any other character. A leading dot is escaped too.
fn escape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());

    for (i, c) in part.char_indices() {
        match c {
            '.' if i == 0 => out.push_str("_2E"),
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' => out.push(c),
            _ => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("_{byte:02X}"));
                }
            }
        }
    }

    out
}

/// Lossy file-name form of `part`, used for report files.
pub(crate) fn sanitize(part: &str) -> String {
    let mut out: String = part
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();

    // a leading dot would allow `..` and hidden files
    if out.starts_with('.') {
        out.replace_range(..1, "_");
    }

    out
}

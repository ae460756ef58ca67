//! Root-relative paths.
//!
//! Every file the build graph talks about is a [`BuildPath`]: a normalized,
//! forward-slash suffix anchored at either the source directory, the build
//! directory, or the filesystem root. Keeping the root symbolic is what lets
//! each backend decide how to spell the source directory (a literal path
//! for Make, `$srcdir` for Ninja, `$(SrcDir)` for MSBuild) while the graph
//! itself stays location independent.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The anchor a [`BuildPath`] is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Root {
    /// The project's source directory
    Source,
    /// The build directory the generated files live in
    Build,
    /// An absolute filesystem path
    Absolute,
}

impl Root {
    pub fn as_str(&self) -> &'static str {
        match self {
            Root::Source => "source",
            Root::Build => "build",
            Root::Absolute => "absolute",
        }
    }
}

/// Error constructing a [`BuildPath`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path `{0}` escapes its root directory")]
    EscapesRoot(String),

    #[error("path `{0}` is not absolute")]
    NotAbsolute(String),
}

/// A lexically normalized path anchored at a [`Root`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildPath {
    root: Root,
    suffix: String,
}

impl BuildPath {
    /// Create a path under `root`.
    ///
    /// Absolute inputs always produce a [`Root::Absolute`] path, whatever
    /// root was requested.
    pub fn new(path: &str, root: Root) -> Result<Self, PathError> {
        let (absolute, suffix) = normalize(path)?;
        if absolute {
            return Ok(BuildPath {
                root: Root::Absolute,
                suffix,
            });
        }
        if root == Root::Absolute {
            return Err(PathError::NotAbsolute(path.to_string()));
        }
        Ok(BuildPath { root, suffix })
    }

    /// A path relative to the source directory.
    pub fn source(path: &str) -> Result<Self, PathError> {
        Self::new(path, Root::Source)
    }

    /// A path relative to the build directory.
    pub fn build(path: &str) -> Result<Self, PathError> {
        Self::new(path, Root::Build)
    }

    pub fn root(&self) -> Root {
        self.root
    }

    /// The normalized path below the root. Empty for the root itself.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Whether this path names its root directory.
    pub fn is_root(&self) -> bool {
        self.suffix.is_empty() || (self.root == Root::Absolute && self.suffix.ends_with('/'))
    }

    /// Append a relative (or absolute) path.
    pub fn join(&self, path: &str) -> Result<Self, PathError> {
        let (absolute, _) = normalize(path)?;
        if absolute {
            return Self::new(path, Root::Absolute);
        }
        let combined = if self.suffix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.suffix, path)
        };
        let (_, suffix) = normalize_rooted(&combined, self.root == Root::Absolute)?;
        Ok(BuildPath {
            root: self.root,
            suffix,
        })
    }

    /// The containing directory, or `None` at the root.
    pub fn parent(&self) -> Option<BuildPath> {
        if self.is_root() {
            return None;
        }
        let parent = match self.suffix.rfind('/') {
            Some(0) => "/".to_string(),
            Some(i) if self.suffix[..i].ends_with(':') => self.suffix[..=i].to_string(),
            Some(i) => self.suffix[..i].to_string(),
            None => String::new(),
        };
        Some(BuildPath {
            root: self.root,
            suffix: parent,
        })
    }

    /// The final component.
    pub fn file_name(&self) -> &str {
        match self.suffix.rfind('/') {
            Some(i) => &self.suffix[i + 1..],
            None => &self.suffix,
        }
    }

    /// Extension of the final component, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(i) => Some(&name[i + 1..]),
        }
    }

    /// Replace (or add) the extension of the final component.
    pub fn with_extension(&self, ext: &str) -> BuildPath {
        let stem_len = match self.extension() {
            Some(old) => self.suffix.len() - old.len() - 1,
            None => self.suffix.len(),
        };
        let mut suffix = self.suffix[..stem_len].to_string();
        if !ext.is_empty() {
            suffix.push('.');
            suffix.push_str(ext);
        }
        BuildPath {
            root: self.root,
            suffix,
        }
    }

    /// Append `ext` verbatim to the final component (`a.o` + `.d`).
    pub fn add_extension(&self, ext: &str) -> BuildPath {
        BuildPath {
            root: self.root,
            suffix: format!("{}{}", self.suffix, ext),
        }
    }

    /// Resolve against concrete source and build directories.
    pub fn to_path(&self, src_dir: &Path, build_dir: &Path) -> PathBuf {
        let base = match self.root {
            Root::Source => src_dir,
            Root::Build => build_dir,
            Root::Absolute => return PathBuf::from(&self.suffix),
        };
        if self.suffix.is_empty() {
            base.to_path_buf()
        } else {
            base.join(&self.suffix)
        }
    }

    /// Whether the rendered path would contain a character no build file
    /// dialect can represent.
    pub fn has_newline(&self) -> bool {
        self.suffix.contains(['\n', '\r'])
    }
}

impl fmt::Display for BuildPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Root::Source if self.suffix.is_empty() => write!(f, "$(srcdir)"),
            Root::Source => write!(f, "$(srcdir)/{}", self.suffix),
            Root::Build if self.suffix.is_empty() => write!(f, "."),
            Root::Build | Root::Absolute => write!(f, "{}", self.suffix),
        }
    }
}

/// Split off an absolute prefix (`/` or a drive like `C:/`).
fn absolute_prefix(path: &str) -> Option<usize> {
    if path.starts_with('/') {
        return Some(1);
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
    {
        return Some(3);
    }
    None
}

fn normalize(path: &str) -> Result<(bool, String), PathError> {
    let path = path.replace('\\', "/");
    let absolute = absolute_prefix(&path).is_some();
    normalize_rooted(&path, absolute)
}

fn normalize_rooted(path: &str, absolute: bool) -> Result<(bool, String), PathError> {
    let (prefix, rest) = match absolute_prefix(path) {
        Some(n) => (&path[..n], &path[n..]),
        None => ("", path),
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() && !absolute {
                    return Err(PathError::EscapesRoot(path.to_string()));
                }
            }
            p => parts.push(p),
        }
    }

    Ok((absolute, format!("{}{}", prefix, parts.join("/"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_components() {
        let p = BuildPath::source("src/./hello/../hello//a.cpp").unwrap();
        assert_eq!(p.suffix(), "src/hello/a.cpp");
        assert_eq!(p.root(), Root::Source);

        let p = BuildPath::build("obj\\a.o").unwrap();
        assert_eq!(p.suffix(), "obj/a.o");
    }

    #[test]
    fn test_rejects_escaping_root() {
        assert_eq!(
            BuildPath::source("../outside.c"),
            Err(PathError::EscapesRoot("../outside.c".to_string()))
        );
        assert!(BuildPath::source("a/../../b").is_err());
    }

    #[test]
    fn test_absolute_paths() {
        let p = BuildPath::source("/usr/include/stdio.h").unwrap();
        assert_eq!(p.root(), Root::Absolute);
        assert_eq!(p.suffix(), "/usr/include/stdio.h");

        let p = BuildPath::source("/../etc").unwrap();
        assert_eq!(p.suffix(), "/etc");

        assert!(BuildPath::new("relative", Root::Absolute).is_err());
    }

    #[test]
    fn test_extensions() {
        let p = BuildPath::source("src/hello/a.cpp").unwrap();
        assert_eq!(p.extension(), Some("cpp"));
        assert_eq!(p.with_extension("o").suffix(), "src/hello/a.o");
        assert_eq!(p.add_extension(".d").suffix(), "src/hello/a.cpp.d");

        let hidden = BuildPath::source(".gitignore").unwrap();
        assert_eq!(hidden.extension(), None);
    }

    #[test]
    fn test_parent_and_join() {
        let p = BuildPath::build("obj/hello/a.o").unwrap();
        assert_eq!(p.parent().unwrap().suffix(), "obj/hello");
        assert_eq!(p.file_name(), "a.o");

        let top = BuildPath::build("a.o").unwrap();
        assert!(top.parent().unwrap().is_root());
        assert!(top.parent().unwrap().parent().is_none());

        let dir = BuildPath::source("src").unwrap();
        assert_eq!(dir.join("hello/a.cpp").unwrap().suffix(), "src/hello/a.cpp");
        assert!(dir.join("../../x").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            BuildPath::source("a.cpp").unwrap().to_string(),
            "$(srcdir)/a.cpp"
        );
        assert_eq!(BuildPath::build("").unwrap().to_string(), ".");
    }
}

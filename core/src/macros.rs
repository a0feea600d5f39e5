//! Path macros: logical directory names such as `$ROOT$` that storage specs
//! are written against.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, StorageError};

pub const ROOT_MACRO: &str = "ROOT";

/// A storage spec resolved against the current macro table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUnit {
    pub path: PathBuf,
    /// Macro the storage spec was addressed through, if any.
    pub macro_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PathMacros {
    macros: BTreeMap<String, PathBuf>,
}

impl PathMacros {
    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.macros.insert(name.into(), path.into());
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.macros.get(name).map(PathBuf::as_path)
    }

    pub fn root(&self) -> Option<&Path> {
        self.get(ROOT_MACRO)
    }

    /// Resolves `$NAME$/relative/path` or a plain path.
    ///
    /// Relative plain paths are taken relative to `ROOT` and report it as
    /// their macro.
    pub fn resolve(&self, spec: &str) -> Result<ResolvedUnit> {
        let spec_trimmed = spec.trim();
        if let Some(stripped) = spec_trimmed.strip_prefix('$') {
            let Some(end) = stripped.find('$') else {
                return Err(StorageError::UnresolvedMacro {
                    spec: spec.to_string(),
                    macro_name: stripped.to_string(),
                });
            };
            let name = &stripped[..end];
            let rest = stripped[end + 1..].trim_start_matches(['/', '\\']);
            let base = self.get(name).ok_or_else(|| StorageError::UnresolvedMacro {
                spec: spec.to_string(),
                macro_name: name.to_string(),
            })?;
            if rest.is_empty() {
                return Err(StorageError::misuse(format!(
                    "storage spec '{spec}' names a directory, not a file"
                )));
            }
            return Ok(ResolvedUnit {
                path: base.join(rest),
                macro_name: Some(name.to_string()),
            });
        }

        if spec_trimmed.is_empty() {
            return Err(StorageError::misuse("empty storage spec"));
        }

        let path = Path::new(spec_trimmed);
        if path.is_absolute() {
            return Ok(ResolvedUnit {
                path: path.to_path_buf(),
                macro_name: None,
            });
        }

        let root = self.root().ok_or_else(|| StorageError::UnresolvedMacro {
            spec: spec.to_string(),
            macro_name: ROOT_MACRO.to_string(),
        })?;
        Ok(ResolvedUnit {
            path: root.join(path),
            macro_name: Some(ROOT_MACRO.to_string()),
        })
    }

    /// Maps an absolute path back to its `$NAME$/...` form using the macro
    /// with the longest matching directory. Paths outside every macro are
    /// returned as-is.
    pub fn collapse(&self, path: &Path) -> String {
        let best = self
            .macros
            .iter()
            .filter_map(|(name, base)| {
                path.strip_prefix(base)
                    .ok()
                    .map(|rel| (name, base.components().count(), rel))
            })
            .max_by_key(|(_, depth, _)| *depth);

        match best {
            Some((name, _, rel)) => {
                let parts: Vec<String> = rel
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                        _ => None,
                    })
                    .collect();
                format!("${}$/{}", name, parts.join("/"))
            }
            None => path.to_string_lossy().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn macros() -> PathMacros {
        let mut m = PathMacros::default();
        m.insert(ROOT_MACRO, "/srv/app");
        m.insert("CACHE", "/srv/app/cache");
        m
    }

    #[test]
    fn test_resolve_macro_spec() {
        let resolved = macros().resolve("$CACHE$/index.json").unwrap();
        assert_eq!(resolved.path, PathBuf::from("/srv/app/cache/index.json"));
        assert_eq!(resolved.macro_name.as_deref(), Some("CACHE"));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let m = macros();
        let rel = m.resolve("ui/layout.toml").unwrap();
        assert_eq!(rel.path, PathBuf::from("/srv/app/ui/layout.toml"));
        assert_eq!(rel.macro_name.as_deref(), Some(ROOT_MACRO));

        let abs = m.resolve("/etc/app.json").unwrap();
        assert_eq!(abs.path, PathBuf::from("/etc/app.json"));
        assert_eq!(abs.macro_name, None);
    }

    #[test]
    fn test_unknown_macro_fails() {
        let err = macros().resolve("$HOME$/x.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(matches!(
            err,
            StorageError::UnresolvedMacro { ref macro_name, .. } if macro_name == "HOME"
        ));

        assert!(macros().resolve("$ROOT").is_err());
        assert_eq!(
            macros().resolve("$ROOT$/").unwrap_err().kind(),
            ErrorKind::ProtocolMisuse
        );
    }

    #[test]
    fn test_collapse_prefers_longest_macro() {
        let m = macros();
        assert_eq!(
            m.collapse(Path::new("/srv/app/cache/a/b.json")),
            "$CACHE$/a/b.json"
        );
        assert_eq!(m.collapse(Path::new("/srv/app/state.json")), "$ROOT$/state.json");
        assert_eq!(m.collapse(Path::new("/opt/other.json")), "/opt/other.json");
    }
}

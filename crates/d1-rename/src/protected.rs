//! System-reserved database names.

/// Decides whether a database name is off limits.
pub trait ProtectedNameRegistry: Send + Sync {
    fn is_protected(&self, name: &str) -> bool;
}

/// Registry built from a fixed list of names.
///
/// Names compare case-insensitively. An entry ending in `*` protects every
/// name starting with the rest of the entry.
#[derive(Debug, Clone, Default)]
pub struct StaticProtectedNames {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl StaticProtectedNames {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim().to_lowercase();
            if pattern.is_empty() {
                continue;
            }
            match pattern.strip_suffix('*') {
                Some(prefix) => registry.prefixes.push(prefix.to_string()),
                None => registry.exact.push(pattern),
            }
        }
        registry
    }
}

impl ProtectedNameRegistry for StaticProtectedNames {
    fn is_protected(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.exact.iter().any(|n| *n == name)
            || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

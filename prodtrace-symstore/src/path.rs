//! Parsing of symbol search paths.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The environment variable holding the default symbol path.
pub const SYMBOL_PATH_ENV: &str = "_NT_SYMBOL_PATH";

/// One location in a [`SymbolPath`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SymbolPathElement {
    /// A plain directory containing debug files directly or in symbol server layout.
    Directory(PathBuf),
    /// A downstream cache (`cache*<dir>`).
    ///
    /// Stores further right without an explicit cache download into this directory.
    Cache(PathBuf),
    /// A symbol store (`srv*[cache]*<target>`).
    ///
    /// The target is either a local directory in symbol server layout or an HTTP(S) URL.
    Store {
        /// The explicit downstream cache, if any.
        cache: Option<PathBuf>,
        /// The store location.
        target: String,
    },
}

impl SymbolPathElement {
    /// Parses a single element.
    ///
    /// Returns `None` for elements that do not name any location.
    pub fn parse(element: &str) -> Option<Self> {
        let element = element.trim();
        if element.is_empty() {
            return None;
        }

        let mut parts = element.split('*');
        let keyword = parts.next().unwrap_or_default();

        if keyword.eq_ignore_ascii_case("srv") {
            Self::parse_store(parts.collect())
        } else if keyword.eq_ignore_ascii_case("symsrv") {
            // The second part names the symbol server library, which does not affect the layout.
            parts.next()?;
            Self::parse_store(parts.collect())
        } else if keyword.eq_ignore_ascii_case("cache") {
            let dir = parts.next().map(str::trim).unwrap_or_default();
            if dir.is_empty() {
                None
            } else {
                Some(SymbolPathElement::Cache(PathBuf::from(dir)))
            }
        } else {
            Some(SymbolPathElement::Directory(PathBuf::from(element)))
        }
    }

    fn parse_store(parts: Vec<&str>) -> Option<Self> {
        let (target, caches) = parts.split_last()?;
        let target = target.trim();
        if target.is_empty() {
            return None;
        }

        // Chained caches are collapsed into the nearest one.
        let cache = caches
            .iter()
            .map(|c| c.trim())
            .find(|c| !c.is_empty())
            .map(PathBuf::from);

        Some(SymbolPathElement::Store {
            cache,
            target: target.to_owned(),
        })
    }

    /// Whether this element refers to a remote symbol server.
    pub fn is_remote(&self) -> bool {
        match self {
            SymbolPathElement::Store { target, .. } => is_remote_target(target),
            _ => false,
        }
    }

    /// The local directory searched for this element, if it is not remote.
    pub fn local_dir(&self) -> Option<&Path> {
        match self {
            SymbolPathElement::Directory(dir) | SymbolPathElement::Cache(dir) => Some(dir),
            SymbolPathElement::Store { target, .. } if !is_remote_target(target) => {
                Some(Path::new(target))
            }
            SymbolPathElement::Store { .. } => None,
        }
    }

    /// The cache explicitly associated with this element.
    pub fn cache(&self) -> Option<&Path> {
        match self {
            SymbolPathElement::Store { cache, .. } => cache.as_deref(),
            _ => None,
        }
    }
}

fn is_remote_target(target: &str) -> bool {
    target
        .get(..4)
        .map_or(false, |scheme| scheme.eq_ignore_ascii_case("http"))
}

impl fmt::Display for SymbolPathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolPathElement::Directory(dir) => write!(f, "{}", dir.display()),
            SymbolPathElement::Cache(dir) => write!(f, "cache*{}", dir.display()),
            SymbolPathElement::Store {
                cache: Some(cache),
                target,
            } => write!(f, "srv*{}*{target}", cache.display()),
            SymbolPathElement::Store {
                cache: None,
                target,
            } => write!(f, "srv*{target}"),
        }
    }
}

/// An ordered list of symbol search locations.
///
/// Earlier elements take priority. The textual form separates elements with `;`:
///
/// ```
/// use prodtrace_symstore::{SymbolPath, SymbolPathElement};
///
/// let path = SymbolPath::parse("symbols;srv*cache*https://msdl.microsoft.com/download/symbols");
/// assert_eq!(path.elements().len(), 2);
/// assert!(path.elements()[1].is_remote());
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SymbolPath {
    elements: Vec<SymbolPathElement>,
}

impl SymbolPath {
    /// Creates an empty symbol path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `;`-separated symbol path. Empty elements are skipped.
    pub fn parse(path: &str) -> Self {
        let elements = path.split(';').filter_map(SymbolPathElement::parse).collect();
        SymbolPath { elements }
    }

    /// Reads the symbol path from the `_NT_SYMBOL_PATH` environment variable.
    ///
    /// Returns an empty path if the variable is not set.
    pub fn from_env() -> Self {
        match env::var(SYMBOL_PATH_ENV) {
            Ok(path) => Self::parse(&path),
            Err(_) => Self::new(),
        }
    }

    /// Appends a single element, parsed from its textual form.
    pub fn add(&mut self, element: &str) {
        self.elements.extend(SymbolPathElement::parse(element));
    }

    /// Appends all elements of another path.
    pub fn extend(&mut self, other: SymbolPath) {
        self.elements.extend(other.elements);
    }

    /// The elements of this path in priority order.
    pub fn elements(&self) -> &[SymbolPathElement] {
        &self.elements
    }

    /// Returns `true` if the path contains no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl FromStr for SymbolPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for SymbolPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

impl FromIterator<SymbolPathElement> for SymbolPath {
    fn from_iter<I: IntoIterator<Item = SymbolPathElement>>(iter: I) -> Self {
        SymbolPath {
            elements: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn test_parse_elements() {
        let path = SymbolPath::parse(
            r"C:\symbols; ;srv*C:\cache*https://symbols.example.com;cache*D:\cache;srv*\\share\store",
        );

        assert_eq!(
            path.elements(),
            &[
                SymbolPathElement::Directory(PathBuf::from(r"C:\symbols")),
                SymbolPathElement::Store {
                    cache: Some(PathBuf::from(r"C:\cache")),
                    target: "https://symbols.example.com".into(),
                },
                SymbolPathElement::Cache(PathBuf::from(r"D:\cache")),
                SymbolPathElement::Store {
                    cache: None,
                    target: r"\\share\store".into(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_symsrv() {
        let element = SymbolPathElement::parse("SYMSRV*symsrv.dll*/tmp/cache*HTTP://example.com");
        assert_eq!(
            element,
            Some(SymbolPathElement::Store {
                cache: Some(PathBuf::from("/tmp/cache")),
                target: "HTTP://example.com".into(),
            })
        );
        assert!(element.unwrap().is_remote());
    }

    #[test]
    fn test_parse_empty_cache() {
        assert_eq!(
            SymbolPathElement::parse("srv**https://example.com"),
            Some(SymbolPathElement::Store {
                cache: None,
                target: "https://example.com".into(),
            })
        );
        assert_eq!(SymbolPathElement::parse("cache*"), None);
        assert_eq!(SymbolPathElement::parse("srv*"), None);
    }

    #[test]
    fn test_local_dir() {
        let store = SymbolPathElement::parse("srv*cache*store").unwrap();
        assert_eq!(store.local_dir(), Some(Path::new("store")));
        assert_eq!(store.cache(), Some(Path::new("cache")));
        assert!(!store.is_remote());

        let remote = SymbolPathElement::parse("srv*https://example.com").unwrap();
        assert_eq!(remote.local_dir(), None);
    }

    #[test]
    fn test_display_roundtrip() {
        let text = "symbols;srv*cache*https://example.com;cache*downstream;srv*store";
        let path = SymbolPath::parse(text);
        assert_eq!(path.to_string(), text);
        assert_eq!(SymbolPath::parse(&path.to_string()), path);
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use prodtrace_common::{DebugId, SymbolIndex};
use prodtrace_debuginfo::peek_identity;

use crate::archive;
use crate::error::{SymbolError, SymbolErrorKind};
use crate::path::{SymbolPath, SymbolPathElement};

/// A request for the debug file of a single module.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DebugFileRequest {
    /// File name of the debug file, such as `MyAssembly.pdb`.
    pub name: String,
    /// The identity the debug file must carry.
    pub debug_id: DebugId,
    /// Short name of the assembly, used to name symbol packages.
    pub short_name: String,
    /// Assembly version, used to name symbol packages.
    pub version: Option<String>,
}

impl DebugFileRequest {
    /// Creates a request without version information.
    pub fn new(name: impl Into<String>, debug_id: DebugId, short_name: impl Into<String>) -> Self {
        DebugFileRequest {
            name: name.into(),
            debug_id,
            short_name: short_name.into(),
            version: None,
        }
    }

    /// Sets the assembly version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// The symbol store indexes to probe, native layout first.
    ///
    /// Layouts written with a decimal age are probed last, if the age has a different decimal
    /// spelling.
    fn indexes(&self) -> Vec<SymbolIndex> {
        let mut indexes = vec![
            SymbolIndex::native(&self.debug_id),
            SymbolIndex::portable(&self.debug_id),
        ];

        let decimal = SymbolIndex::native_decimal_age(&self.debug_id);
        if decimal != indexes[0] {
            indexes.push(decimal);
        }

        indexes
    }

    /// The path `<name>/<index>/<name>` relative to a store root.
    fn layout(&self, index: &SymbolIndex) -> PathBuf {
        Path::new(&self.name).join(index.as_str()).join(&self.name)
    }
}

/// Configuration of a [`SymbolStore`].
#[derive(Clone, Debug)]
pub struct SymbolStoreConfig {
    /// Locations to search, in priority order.
    pub path: SymbolPath,
    /// Cache for remote stores that have neither an explicit nor a preceding `cache*` element.
    pub default_cache: PathBuf,
    /// Timeout for each request to a remote store.
    pub timeout: Duration,
}

impl Default for SymbolStoreConfig {
    fn default() -> Self {
        SymbolStoreConfig {
            path: SymbolPath::new(),
            default_cache: env::temp_dir().join("prodtrace-symbols"),
            timeout: Duration::from_secs(30),
        }
    }
}

impl SymbolStoreConfig {
    /// Creates a configuration searching the given path.
    pub fn new(path: SymbolPath) -> Self {
        SymbolStoreConfig {
            path,
            ..Default::default()
        }
    }
}

/// Locates verified debug files.
///
/// Lookups run in two tiers. The first tier visits every element of the symbol path in order and
/// probes the debug file directly in directories, and in symbol server layout in caches and
/// stores, downloading from remote stores where needed. If nothing matches, the second tier
/// revisits all local elements and falls back to symbol packages of the requested assembly
/// version, which are extracted into the symbol server layout.
///
/// Every candidate is opened and its embedded identity compared with the request before it is
/// returned. The store does not change after construction and can be shared across threads.
#[derive(Debug)]
pub struct SymbolStore {
    config: SymbolStoreConfig,
    #[cfg(feature = "http")]
    client: once_cell::sync::OnceCell<reqwest::blocking::Client>,
}

impl SymbolStore {
    /// Creates a new symbol store.
    pub fn new(config: SymbolStoreConfig) -> Self {
        SymbolStore {
            config,
            #[cfg(feature = "http")]
            client: once_cell::sync::OnceCell::new(),
        }
    }

    /// Creates a symbol store searching `_NT_SYMBOL_PATH` and the current directory.
    pub fn from_env() -> Self {
        let mut path = SymbolPath::from_env();
        path.add(".");
        Self::new(SymbolStoreConfig::new(path))
    }

    /// The configuration of this store.
    pub fn config(&self) -> &SymbolStoreConfig {
        &self.config
    }

    /// Finds the debug file matching `request`.
    ///
    /// Returns `Ok(None)` if no location holds a matching file. Errors are only returned for
    /// symbol packages that are unreadable or contain a mismatching debug file.
    #[tracing::instrument(
        level = "debug",
        name = "SymbolStore::find",
        skip_all,
        fields(name = %request.name, debug_id = %request.debug_id)
    )]
    pub fn find(&self, request: &DebugFileRequest) -> Result<Option<PathBuf>, SymbolError> {
        if let Some(path) = self.find_in_path(request) {
            return Ok(Some(path));
        }

        self.find_in_packages(request)
    }

    /// Opens the file at `path` and checks its identity against the request.
    fn verify(&self, path: &Path, request: &DebugFileRequest) -> bool {
        if !path.is_file() {
            return false;
        }

        match peek_identity(path) {
            Ok(identity) if identity.matches(&request.debug_id) => {
                tracing::debug!(path = %path.display(), "found debug file");
                true
            }
            Ok(identity) => {
                tracing::debug!(
                    path = %path.display(),
                    found = %identity.debug_id,
                    "rejecting debug file with mismatching identity"
                );
                false
            }
            Err(error) => {
                tracing::debug!(path = %path.display(), %error, "rejecting unreadable debug file");
                false
            }
        }
    }

    /// The downstream cache of the element at `position`.
    fn cache_for(&self, position: usize) -> &Path {
        let elements = self.config.path.elements();
        if let Some(cache) = elements[position].cache() {
            return cache;
        }

        elements[..position]
            .iter()
            .rev()
            .find_map(|element| match element {
                SymbolPathElement::Cache(dir) => Some(dir.as_path()),
                _ => None,
            })
            .unwrap_or(self.config.default_cache.as_path())
    }

    fn find_in_path(&self, request: &DebugFileRequest) -> Option<PathBuf> {
        let indexes = request.indexes();

        for (position, element) in self.config.path.elements().iter().enumerate() {
            tracing::trace!(%element, "searching symbol path element");

            match element {
                SymbolPathElement::Directory(dir) => {
                    let direct = dir.join(&request.name);
                    if self.verify(&direct, request) {
                        return Some(direct);
                    }
                    if let Some(path) = self.find_layout(dir, request, &indexes) {
                        return Some(path);
                    }
                }
                SymbolPathElement::Cache(dir) => {
                    if let Some(path) = self.find_layout(dir, request, &indexes) {
                        return Some(path);
                    }
                }
                SymbolPathElement::Store { target, .. } => {
                    let cache = self.cache_for(position);
                    if let Some(path) = self.find_layout(cache, request, &indexes) {
                        return Some(path);
                    }

                    if element.is_remote() {
                        if let Some(path) = self.find_remote(target, cache, request, &indexes) {
                            return Some(path);
                        }
                    } else if let Some(path) = self.find_layout(Path::new(target), request, &indexes)
                    {
                        return Some(path);
                    }
                }
            }
        }

        None
    }

    fn find_layout(
        &self,
        root: &Path,
        request: &DebugFileRequest,
        indexes: &[SymbolIndex],
    ) -> Option<PathBuf> {
        indexes
            .iter()
            .map(|index| root.join(request.layout(index)))
            .find(|path| self.verify(path, request))
    }

    #[cfg(feature = "http")]
    fn find_remote(
        &self,
        url: &str,
        cache: &Path,
        request: &DebugFileRequest,
        indexes: &[SymbolIndex],
    ) -> Option<PathBuf> {
        let client = match self
            .client
            .get_or_try_init(|| crate::download::build_client(self.config.timeout))
        {
            Ok(client) => client,
            Err(error) => {
                tracing::warn!(%error, "failed to create http client");
                return None;
            }
        };

        for index in indexes {
            let layout = request.layout(index);
            let relative = layout.to_string_lossy().replace('\\', "/");
            let dest = cache.join(&layout);

            match crate::download::download(client, url, &relative, &dest) {
                Ok(true) if self.verify(&dest, request) => return Some(dest),
                Ok(true) => {
                    fs::remove_file(&dest).ok();
                }
                Ok(false) => (),
                Err(error) if error.kind() == SymbolErrorKind::Download => {
                    tracing::warn!(url, %error, "symbol server request failed");
                    // An unreachable server will not answer for the other index either.
                    return None;
                }
                Err(error) => {
                    tracing::warn!(
                        dest = %dest.display(),
                        %error,
                        "failed to store downloaded file"
                    );
                }
            }
        }

        None
    }

    #[cfg(not(feature = "http"))]
    fn find_remote(
        &self,
        url: &str,
        _cache: &Path,
        _request: &DebugFileRequest,
        _indexes: &[SymbolIndex],
    ) -> Option<PathBuf> {
        tracing::debug!(url, "skipping remote symbol store without http support");
        None
    }

    fn find_in_packages(&self, request: &DebugFileRequest) -> Result<Option<PathBuf>, SymbolError> {
        let indexes = request.indexes();

        for element in self.config.path.elements() {
            let dir = match element.local_dir() {
                Some(dir) => dir,
                None => continue,
            };
            let cache = element.cache();

            if let Some(path) = self.find_layout(dir, request, &indexes) {
                return Ok(Some(path));
            }
            if let Some(path) = cache.and_then(|cache| self.find_layout(cache, request, &indexes)) {
                return Ok(Some(path));
            }

            let version = match request.version {
                Some(ref version) => version,
                None => continue,
            };
            let package = match archive::find_package(dir, &request.short_name, version) {
                Some(package) => package,
                None => continue,
            };

            let dest = cache.unwrap_or(dir).join(request.layout(&indexes[0]));
            if !archive::extract_entry(&package, &request.name, &dest)? {
                tracing::debug!(package = %package.display(), "symbol package has no debug file");
                continue;
            }

            if !self.verify(&dest, request) {
                fs::remove_file(&dest).ok();
                return Err(SymbolError::new(
                    SymbolErrorKind::ArchiveMismatch,
                    format!(
                        "{} in {} does not match {}",
                        request.name,
                        package.display(),
                        request.debug_id
                    ),
                ));
            }

            return Ok(Some(dest));
        }

        Ok(None)
    }
}

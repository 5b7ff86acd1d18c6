//! The module table built from the report footer.

use std::fmt;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use prodtrace_common::{DebugId, Uuid};

static MODULE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)MODULE: (?P<name>\S+)\s+=>\s+(?P<identity>[^;]+)(?P<attributes>(?:;\s+[a-z]+:[^;]+)+)",
    )
    .unwrap()
});

static ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i);\s+(?P<key>[a-z]+):(?P<value>[^;]+)").unwrap());

static VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"Version=(?P<version>[0-9.]+)").unwrap());

/// Attribute holding the GUID of the debug file.
const ATTR_GUID: &str = "G";
/// Attribute holding the age of the debug file.
const ATTR_AGE: &str = "A";
/// Attribute overriding the debug file name.
const ATTR_FILE: &str = "F";

/// A module described by a `MODULE:` footer line.
///
/// ```
/// use prodtrace_report::ModuleInfo;
///
/// let module = ModuleInfo::parse(
///     "MODULE: Library => Library, Version=2.3.0.0; G:c7f5b1a2-4b2e-4f1d-9a6e-3d2c1b0a9f8e; A:1",
/// )
/// .unwrap();
///
/// assert_eq!(module.short_name(), "Library");
/// assert_eq!(module.version(), Some("2.3.0.0"));
/// assert_eq!(module.debug_file_name(), "Library.pdb");
/// assert!(module.debug_id().is_some());
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleInfo {
    name: String,
    identity: String,
    short_name: String,
    version: Option<String>,
    attributes: IndexMap<String, String>,
    debug_id: Option<DebugId>,
    debug_file_name: String,
}

impl ModuleInfo {
    /// Parses a footer line, returning `None` if it is not a module line.
    pub fn parse(line: &str) -> Option<Self> {
        let captures = MODULE_LINE.captures(line)?;

        let name = captures["name"].to_owned();
        let identity = captures["identity"].trim().to_owned();

        let short_name = match identity.split_once(',') {
            Some((short, _)) => short.trim().to_owned(),
            None => identity.clone(),
        };

        let version = VERSION
            .captures(&identity)
            .map(|c| c["version"].to_owned());

        // Keys are case-insensitive; later duplicates overwrite earlier values.
        let mut attributes = IndexMap::new();
        for attribute in ATTRIBUTE.captures_iter(&captures["attributes"]) {
            attributes.insert(
                attribute["key"].to_ascii_uppercase(),
                attribute["value"].to_owned(),
            );
        }

        let debug_id = parse_debug_id(
            attributes.get(ATTR_GUID).map(String::as_str),
            attributes.get(ATTR_AGE).map(String::as_str),
        );

        let debug_file_name = match attributes.get(ATTR_FILE).map(|f| f.trim()) {
            Some(file) if !file.is_empty() => file.to_owned(),
            _ => format!("{short_name}.pdb"),
        };

        Some(ModuleInfo {
            name,
            identity,
            short_name,
            version,
            attributes,
            debug_id,
            debug_file_name,
        })
    }

    /// The display name under which frames reference this module.
    ///
    /// For modules that collided with an earlier module of the same name, this is the
    /// disambiguated `Name#N`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fully qualified assembly name.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The assembly name without version, culture and key.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// The assembly version, if the identity contains one.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns the raw value of an attribute. Keys are case-insensitive.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(&key.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Iterates all attributes in footer order, with uppercase keys.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// The identity of the module's debug file.
    ///
    /// This is only set if both the `G` and `A` attributes are present and valid.
    pub fn debug_id(&self) -> Option<DebugId> {
        self.debug_id
    }

    /// The file name of the module's debug file.
    pub fn debug_file_name(&self) -> &str {
        &self.debug_file_name
    }
}

fn parse_debug_id(guid: Option<&str>, age: Option<&str>) -> Option<DebugId> {
    let guid = Uuid::parse_str(guid?.trim()).ok()?;
    let age = age?.trim().parse::<u32>().ok()?;
    Some(DebugId::from_parts(guid, age))
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.name, self.identity)
    }
}

/// Modules of a report, by display name.
///
/// Names are looked up case-insensitively and iterate in footer order.
#[derive(Clone, Debug, Default)]
pub struct ModuleTable {
    modules: IndexMap<String, ModuleInfo>,
}

impl ModuleTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module and returns the name it was registered under.
    ///
    /// A module with the same name and identity as an existing one replaces it. If the name is
    /// taken by a different identity, the module is registered as `Name#N` with the smallest
    /// free `N` starting at `2`.
    pub fn insert(&mut self, mut module: ModuleInfo) -> &str {
        let base = module.name.clone();
        let mut suffix = 1;

        loop {
            let key = module.name.to_lowercase();
            let available = match self.modules.get(&key) {
                Some(existing) => existing.identity == module.identity,
                None => true,
            };

            if available {
                if module.name != base {
                    tracing::debug!(
                        name = %base,
                        registered = %module.name,
                        "disambiguated colliding module name"
                    );
                }

                let (index, _) = self.modules.insert_full(key, module);
                return &self.modules[index].name;
            }

            suffix += 1;
            module.name = format!("{base}#{suffix}");
        }
    }

    /// Looks up a module by display name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&ModuleInfo> {
        self.modules.get(&name.to_lowercase())
    }

    /// The number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if no module has been registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Iterates modules in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.values()
    }
}

impl Extend<ModuleInfo> for ModuleTable {
    fn extend<I: IntoIterator<Item = ModuleInfo>>(&mut self, iter: I) {
        for module in iter {
            self.insert(module);
        }
    }
}

impl FromIterator<ModuleInfo> for ModuleTable {
    fn from_iter<I: IntoIterator<Item = ModuleInfo>>(iter: I) -> Self {
        let mut table = ModuleTable::new();
        table.extend(iter);
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    fn module(line: &str) -> ModuleInfo {
        ModuleInfo::parse(line).unwrap()
    }

    #[test]
    fn test_parse_module() {
        let module = module(
            "MODULE: App => App, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null; \
             G:{0f8fad5b-d9cb-469f-a165-70867728950e}; A: 1 ; F:App.Desktop.pdb",
        );

        assert_eq!(module.name(), "App");
        assert_eq!(
            module.identity(),
            "App, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"
        );
        assert_eq!(module.short_name(), "App");
        assert_eq!(module.version(), Some("1.0.0.0"));
        assert_eq!(module.debug_file_name(), "App.Desktop.pdb");
        assert_eq!(
            module.debug_id(),
            Some("0f8fad5b-d9cb-469f-a165-70867728950e-1".parse().unwrap())
        );
        assert_eq!(module.attribute("f"), Some("App.Desktop.pdb"));
        assert_eq!(
            module.attributes().map(|(k, _)| k).collect::<Vec<_>>(),
            ["G", "A", "F"]
        );
    }

    #[test]
    fn test_parse_not_a_module() {
        assert_eq!(ModuleInfo::parse("THREAD: 1 => main"), None);
        assert_eq!(ModuleInfo::parse("MODULE: App => App"), None);
        assert_eq!(ModuleInfo::parse("MODULE: App"), None);
    }

    #[test]
    fn test_incomplete_debug_id() {
        let no_age = module("MODULE: A => A; G:11111111-1111-1111-1111-111111111111");
        assert_eq!(no_age.debug_id(), None);

        let bad_guid = module("MODULE: A => A; G:not-a-guid; A:1");
        assert_eq!(bad_guid.debug_id(), None);

        let negative_age = module("MODULE: A => A; G:11111111111111111111111111111111; A:-1");
        assert_eq!(negative_age.debug_id(), None);

        let simple = module("MODULE: A => A; g:11111111111111111111111111111111; a:2");
        assert_eq!(
            simple.debug_id(),
            Some("11111111-1111-1111-1111-111111111111-2".parse().unwrap())
        );
    }

    #[test]
    fn test_duplicate_attributes() {
        let module = module("MODULE: A => A, Version=1.2; A:1; a:3; G:11111111111111111111111111111111");
        assert_eq!(module.attribute("A"), Some("3"));
        assert_eq!(module.version(), Some("1.2"));
        assert_eq!(module.short_name(), "A");
    }

    #[test]
    fn test_collision() {
        let mut table = ModuleTable::new();
        assert_eq!(table.insert(module("MODULE: Lib => Lib, Version=1.0; A:1")), "Lib");
        assert_eq!(table.insert(module("MODULE: Lib => Lib, Version=2.0; A:1")), "Lib#2");
        assert_eq!(table.insert(module("MODULE: lib => Lib, Version=3.0; A:1")), "lib#3");

        assert_eq!(table.len(), 3);
        assert_eq!(table.get("LIB").unwrap().version(), Some("1.0"));
        assert_eq!(table.get("Lib#2").unwrap().version(), Some("2.0"));
        assert_eq!(table.get("Lib#3").unwrap().version(), Some("3.0"));
    }

    #[test]
    fn test_same_identity_last_wins() {
        let mut table = ModuleTable::new();
        table.insert(module("MODULE: Lib => Lib, Version=1.0; A:1"));
        table.insert(module("MODULE: Lib => Lib, Version=2.0; A:1"));
        table.insert(module("MODULE: Lib => Lib, Version=2.0; A:2"));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("Lib#2").unwrap().attribute("A"), Some("2"));
        assert_eq!(
            table.iter().map(ModuleInfo::name).collect::<Vec<_>>(),
            ["Lib", "Lib#2"]
        );
    }
}

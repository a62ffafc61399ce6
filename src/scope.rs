use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::glob::{Glob, compile_glob, contains_wildcard};

/// Suffix appended when turning a class name into a classfile path.
pub const CLASSFILE_SUFFIX: &str = ".class";

/// Contract violations raised while building or querying a scope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("cannot use a glob wildcard here: {0}")]
    WildcardNotAllowed(String),
    #[error("can only find prefixes of whole strings")]
    PrefixQueryUnsupported,
    #[error("invalid glob {glob}: {reason}")]
    InvalidGlob { glob: String, reason: String },
    #[error("invalid {kind} name: {name}")]
    InvalidName { kind: &'static str, name: String },
}

/// Whitelist/blacklist criteria over plain strings.
pub trait WhiteBlackList: fmt::Display + Send + Sync {
    fn add_to_whitelist(&mut self, value: &str) -> Result<(), ScopeError>;
    fn add_to_blacklist(&mut self, value: &str) -> Result<(), ScopeError>;
    fn is_whitelisted(&self, value: &str) -> bool;
    fn is_blacklisted(&self, value: &str) -> bool;

    fn is_whitelisted_and_not_blacklisted(&self, value: &str) -> bool {
        self.is_whitelisted(value) && !self.is_blacklisted(value)
    }

    /// Check whether some whitelisted string starts with `value`.
    fn whitelist_has_prefix(&self, value: &str) -> Result<bool, ScopeError>;

    /// True if no whitelist criteria of any kind were added.
    fn whitelist_is_empty(&self) -> bool;

    /// True if no blacklist criteria of any kind were added.
    fn blacklist_is_empty(&self) -> bool;

    /// Sort prefix collections so evaluation does not depend on insertion order.
    fn sort_prefixes(&mut self);

    fn whitelist_and_blacklist_are_empty(&self) -> bool {
        self.whitelist_is_empty() && self.blacklist_is_empty()
    }

    /// Like `is_whitelisted`, but false when the whitelist is empty.
    fn is_specifically_whitelisted(&self, value: &str) -> bool {
        !self.whitelist_is_empty() && self.is_whitelisted(value)
    }

    fn is_specifically_whitelisted_and_not_blacklisted(&self, value: &str) -> bool {
        !self.whitelist_is_empty() && self.is_whitelisted_and_not_blacklisted(value)
    }
}

/// Prefix-only criteria. Wildcards are rejected.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixList {
    whitelist_prefixes: Vec<String>,
    blacklist_prefixes: Vec<String>,
}

impl PrefixList {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WhiteBlackList for PrefixList {
    fn add_to_whitelist(&mut self, value: &str) -> Result<(), ScopeError> {
        if contains_wildcard(value) {
            return Err(ScopeError::WildcardNotAllowed(value.to_string()));
        }
        self.whitelist_prefixes.push(value.to_string());
        Ok(())
    }

    fn add_to_blacklist(&mut self, value: &str) -> Result<(), ScopeError> {
        if contains_wildcard(value) {
            return Err(ScopeError::WildcardNotAllowed(value.to_string()));
        }
        self.blacklist_prefixes.push(value.to_string());
        Ok(())
    }

    fn is_whitelisted(&self, value: &str) -> bool {
        self.whitelist_prefixes.is_empty()
            || self
                .whitelist_prefixes
                .iter()
                .any(|prefix| value.starts_with(prefix.as_str()))
    }

    fn is_blacklisted(&self, value: &str) -> bool {
        self.blacklist_prefixes
            .iter()
            .any(|prefix| value.starts_with(prefix.as_str()))
    }

    fn whitelist_has_prefix(&self, _value: &str) -> Result<bool, ScopeError> {
        Err(ScopeError::PrefixQueryUnsupported)
    }

    fn whitelist_is_empty(&self) -> bool {
        self.whitelist_prefixes.is_empty()
    }

    fn blacklist_is_empty(&self) -> bool {
        self.blacklist_prefixes.is_empty()
    }

    fn sort_prefixes(&mut self) {
        self.whitelist_prefixes.sort();
        self.blacklist_prefixes.sort();
    }
}

impl fmt::Display for PrefixList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut summary = Summary::default();
        summary.push("whitelistPrefixes", &self.whitelist_prefixes);
        summary.push("blacklistPrefixes", &self.blacklist_prefixes);
        f.write_str(&summary.finish())
    }
}

/// Whole-string criteria. Strings with a wildcard become globs.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WholeStringList {
    whitelist: BTreeSet<String>,
    blacklist: BTreeSet<String>,
    whitelist_globs: Vec<Glob>,
    blacklist_globs: Vec<Glob>,
}

impl WholeStringList {
    pub fn new() -> Self {
        Self::default()
    }
}

fn add_classified(
    literals: &mut BTreeSet<String>,
    globs: &mut Vec<Glob>,
    value: &str,
) -> Result<(), ScopeError> {
    if contains_wildcard(value) {
        if !globs.iter().any(|glob| glob.as_str() == value) {
            globs.push(compile_glob(value)?);
        }
    } else {
        literals.insert(value.to_string());
    }
    Ok(())
}

fn matches_any(globs: &[Glob], value: &str) -> bool {
    globs.iter().any(|glob| glob.matches(value))
}

impl WhiteBlackList for WholeStringList {
    fn add_to_whitelist(&mut self, value: &str) -> Result<(), ScopeError> {
        add_classified(&mut self.whitelist, &mut self.whitelist_globs, value)
    }

    fn add_to_blacklist(&mut self, value: &str) -> Result<(), ScopeError> {
        add_classified(&mut self.blacklist, &mut self.blacklist_globs, value)
    }

    fn is_whitelisted(&self, value: &str) -> bool {
        self.whitelist_is_empty()
            || self.whitelist.contains(value)
            || matches_any(&self.whitelist_globs, value)
    }

    fn is_blacklisted(&self, value: &str) -> bool {
        self.blacklist.contains(value) || matches_any(&self.blacklist_globs, value)
    }

    fn whitelist_has_prefix(&self, value: &str) -> Result<bool, ScopeError> {
        Ok(self
            .whitelist
            .iter()
            .any(|whitelisted| whitelisted.starts_with(value)))
    }

    fn whitelist_is_empty(&self) -> bool {
        self.whitelist.is_empty() && self.whitelist_globs.is_empty()
    }

    fn blacklist_is_empty(&self) -> bool {
        self.blacklist.is_empty() && self.blacklist_globs.is_empty()
    }

    fn sort_prefixes(&mut self) {}
}

impl fmt::Display for WholeStringList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut summary = Summary::default();
        summary.push("whitelist", &self.whitelist);
        summary.push("whitelistGlobs", &self.whitelist_globs);
        summary.push("blacklist", &self.blacklist);
        summary.push("blacklistGlobs", &self.blacklist_globs);
        f.write_str(&summary.finish())
    }
}

/// Whole-string criteria applied to the leaf name of a path.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct LeafNameList {
    inner: WholeStringList,
}

impl LeafNameList {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WhiteBlackList for LeafNameList {
    fn add_to_whitelist(&mut self, value: &str) -> Result<(), ScopeError> {
        self.inner.add_to_whitelist(leaf_name(value))
    }

    fn add_to_blacklist(&mut self, value: &str) -> Result<(), ScopeError> {
        self.inner.add_to_blacklist(leaf_name(value))
    }

    fn is_whitelisted(&self, value: &str) -> bool {
        self.inner.is_whitelisted(leaf_name(value))
    }

    fn is_blacklisted(&self, value: &str) -> bool {
        self.inner.is_blacklisted(leaf_name(value))
    }

    fn is_whitelisted_and_not_blacklisted(&self, value: &str) -> bool {
        self.inner.is_whitelisted_and_not_blacklisted(leaf_name(value))
    }

    fn whitelist_has_prefix(&self, _value: &str) -> Result<bool, ScopeError> {
        Err(ScopeError::PrefixQueryUnsupported)
    }

    fn whitelist_is_empty(&self) -> bool {
        self.inner.whitelist_is_empty()
    }

    fn blacklist_is_empty(&self) -> bool {
        self.inner.blacklist_is_empty()
    }

    fn sort_prefixes(&mut self) {
        self.inner.sort_prefixes();
    }
}

impl fmt::Display for LeafNameList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

/// `key: [a, b]; key2: [c]` rendering used by the `Display` impls.
#[derive(Default)]
struct Summary {
    parts: Vec<String>,
}

impl Summary {
    fn push<'a, I, T>(&mut self, label: &str, values: I)
    where
        I: IntoIterator<Item = &'a T>,
        T: fmt::Display + 'a,
    {
        let values: Vec<String> = values.into_iter().map(|value| value.to_string()).collect();
        if !values.is_empty() {
            self.parts.push(format!("{label}: [{}]", values.join(", ")));
        }
    }

    fn finish(self) -> String {
        self.parts.join("; ")
    }
}

/// Remove leading and trailing `/` characters.
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// Remove leading and trailing `.` characters.
pub fn normalize_package_or_class_name(name: &str) -> &str {
    name.trim_matches('.')
}

pub fn path_to_package_name(path: &str) -> String {
    normalize_path(path).replace('/', ".")
}

pub fn package_name_to_path(package_name: &str) -> String {
    normalize_package_or_class_name(package_name).replace('.', "/")
}

/// `com.example.Foo` -> `com/example/Foo.class`.
pub fn class_name_to_classfile_path(class_name: &str) -> String {
    format!("{}{CLASSFILE_SUFFIX}", package_name_to_path(class_name))
}

/// Final path segment of the outermost file, or the whole string when it has no
/// separator. A nested-jar path such as `lib/a.jar!/inner/b.jar` names `a.jar`.
pub fn leaf_name(path: &str) -> &str {
    let path = match path.find('!') {
        Some(index) => &path[..index],
        None => path,
    };
    match path.rfind(['/', '\\']) {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_whole_string_list_whitelists_everything() {
        let list = WholeStringList::new();

        assert!(list.is_whitelisted("anything"));
        assert!(!list.is_specifically_whitelisted("anything"));
        assert!(!list.is_blacklisted("anything"));
        assert!(list.whitelist_and_blacklist_are_empty());
    }

    #[test]
    fn blacklist_overrides_whitelist() {
        let mut list = WholeStringList::new();
        list.add_to_whitelist("com.foo").expect("whitelist");
        list.add_to_blacklist("com.foo.bar").expect("blacklist");

        assert!(list.is_whitelisted_and_not_blacklisted("com.foo"));
        assert!(!list.is_whitelisted_and_not_blacklisted("com.foo.bar"));
        assert!(list.is_specifically_whitelisted_and_not_blacklisted("com.foo"));
    }

    #[test]
    fn whole_string_routes_wildcards_to_globs() {
        let mut list = WholeStringList::new();
        list.add_to_whitelist("com.example.*").expect("whitelist glob");

        assert!(list.is_whitelisted("com.example.Foo"));
        assert!(!list.is_whitelisted("com.other.Foo"));
        assert!(!list.whitelist_is_empty());
        assert_eq!(list.whitelist_has_prefix("com"), Ok(false));
    }

    #[test]
    fn whole_string_blacklist_glob() {
        let mut list = WholeStringList::new();
        list.add_to_blacklist("*.internal").expect("blacklist glob");

        assert!(list.is_blacklisted("com.example.internal"));
        assert!(!list.is_blacklisted("com.example.internals"));
        assert!(list.is_whitelisted_and_not_blacklisted("com.example"));
    }

    #[test]
    fn whitelist_has_prefix_checks_literals() {
        let mut list = WholeStringList::new();
        list.add_to_whitelist("com/example/deep/").expect("whitelist");

        assert_eq!(list.whitelist_has_prefix("com/"), Ok(true));
        assert_eq!(list.whitelist_has_prefix("com/example/"), Ok(true));
        assert_eq!(list.whitelist_has_prefix("org/"), Ok(false));
    }

    #[test]
    fn prefix_list_rejects_wildcards() {
        let mut list = PrefixList::new();

        assert_eq!(
            list.add_to_whitelist("com.*"),
            Err(ScopeError::WildcardNotAllowed("com.*".to_string()))
        );
        assert!(list.add_to_blacklist("*").is_err());
        assert!(list.whitelist_and_blacklist_are_empty());
    }

    #[test]
    fn prefix_list_matches_prefixes() {
        let mut list = PrefixList::new();
        list.add_to_whitelist("com/example/").expect("whitelist");

        assert!(list.is_whitelisted("com/example/Foo.class"));
        assert!(!list.is_whitelisted("org/example/Foo.class"));
        assert!(!list.is_blacklisted("com/example/Foo.class"));
    }

    #[test]
    fn prefix_blacklist_is_insertion_order_independent() {
        for prefixes in [
            ["com/foo/bar/", "com/foo/"],
            ["com/foo/", "com/foo/bar/"],
        ] {
            let mut list = PrefixList::new();
            for prefix in prefixes {
                list.add_to_blacklist(prefix).expect("blacklist");
            }
            list.sort_prefixes();

            assert!(list.is_blacklisted("com/foo/bar/Baz.class"));
            assert!(list.is_blacklisted("com/foo/Qux.class"));
            assert!(!list.is_blacklisted("com/other/Qux.class"));
            assert_eq!(list.to_string(), "blacklistPrefixes: [com/foo/, com/foo/bar/]");
        }
    }

    #[test]
    fn prefix_list_rejects_prefix_queries() {
        let list = PrefixList::new();

        assert_eq!(
            list.whitelist_has_prefix("com"),
            Err(ScopeError::PrefixQueryUnsupported)
        );
    }

    #[test]
    fn leaf_name_list_matches_final_segment() {
        let mut list = LeafNameList::new();
        list.add_to_whitelist("widget.jar").expect("whitelist");

        assert!(list.is_whitelisted("/opt/libs/widget.jar"));
        assert!(!list.is_whitelisted("/opt/libs/other.jar"));
        assert!(list.is_specifically_whitelisted_and_not_blacklisted("widget.jar"));
        assert_eq!(
            list.whitelist_has_prefix("widget"),
            Err(ScopeError::PrefixQueryUnsupported)
        );
    }

    #[test]
    fn leaf_name_list_reduces_added_paths() {
        let mut list = LeafNameList::new();
        list.add_to_blacklist("/usr/share/java/slf4j-*.jar")
            .expect("blacklist");

        assert!(list.is_blacklisted("C:\\libs\\slf4j-api.jar"));
        assert!(!list.is_whitelisted_and_not_blacklisted("lib/slf4j-simple.jar"));
        assert!(list.is_whitelisted_and_not_blacklisted("lib/guava.jar"));
    }

    #[test]
    fn display_lists_non_empty_collections() {
        let mut list = WholeStringList::new();
        list.add_to_whitelist("b").expect("whitelist");
        list.add_to_whitelist("a").expect("whitelist");
        list.add_to_blacklist("x.*").expect("blacklist");

        assert_eq!(list.to_string(), "whitelist: [a, b]; blacklistGlobs: [x.*]");
    }

    #[test]
    fn whole_string_list_serializes_glob_sources() {
        let mut list = WholeStringList::new();
        list.add_to_whitelist("com.*").expect("whitelist");

        let value = serde_json::to_value(&list).expect("serialize list");

        assert_eq!(value["whitelistGlobs"][0], "com.*");
    }

    #[test]
    fn normalization_helpers() {
        assert_eq!(normalize_path("/com/example/"), "com/example");
        assert_eq!(normalize_path("com//example"), "com//example");
        assert_eq!(normalize_package_or_class_name("..com.example.."), "com.example");
        assert_eq!(path_to_package_name("/com/example/"), "com.example");
        assert_eq!(package_name_to_path(".com.example"), "com/example");
        assert_eq!(
            class_name_to_classfile_path("com.example.Foo"),
            "com/example/Foo.class"
        );
        assert_eq!(leaf_name("/opt/libs/widget.jar"), "widget.jar");
        assert_eq!(leaf_name("widget.jar"), "widget.jar");
        assert_eq!(leaf_name("dir/"), "");
    }

    #[test]
    fn leaf_name_stops_at_nested_jar_separator() {
        assert_eq!(leaf_name("a.jar!/lib/b.jar"), "a.jar");
        assert_eq!(leaf_name("file:/opt/app.jar!/BOOT-INF/lib/dep.jar"), "app.jar");

        let mut list = LeafNameList::new();
        list.add_to_whitelist("app.jar").expect("whitelist");
        assert!(list.is_whitelisted("/opt/app.jar!/BOOT-INF/lib/dep.jar"));
        assert!(!list.is_whitelisted("/opt/dep.jar"));
    }

    #[test]
    fn package_path_round_trip() {
        for package in ["com", "com.example", "org.apache.felix.framework"] {
            assert_eq!(path_to_package_name(&package_name_to_path(package)), package);
        }
    }
}

use std::fmt;

use serde::Serialize;

use crate::glob::contains_wildcard;
use crate::scope::{
    LeafNameList, PrefixList, ScopeError, WhiteBlackList, WholeStringList,
    class_name_to_classfile_path, normalize_package_or_class_name, package_name_to_path,
    path_to_package_name,
};

/// How a directory path relates to the whitelisted and blacklisted paths.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMatch {
    /// The path is within a blacklisted path.
    HasBlacklistedPathPrefix,
    /// The path is within a whitelisted path.
    HasWhitelistedPathPrefix,
    /// The path is exactly a whitelisted path.
    AtWhitelistedPath,
    /// The path is the package of a specifically whitelisted class.
    AtWhitelistedClassPackage,
    /// The path is an ancestor of a whitelisted path, so descending may reach it.
    AncestorOfWhitelistedPath,
    NotWithinWhitelistedPath,
}

/// Read-only scope criteria shared by every stage of a scan.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSpec {
    package_list: WholeStringList,
    package_prefix_list: PrefixList,
    path_list: WholeStringList,
    path_prefix_list: PrefixList,
    class_list: WholeStringList,
    classfile_path_list: WholeStringList,
    class_package_path_list: WholeStringList,
    jar_list: LeafNameList,
}

impl ScanSpec {
    pub fn builder() -> ScanSpecBuilder {
        ScanSpecBuilder::default()
    }

    /// True if the dotted package name is whitelisted (directly or via a
    /// parent package) and not blacklisted.
    pub fn package_is_in_scope(&self, package_name: &str) -> bool {
        let package_name = normalize_package_or_class_name(package_name);
        let with_separator = format!("{package_name}.");
        if self.package_list.is_blacklisted(package_name)
            || self.package_prefix_list.is_blacklisted(&with_separator)
        {
            return false;
        }
        self.package_list.is_whitelisted(package_name)
            || self
                .package_prefix_list
                .is_specifically_whitelisted(&with_separator)
    }

    /// True if the class name is whitelisted and not blacklisted.
    pub fn class_is_in_scope(&self, class_name: &str) -> bool {
        let class_name = normalize_package_or_class_name(class_name);
        let package_name = match class_name.rfind('.') {
            Some(index) => &class_name[..index],
            None => "",
        };
        if self.class_list.is_blacklisted(class_name) {
            return false;
        }
        if self.class_list.is_specifically_whitelisted(class_name) {
            return true;
        }
        // Package and path whitelists both land in package_list.
        if self.package_list.whitelist_is_empty() && !self.class_list.whitelist_is_empty() {
            return false;
        }
        self.package_is_in_scope(package_name)
    }

    /// True if a classfile path relative to a classpath root should be read.
    pub fn classfile_is_in_scope(&self, relative_path: &str) -> bool {
        let relative_path = relative_path.trim_start_matches('/');
        if self.classfile_path_list.is_blacklisted(relative_path) {
            return false;
        }
        let parent_dir = match relative_path.rfind('/') {
            Some(index) => &relative_path[..=index],
            None => "",
        };
        match self.dir_match_status(parent_dir) {
            PathMatch::HasWhitelistedPathPrefix | PathMatch::AtWhitelistedPath => true,
            PathMatch::AtWhitelistedClassPackage => self
                .classfile_path_list
                .is_specifically_whitelisted(relative_path),
            PathMatch::HasBlacklistedPathPrefix
            | PathMatch::AncestorOfWhitelistedPath
            | PathMatch::NotWithinWhitelistedPath => false,
        }
    }

    /// True if the jar at `location` passes the jar leaf-name criteria.
    pub fn jar_is_in_scope(&self, location: &str) -> bool {
        self.jar_list.is_whitelisted_and_not_blacklisted(location)
    }

    /// Classify a directory path (`com/example/`) against the path criteria.
    pub fn dir_match_status(&self, relative_path: &str) -> PathMatch {
        if self.path_prefix_list.is_blacklisted(relative_path)
            || self.path_list.is_blacklisted(relative_path)
        {
            return PathMatch::HasBlacklistedPathPrefix;
        }
        if self.path_list.whitelist_is_empty() && self.class_list.whitelist_is_empty() {
            return if relative_path.is_empty() || relative_path == "/" {
                PathMatch::AtWhitelistedPath
            } else {
                PathMatch::HasWhitelistedPathPrefix
            };
        }
        if self
            .path_list
            .is_specifically_whitelisted_and_not_blacklisted(relative_path)
        {
            return PathMatch::AtWhitelistedPath;
        }
        if self
            .class_package_path_list
            .is_specifically_whitelisted_and_not_blacklisted(relative_path)
        {
            return PathMatch::AtWhitelistedClassPackage;
        }
        if self
            .path_prefix_list
            .is_specifically_whitelisted(relative_path)
        {
            return PathMatch::HasWhitelistedPathPrefix;
        }
        if relative_path == "/"
            || matches!(self.path_list.whitelist_has_prefix(relative_path), Ok(true))
            || matches!(
                self.class_package_path_list
                    .whitelist_has_prefix(relative_path),
                Ok(true)
            )
        {
            return PathMatch::AncestorOfWhitelistedPath;
        }
        PathMatch::NotWithinWhitelistedPath
    }

    /// True if no package, path, class or jar criteria were configured.
    pub fn is_unconstrained(&self) -> bool {
        self.package_list.whitelist_and_blacklist_are_empty()
            && self.path_list.whitelist_and_blacklist_are_empty()
            && self.class_list.whitelist_and_blacklist_are_empty()
            && self.jar_list.whitelist_and_blacklist_are_empty()
    }

    fn sort_prefixes(&mut self) {
        self.package_list.sort_prefixes();
        self.package_prefix_list.sort_prefixes();
        self.path_list.sort_prefixes();
        self.path_prefix_list.sort_prefixes();
        self.class_list.sort_prefixes();
        self.classfile_path_list.sort_prefixes();
        self.class_package_path_list.sort_prefixes();
        self.jar_list.sort_prefixes();
    }
}

impl fmt::Display for ScanSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lists: [(&str, &dyn WhiteBlackList); 8] = [
            ("packages", &self.package_list),
            ("packagePrefixes", &self.package_prefix_list),
            ("paths", &self.path_list),
            ("pathPrefixes", &self.path_prefix_list),
            ("classes", &self.class_list),
            ("classfilePaths", &self.classfile_path_list),
            ("classPackagePaths", &self.class_package_path_list),
            ("jars", &self.jar_list),
        ];
        let mut first = true;
        for (label, list) in lists {
            if list.whitelist_and_blacklist_are_empty() {
                continue;
            }
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{label} {{{list}}}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Side {
    Whitelist,
    Blacklist,
}

fn add(list: &mut dyn WhiteBlackList, side: Side, value: &str) -> Result<(), ScopeError> {
    match side {
        Side::Whitelist => list.add_to_whitelist(value),
        Side::Blacklist => list.add_to_blacklist(value),
    }
}

/// Collects scope criteria, then freezes them into a [`ScanSpec`].
#[derive(Default)]
pub struct ScanSpecBuilder {
    spec: ScanSpec,
}

impl ScanSpecBuilder {
    /// Whitelist packages and their subpackages. `*` globs are allowed.
    pub fn whitelist_packages<I, S>(mut self, package_names: I) -> Result<Self, ScopeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in package_names {
            let package_name = validated_package_name(name.as_ref())?;
            self.add_package(Side::Whitelist, package_name)?;
        }
        Ok(self)
    }

    /// Blacklist packages and their subpackages. `*` globs are allowed.
    pub fn blacklist_packages<I, S>(mut self, package_names: I) -> Result<Self, ScopeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in package_names {
            let package_name = validated_package_name(name.as_ref())?;
            self.add_package(Side::Blacklist, package_name)?;
        }
        Ok(self)
    }

    /// Whitelist slash-separated resource paths and everything below them.
    pub fn whitelist_paths<I, S>(mut self, paths: I) -> Result<Self, ScopeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            let package_name = path_to_package_name(path.as_ref());
            self.add_package(Side::Whitelist, &package_name)?;
        }
        Ok(self)
    }

    pub fn blacklist_paths<I, S>(mut self, paths: I) -> Result<Self, ScopeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            let package_name = path_to_package_name(path.as_ref());
            self.add_package(Side::Blacklist, &package_name)?;
        }
        Ok(self)
    }

    /// Whitelist individual classes by fully-qualified dotted name.
    pub fn whitelist_classes<I, S>(mut self, class_names: I) -> Result<Self, ScopeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in class_names {
            let class_name = validated_class_name(name.as_ref())?;
            self.add_class(Side::Whitelist, class_name)?;
            if !contains_wildcard(class_name) {
                let package_path = match class_name.rfind('.') {
                    Some(index) => format!("{}/", package_name_to_path(&class_name[..index])),
                    None => String::new(),
                };
                self.spec
                    .class_package_path_list
                    .add_to_whitelist(&package_path)?;
            }
        }
        Ok(self)
    }

    pub fn blacklist_classes<I, S>(mut self, class_names: I) -> Result<Self, ScopeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in class_names {
            let class_name = validated_class_name(name.as_ref())?;
            self.add_class(Side::Blacklist, class_name)?;
        }
        Ok(self)
    }

    /// Whitelist jars by leaf name (`guava-*.jar`).
    pub fn whitelist_jars<I, S>(mut self, jar_names: I) -> Result<Self, ScopeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in jar_names {
            let jar_name = validated_jar_name(name.as_ref())?;
            self.spec.jar_list.add_to_whitelist(jar_name)?;
        }
        Ok(self)
    }

    pub fn blacklist_jars<I, S>(mut self, jar_names: I) -> Result<Self, ScopeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in jar_names {
            let jar_name = validated_jar_name(name.as_ref())?;
            self.spec.jar_list.add_to_blacklist(jar_name)?;
        }
        Ok(self)
    }

    /// Sort prefixes and freeze the criteria.
    pub fn build(mut self) -> ScanSpec {
        self.spec.sort_prefixes();
        self.spec
    }

    fn add_package(&mut self, side: Side, package_name: &str) -> Result<(), ScopeError> {
        let spec = &mut self.spec;
        let path = package_name_to_path(package_name);
        add(&mut spec.package_list, side, package_name)?;
        if package_name.is_empty() {
            add(&mut spec.path_list, side, "")?;
        }
        add(&mut spec.path_list, side, &format!("{path}/"))?;
        if !contains_wildcard(package_name) {
            if package_name.is_empty() {
                add(&mut spec.package_prefix_list, side, "")?;
                add(&mut spec.path_prefix_list, side, "")?;
            } else {
                add(&mut spec.package_prefix_list, side, &format!("{package_name}."))?;
                add(&mut spec.path_prefix_list, side, &format!("{path}/"))?;
            }
        }
        Ok(())
    }

    fn add_class(&mut self, side: Side, class_name: &str) -> Result<(), ScopeError> {
        add(&mut self.spec.class_list, side, class_name)?;
        add(
            &mut self.spec.classfile_path_list,
            side,
            &class_name_to_classfile_path(class_name),
        )
    }
}

fn validated_package_name(name: &str) -> Result<&str, ScopeError> {
    let package_name = normalize_package_or_class_name(name.trim());
    if package_name.starts_with('!') || package_name.starts_with('-') {
        return Err(ScopeError::InvalidName {
            kind: "package",
            name: name.to_string(),
        });
    }
    Ok(package_name)
}

fn validated_class_name(name: &str) -> Result<&str, ScopeError> {
    let class_name = normalize_package_or_class_name(name.trim());
    if class_name.is_empty() || class_name.starts_with('!') || class_name.starts_with('-') {
        return Err(ScopeError::InvalidName {
            kind: "class",
            name: name.to_string(),
        });
    }
    Ok(class_name)
}

fn validated_jar_name(name: &str) -> Result<&str, ScopeError> {
    let jar_name = name.trim();
    if jar_name.is_empty() || jar_name.contains(['/', '\\']) {
        return Err(ScopeError::InvalidName {
            kind: "jar",
            name: name.to_string(),
        });
    }
    Ok(jar_name)
}

//! Normalization of classpath location strings (paths, `file:` URIs, nested jar URIs).

const ARCHIVE_EXTENSIONS: [&str; 4] = [".jar", ".zip", ".war", ".ear"];

/// Turn a filesystem path into a `file:` URI the way `File.toURI()` renders it.
/// Values that already carry a URI scheme are returned unchanged.
pub fn file_uri(path: &str) -> String {
    if scheme_len(path) > 0 {
        return path.to_string();
    }
    let path = path.replace('\\', "/");
    if path.starts_with('/') {
        format!("file:{path}")
    } else {
        format!("file:/{path}")
    }
}

/// Join a base file and a relative classpath element inside it (`bundle.jar` + `bin/`).
pub fn join_base(base: &str, child: &str) -> String {
    let base = base.trim_end_matches(['/', '\\']);
    let child = child.trim_start_matches(['/', '\\']);
    if child.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{child}")
    }
}

/// Canonical form of a classpath element, or `None` if nothing is left after trimming.
///
/// Separators become `/`, repeated separators after the scheme collapse, and a trailing
/// separator is dropped. The separators that directly follow a scheme (`file:///`) are kept.
pub fn normalize_classpath_element(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let unified = trimmed.replace('\\', "/");
    let scheme_end = scheme_len(&unified);
    let (scheme, rest) = unified.split_at(scheme_end);
    let leading = rest.len() - rest.trim_start_matches('/').len();
    let (lead, body) = rest.split_at(leading);

    let mut normalized = String::with_capacity(unified.len());
    normalized.push_str(scheme);
    normalized.push_str(lead);
    let mut previous_slash = false;
    for ch in body.chars() {
        if ch == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        normalized.push(ch);
    }
    if previous_slash {
        normalized.pop();
    }
    if normalized.is_empty() {
        return None;
    }
    Some(normalized)
}

/// True if the location names a jar/zip-style archive (the innermost one for nested URIs).
pub fn is_archive(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    let trimmed = lower.trim_end_matches(['/', '!']);
    let innermost = match trimmed.rfind("!/") {
        Some(index) => &trimmed[index + 2..],
        None => trimmed,
    };
    ARCHIVE_EXTENSIONS
        .iter()
        .any(|extension| innermost.ends_with(extension))
}

/// Split a path list on `;` and `:`, keeping the colons of URL schemes and drive letters.
pub fn split_path_list(paths: &str) -> Vec<String> {
    let chars: Vec<char> = paths.chars().collect();
    let mut elements = Vec::new();
    let mut current = String::new();
    let mut segment_start = 0;
    for (index, &ch) in chars.iter().enumerate() {
        let is_separator = match ch {
            ';' => true,
            ':' => {
                let segment = &current[segment_start..];
                let next = chars.get(index + 1).copied();
                let is_scheme_or_drive = !segment.is_empty()
                    && segment.chars().all(|c| c.is_ascii_alphabetic())
                    && (segment.len() == 1
                        || segment == "jar"
                        || matches!(next, Some('/') | Some('\\')));
                !is_scheme_or_drive
            }
            _ => false,
        };
        if is_separator {
            push_element(&mut elements, &current);
            current.clear();
            segment_start = 0;
        } else {
            current.push(ch);
            if ch == ':' {
                segment_start = current.len();
            }
        }
    }
    push_element(&mut elements, &current);
    elements
}

fn push_element(elements: &mut Vec<String>, element: &str) {
    let element = element.trim();
    if !element.is_empty() {
        elements.push(element.to_string());
    }
}

/// Length of a leading URI scheme chain such as `jar:file:`; 0 if there is none.
/// Single letters are treated as drive letters, not schemes.
fn scheme_len(value: &str) -> usize {
    let mut end = 0;
    loop {
        let rest = &value[end..];
        let name_len = rest
            .char_indices()
            .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.')))
            .map(|(index, _)| index)
            .unwrap_or(rest.len());
        let starts_alphabetic = rest.chars().next().is_some_and(|ch| ch.is_ascii_alphabetic());
        if name_len >= 2 && starts_alphabetic && rest[name_len..].starts_with(':') {
            end += name_len + 1;
        } else {
            return end;
        }
    }
}

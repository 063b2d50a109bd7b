//! String-level path helpers.
//!
//! Recorded paths may come from another machine or OS, so they are handled
//! as forward-slash strings rather than `std::path::Path` values.

/// Replace Windows separators with forward slashes.
pub fn to_forward_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

/// True for `c:` style drive prefixes.
pub fn has_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

pub fn is_absolute(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    has_drive(path) && matches!(path.as_bytes().get(2), None | Some(b'/') | Some(b'\\'))
}

/// Normalize separators and resolve `.` / `..` segments lexically.
pub fn normalize(path: &str) -> String {
    let path = to_forward_slashes(path);
    let (prefix, rest) = if has_drive(&path) {
        (path[..2].to_string(), &path[2..])
    } else {
        (String::new(), path.as_str())
    };
    let absolute = rest.starts_with('/') || !prefix.is_empty();
    let mut parts: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&"..") | None if !absolute => parts.push(".."),
                Some(_) => {
                    parts.pop();
                }
                None => {}
            },
            other => parts.push(other),
        }
    }
    if absolute {
        format!("{prefix}/{}", parts.join("/"))
    } else if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Resolve `path` against `dir` unless it is already absolute.
pub fn join(dir: &str, path: &str) -> String {
    if is_absolute(path) {
        normalize(path)
    } else {
        normalize(&format!("{dir}/{path}"))
    }
}

/// Non-empty segments of a normalized path, without any drive prefix.
pub fn segments(path: &str) -> Vec<&str> {
    let rest = if has_drive(path) { &path[2..] } else { path };
    rest.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Drive prefix (`c:`) of a path, if any.
pub fn drive(path: &str) -> Option<&str> {
    has_drive(path).then(|| &path[..2])
}

/// Rebuild an absolute path from a drive prefix and segments.
pub fn from_segments(drive: Option<&str>, segments: &[&str]) -> String {
    format!("{}/{}", drive.unwrap_or(""), segments.join("/"))
}

pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Parent directory of a normalized path; `None` for a root.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        return (trimmed.len() > 1).then_some("/");
    }
    if idx == 2 && has_drive(trimmed) {
        return (trimmed.len() > 3).then(|| &path[..3]);
    }
    Some(&trimmed[..idx])
}

/// True when `path` equals `prefix` or continues it at a `/` boundary.
pub fn starts_with_dir(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Path of `path` relative to `dir`, when it lies inside it.
pub fn relative_to<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    if !starts_with_dir(path, dir) {
        return None;
    }
    let rest = &path[dir.trim_end_matches('/').len()..];
    let rest = rest.trim_start_matches('/');
    (!rest.is_empty()).then_some(rest)
}

/// `/cygdrive/c/work` becomes `c:/work`.
pub fn convert_cygwin(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/cygdrive/")?;
    let mut chars = rest.chars();
    let letter = chars.next().filter(char::is_ascii_alphabetic)?;
    let tail = chars.as_str();
    if !(tail.is_empty() || tail.starts_with('/')) {
        return None;
    }
    Some(format!("{letter}:{}", if tail.is_empty() { "/" } else { tail }))
}

/// MinGW shells print `c:/work` as `/c/work`; return the drive form.
pub fn mingw_drive_candidate(path: &str) -> Option<String> {
    let rest = path.strip_prefix('/')?;
    let bytes = rest.as_bytes();
    if bytes.is_empty() || !bytes[0].is_ascii_alphabetic() {
        return None;
    }
    match bytes.get(1) {
        None => Some(format!("{}:/", &rest[..1])),
        Some(b'/') => Some(format!("{}:{}", &rest[..1], &rest[1..])),
        Some(_) => None,
    }
}

/// Put the drive of `root` in front of a rooted but drive-less path.
pub fn attach_root_drive(path: &str, root: &str) -> Option<String> {
    let drive = drive(root)?;
    if !path.starts_with('/') || has_drive(path) {
        return None;
    }
    Some(format!("{drive}{path}"))
}

/// Alternate spelling of `path` across an automounter `/net/<host>` prefix.
///
/// A `/net/<host>/x` path maps to `/x`; when the analysis root itself lives
/// under `/net/<host>`, a plain absolute path gains that prefix.
pub fn net_host_variant(path: &str, root: &str) -> Option<String> {
    if let Some(rest) = path.strip_prefix("/net/") {
        let idx = rest.find('/')?;
        return Some(rest[idx..].to_string());
    }
    let rest = root.strip_prefix("/net/")?;
    let host = &rest[..rest.find('/')?];
    path.starts_with('/').then(|| format!("/net/{host}{path}"))
}

/// Basename of an executable path with any `.exe` suffix removed.
pub fn tool_name(path: &str) -> &str {
    let name = file_name(path);
    name.strip_suffix(".exe")
        .or_else(|| name.strip_suffix(".EXE"))
        .unwrap_or(name)
}

/// File extension without the dot, case preserved (`.C` is C++).
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    let idx = name.rfind('.')?;
    (idx > 0).then(|| &name[idx + 1..])
}

//! Lexical operations on slash-separated paths.
//!
//! Backend paths are plain POSIX-style strings regardless of the host OS, so
//! the engine normalizes and joins them lexically instead of going through
//! `std::path`. A backend is free to translate to native separators
//! internally.

/// Returns the shortest lexical equivalent of `path`.
///
/// Repeated slashes and `.` elements are dropped, `..` elements swallow the
/// preceding element, and `..` at the root is removed. The cleaned form of an
/// empty path is `"."`.
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for elem in path.split('/') {
        match elem {
            "" | "." => {}
            ".." => match out.last() {
                Some(&"..") => out.push(".."),
                Some(_) => {
                    out.pop();
                }
                None => {
                    if !rooted {
                        out.push("..");
                    }
                }
            },
            _ => out.push(elem),
        }
    }
    if rooted {
        format!("/{}", out.join("/"))
    } else if out.is_empty() {
        ".".to_string()
    } else {
        out.join("/")
    }
}

/// Joins two path elements with a slash and cleans the result. Empty
/// elements are ignored.
pub fn join(a: &str, b: &str) -> String {
    if a.is_empty() {
        return clean(b);
    }
    if b.is_empty() {
        return clean(a);
    }
    clean(&format!("{}/{}", a, b))
}

/// Returns the last element of `path`, with trailing slashes removed.
/// An empty path yields `"."` and a path of only slashes yields `"/"`.
pub fn base(path: &str) -> &str {
    if path.is_empty() {
        return ".";
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

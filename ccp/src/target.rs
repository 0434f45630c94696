//! Splitting command-line targets into an optional host and a path.

/// Splits an scp-style target like `user@host:/path` into its host and path
/// parts. The rule is the first occurrence of `:` or `/` decides: a colon
/// before any slash marks a host prefix, anything else is a local path. A
/// local file with a colon in its name can be qualified with a directory,
/// e.g. `./file:with:colons`.
pub fn split_host_path(target: &str) -> (Option<&str>, &str) {
    match target.find([':', '/']) {
        Some(i) if target.as_bytes()[i] == b':' => (Some(&target[..i]), &target[i + 1..]),
        _ => (None, target),
    }
}

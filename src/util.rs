use std::path::PathBuf;

/// Strip a single trailing path separator from a user-supplied folder path.
pub fn strip_trailing_separator(path: &str) -> PathBuf {
    let trimmed = path
        .strip_suffix('/')
        .or_else(|| path.strip_suffix('\\'))
        .filter(|s| !s.is_empty())
        .unwrap_or(path);
    PathBuf::from(trimmed)
}

/// Make a playlist name safe to use as a file name stem: spaces and path
/// separators become underscores.
pub fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

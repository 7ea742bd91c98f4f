//! File path normalization shared by breakpoint keys and engine paths.

/// Normalizes a path exchanged with the correlator for the host platform.
#[must_use]
pub fn normalize_engine_path(path: &str) -> String {
    normalize_with(path, cfg!(windows))
}

/// Uppercases a leading drive letter when `drive_letters` is set.
#[must_use]
pub fn normalize_with(path: &str, drive_letters: bool) -> String {
    if !drive_letters {
        return path.to_string();
    }
    let mut chars = path.chars();
    match (chars.next(), chars.next()) {
        (Some(drive), Some(':')) if drive.is_ascii_alphabetic() => {
            let mut normalized = String::with_capacity(path.len());
            normalized.push(drive.to_ascii_uppercase());
            normalized.push_str(&path[1..]);
            normalized
        }
        _ => path.to_string(),
    }
}

/// Last path component, for frame and source labels.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

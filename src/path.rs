//! Canonical slash-delimited tree paths.
//!
//! Every path handed across the crate's seams is in canonical form: a
//! leading `/`, no trailing or repeated separators, with `/` itself
//! denoting the root. Remote notification locations are turned into
//! root-relative segment sequences here rather than by walking parent
//! links on a live remote handle, so a location is just data.

/// Collapses redundant separators and whitespace-only segments. An empty
/// or separator-only path normalizes to the root form `/`.
pub fn normalize(path: &str) -> String {
    let mut normalized = String::from("/");

    for segment in path.split('/') {
        if segment.trim().is_empty() {
            continue;
        }

        if normalized.len() > 1 {
            normalized.push('/');
        }

        normalized.push_str(segment);
    }

    normalized
}

/// Joins segments with `/` and normalizes the result. Numeric segments
/// stringify through `Display`, so container indexes join unchanged.
pub fn join<I>(parts: I) -> String
where
    I: IntoIterator,
    I::Item: std::fmt::Display,
{
    let mut joined = String::new();

    for part in parts {
        joined.push('/');
        joined.push_str(&part.to_string());
    }

    normalize(&joined)
}

/// Splits a path into its canonical segments. The root has none.
pub fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.trim().is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn segment_count(path: &str) -> usize {
    path.split('/')
        .filter(|segment| !segment.trim().is_empty())
        .count()
}

/// Derives the path of a notification location relative to a synchronized
/// root by dropping the root's own leading segments. A location shallower
/// than the root yields the empty (root) path; callers guard against that
/// by checking the location is actually under their current root.
pub fn resolve_relative(location: &str, root_depth: usize) -> Vec<String> {
    let mut segs = segments(location);

    if root_depth >= segs.len() {
        return Vec::new();
    }

    segs.split_off(root_depth)
}

use crate::shell::data::{FILESYSTEM, PLACEHOLDER_FILES};
use rand::seq::SliceRandom;
use rand::Rng;

/// Resolve a path the way the emulated shell does.
///
/// The rules are intentionally literal rather than a full normalizer:
/// `cd a/../b` is not something scripted scanners type, and a too-clever
/// resolver would produce paths the canned tree cannot answer for.
pub fn resolve_path(path: &str, current: &str, home: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else if path == "~" {
        home.to_string()
    } else if let Some(rest) = path.strip_prefix("~/") {
        format!("{}/{}", home, rest)
    } else if path == ".." {
        if current == "/" {
            return "/".to_string();
        }
        let parent = current
            .rsplit_once('/')
            .map(|(head, _)| head)
            .unwrap_or("");
        if parent.is_empty() {
            "/".to_string()
        } else {
            parent.to_string()
        }
    } else if path == "." {
        current.to_string()
    } else {
        format!("{}/{}", current.trim_end_matches('/'), path)
    }
}

/// Whether the path exists in the modeled tree.
pub fn is_modeled(path: &str) -> bool {
    FILESYSTEM.contains_key(normalize(path))
}

/// List a directory. Modeled paths return their configured children
/// verbatim; anything else gets a random non-empty subset of the
/// placeholder set, so unmapped corners of the tree still look inhabited.
pub fn list_directory(path: &str) -> Vec<String> {
    if let Some(children) = FILESYSTEM.get(normalize(path)) {
        return children.iter().map(|s| s.to_string()).collect();
    }

    let mut rng = rand::thread_rng();
    let count = rng.gen_range(1..=PLACEHOLDER_FILES.len());
    PLACEHOLDER_FILES
        .choose_multiple(&mut rng, count)
        .map(|s| s.to_string())
        .collect()
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

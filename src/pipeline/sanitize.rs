use chrono::Utc;

const FALLBACK_TAG: &str = "shipshape-image";

/// Normalize an image tag: ASCII-lowercase, then replace every character
/// outside `[a-z0-9._/:-]` with `-`. Idempotent.
pub fn sanitize_tag(tag: &str) -> String {
    let cleaned: String = tag
        .trim()
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| {
            if c.is_ascii_lowercase()
                || c.is_ascii_digit()
                || matches!(c, '.' | '-' | '_' | '/' | ':')
            {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        FALLBACK_TAG.to_string()
    } else {
        cleaned
    }
}

/// Docker container names: `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
pub fn is_valid_container_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        _ => false,
    }
}

/// Coerce `name` into a valid container name: disallowed characters become
/// `-`, and an invalid leading character is replaced with `c`. Idempotent.
///
/// Returns `None` only for an empty name.
pub fn repair_container_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    if is_valid_container_name(name) {
        return Some(name.to_string());
    }
    let mut repaired: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if !repaired.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        repaired.replace_range(..1, "c");
    }
    Some(repaired)
}

/// `<sanitized tag>-<UTC timestamp>`, unique per call for practical purposes.
pub fn generate_container_name(image_tag: &str) -> String {
    format!(
        "{}-{}",
        sanitize_tag(image_tag),
        Utc::now().format("%Y%m%d%H%M%S%f")
    )
}

/// Default image name for a repository identifier such as `owner/name` or a path.
pub fn default_image_name(repository: &str) -> String {
    let base = repository
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .rsplit(['/', '\\', ':'])
        .next()
        .unwrap_or(repository);
    format!("shipshape/{}", sanitize_tag(base))
}

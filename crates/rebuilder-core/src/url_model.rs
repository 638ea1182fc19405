//! Shard naming derived from URLs and content addresses.
//!
//! Names are deterministic: the same source always maps to the same file in
//! the shard directory, so re-submitting a source is idempotent on disk.

/// Extension carried by every shard file.
pub const SHARD_EXT: &str = "car";

/// Fallback when a URL yields no usable path segment.
const DEFAULT_SHARD_STEM: &str = "shard";

/// True for `http://` and `https://` URLs, the only schemes the transfer agent is given.
pub fn is_http_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

/// Last non-empty path segment of `url`, ignoring query and fragment.
pub fn last_path_segment(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path().split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// File name under which the transfer agent stores the shard behind `url`.
///
/// `https://host/a/bafyabc.car` → `bafyabc.car`, `https://host/a/piece` → `piece.car`.
pub fn shard_filename(url: &str) -> String {
    let stem = last_path_segment(url)
        .map(|s| sanitize_component(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SHARD_STEM.to_string());
    with_shard_ext(stem)
}

/// File name for a shard known only by content address: `<cid>.car`.
pub fn cid_shard_filename(cid: &str) -> String {
    let stem = sanitize_component(cid);
    if stem.is_empty() {
        return with_shard_ext(DEFAULT_SHARD_STEM.to_string());
    }
    with_shard_ext(stem)
}

/// True if `name` looks like a shard file.
pub fn is_shard_name(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .map(|e| e.eq_ignore_ascii_case(SHARD_EXT))
        .unwrap_or(false)
}

fn with_shard_ext(stem: String) -> String {
    if is_shard_name(&stem) {
        stem
    } else {
        format!("{}.{}", stem, SHARD_EXT)
    }
}

/// Replace path separators, NUL, whitespace and control characters with `_`,
/// collapse runs of `_`, trim leading/trailing dots and underscores, and cap
/// the result at 200 bytes so the `.car.part` suffix still fits NAME_MAX.
pub fn sanitize_component(name: &str) -> String {
    const MAX_LEN: usize = 200;

    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;
    for c in name.chars() {
        let bad = c == '/' || c == '\\' || c == '\0' || c.is_control() || c.is_whitespace();
        if bad || c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut take = trimmed.len().min(MAX_LEN);
    while take > 0 && !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}

//! Content-type resolution for mislabeled responses.

/// Resolve the effective content type of a body.
///
/// The declared header wins unless it is missing, empty, or the generic
/// `application/octet-stream`, in which case the byte prefix decides.
pub fn resolve_content_type(declared: Option<&str>, body: &[u8]) -> Option<String> {
    let declared = declared.map(str::trim).filter(|v| !v.is_empty());
    match declared {
        Some(value) if !is_generic(value) => Some(value.to_string()),
        _ => sniff(body).map(str::to_string).or_else(|| declared.map(str::to_string)),
    }
}

fn is_generic(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().starts_with("application/octet-stream")
}

/// Guess a content type from the first bytes of a body.
pub fn sniff(body: &[u8]) -> Option<&'static str> {
    let head = &body[..body.len().min(1024)];
    if head.starts_with(b"%PDF") {
        return Some("application/pdf");
    }

    let trimmed = trim_leading(head);
    let lower = String::from_utf8_lossy(&trimmed[..trimmed.len().min(64)]).to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return Some("text/html");
    }
    if trimmed.starts_with(b"{") || trimmed.starts_with(b"[") {
        return Some("application/json");
    }
    if !body.is_empty() && std::str::from_utf8(body).is_ok() {
        return Some("text/plain");
    }
    None
}

fn trim_leading(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Whether a content type carries text worth scanning with heuristics.
pub fn is_textual(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return false;
    };
    let ct = ct.to_ascii_lowercase();
    ct.starts_with("text/") || ct.contains("html") || ct.contains("xml") || ct.contains("json")
}

//! Helpers for cleaning up the hosts that come out of the ranking list.

/// Normalise a ranking entry into something we can put in a URL.
///
/// Lowercases, trims whitespace, strips a scheme prefix, any path and a
/// trailing dot. Returns `None` if nothing usable is left.
///
/// ```
/// use topsite_scan_lib::normalize_host;
///
/// assert_eq!(normalize_host(" Example.COM. "), Some("example.com".to_string()));
/// assert_eq!(normalize_host("https://news.example/today"), Some("news.example".to_string()));
/// assert_eq!(normalize_host("   "), None);
/// ```
pub fn normalize_host(raw: &str) -> Option<String> {
    let mut host = raw.trim();

    if let Some(idx) = host.find("://") {
        host = &host[idx + 3..];
    }
    if let Some(idx) = host.find('/') {
        host = &host[..idx];
    }
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    if is_valid_host(&host) {
        Some(host)
    } else {
        None
    }
}

/// Validate a host, optionally followed by `:port`.
pub(crate) fn is_valid_host(host: &str) -> bool {
    let (name, port) = match host.rsplit_once(':') {
        Some((name, port)) => (name, Some(port)),
        None => (host, None),
    };

    if let Some(port) = port {
        if port.parse::<u16>().is_err() {
            return false;
        }
    }

    if name.is_empty() || name.len() > 253 {
        return false;
    }

    if name.starts_with('.') || name.starts_with('-') || name.ends_with('-') {
        return false;
    }

    // Each label must be valid
    for label in name.split('.') {
        if label.is_empty() || label.len() > 63 {
            return false;
        }

        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }

        // Alphanumeric and hyphens (underscores show up in real rankings).
        // Unicode labels are kept as-is; reqwest IDNA-encodes them when parsing the URL.
        if !label
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return false;
        }
    }

    true
}

/// Format a list of names with smart truncation ("a, b, ... and 3 more").
pub fn format_name_list(names: &[String], max_show: usize) -> String {
    if names.len() <= max_show {
        names.join(", ")
    } else {
        let shown = &names[..max_show];
        let remaining = names.len() - max_show;
        format!("{}, ... and {} more", shown.join(", "), remaining)
    }
}

/// Hosts belonging to the search provider's own infrastructure. URLs on these
/// hosts are thumbnails, logos or proxies rather than the original image.
pub static PROVIDER_HOSTS: &[&str] = &["google.", "gstatic.", "googleapis.", "googleusercontent."];

/// Returns true if `url` points at a third-party host.
pub fn is_external_image(url: &str) -> bool {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
    match host {
        Some(host) => !PROVIDER_HOSTS.iter().any(|&blocked| host.contains(blocked)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_hosts_are_rejected() {
        assert!(!is_external_image("https://encrypted-tbn0.gstatic.com/images?q=tbn:abc"));
        assert!(!is_external_image("https://www.google.com/logos/doodle.png"));
        assert!(!is_external_image("https://lh3.googleusercontent.com/x.jpg"));
    }

    #[test]
    fn test_third_party_hosts_pass() {
        assert!(is_external_image("https://upload.wikimedia.org/red_panda.jpg"));
        // Only the host is inspected, not the path.
        assert!(is_external_image("https://example.com/google.png"));
    }

    #[test]
    fn test_unparseable_url_is_rejected() {
        assert!(!is_external_image("not a url"));
    }
}

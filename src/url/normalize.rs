use url::Url;

/// Normalizes a URL into its identity key
///
/// # Normalization Steps
///
/// 1. Parse the URL; unparsable input is returned unchanged
/// 2. Lowercase the host (done by the parser for http/https)
/// 3. Remove the `www.` prefix from the host
/// 4. Remove the fragment
/// 5. Remove a single trailing slash from a non-root path
///
/// The scheme, port and query string are kept as-is. The result is only
/// meant for identity comparison; the original form of a URL is what gets
/// stored.
///
/// # Examples
///
/// ```
/// use skeleton_discovery::url::normalize;
///
/// assert_eq!(normalize("https://WWW.Example.com/about/#team"), "https://example.com/about");
/// assert_eq!(normalize("not a url"), "not a url");
/// ```
pub fn normalize(url_str: &str) -> String {
    let mut url = match Url::parse(url_str) {
        Ok(url) => url,
        Err(_) => return url_str.to_string(),
    };

    if let Some(host) = url.host_str() {
        let lowered = host.to_lowercase();
        if let Some(stripped) = lowered.strip_prefix("www.") {
            let stripped = stripped.to_string();
            if url.set_host(Some(&stripped)).is_err() {
                return url_str.to_string();
            }
        }
    }

    url.set_fragment(None);

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path[..path.len() - 1].to_string();
        url.set_path(&trimmed);
    }

    url.to_string()
}

/// Removes URLs that normalize to an already-seen key
///
/// Single pass, order-preserving; the first-seen original form is kept.
pub fn dedupe<S: AsRef<str>>(urls: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(urls.len());
    urls.iter()
        .filter(|url| seen.insert(normalize(url.as_ref())))
        .map(|url| url.as_ref().to_string())
        .collect()
}

/// Generic form of [`dedupe`] for records that carry a URL
pub fn dedupe_by<T, F>(items: Vec<T>, url_of: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(normalize(url_of(item))))
        .collect()
}

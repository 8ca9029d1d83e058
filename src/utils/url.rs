//! URL helpers for building API endpoints from a configured base URL.

/// Normalize a base URL by removing trailing slashes so endpoint
/// construction never produces double slashes.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path.
///
/// ```
/// use colloquy::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/", "v1/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

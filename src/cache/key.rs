//! Request fingerprints used as response cache keys

/// Identity used for callers without an authenticated user
pub const ANONYMOUS: &str = "anonymous";

/// Prefix marking an authenticated caller segment
const USER_TAG: &str = "user=";

/// Escape the characters that separate key segments and query pairs
fn escape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            _ => out.push(c),
        }
    }
    out
}

/// Build a deterministic cache key from a request.
///
/// Layout is `METHOD:path:query:caller`. Query parameters are sorted so that
/// parameter order never changes the key. The caller segment is `anonymous`
/// or `user=<id>`, so no user id can produce an anonymous key. Separator
/// characters inside the parts are percent-escaped.
pub fn fingerprint(
    method: &reqwest::Method,
    path: &str,
    query: &[(&str, &str)],
    caller: Option<&str>,
) -> String {
    let mut sorted_params: Vec<_> = query.iter().collect();
    sorted_params.sort();

    let query = sorted_params
        .iter()
        .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
        .collect::<Vec<_>>()
        .join("&");

    let caller = match caller {
        Some(id) => format!("{}{}", USER_TAG, escape(id)),
        None => ANONYMOUS.to_string(),
    };

    format!("{}:{}:{}:{}", method.as_str(), escape(path), query, caller)
}

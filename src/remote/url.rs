use std::fmt;

/// Normalized remote base URL.
///
/// Always carries a scheme (bare hosts get `http://`, which suits shops that
/// run the server on the local network) and always ends in `/` so relative
/// endpoint paths join predictably.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerUrl(String);

impl ServerUrl {
    /// Returns `None` for blank input, meaning "sync not configured".
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let scheme = ["http://", "https://"].into_iter().find(|scheme| {
            trimmed
                .get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        });
        let mut url = match scheme {
            Some(scheme) => format!("{}{}", scheme, &trimmed[scheme.len()..]),
            None => format!("http://{}", trimmed),
        };

        if !url.ends_with('/') {
            url.push('/');
        }

        Some(Self(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends a relative endpoint path, e.g. `repairs/12`.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.0, path.trim_start_matches('/'))
    }
}

impl fmt::Display for ServerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

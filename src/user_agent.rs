//! User-Agent strings for outgoing requests.
//!
//! Page fetches present a desktop browser UA; the tool UA only appears in
//! log lines.

/// Browser User-Agent sent with every page fetch.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/102.0.5005.63 Safari/537.36";

/// Tool identification, e.g. `magneto/0.1.0`.
#[must_use]
pub fn tool_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("magneto/{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_user_agent_looks_like_chrome() {
        assert!(BROWSER_USER_AGENT.starts_with("Mozilla/5.0 (Windows NT 10.0"));
        assert!(BROWSER_USER_AGENT.contains("Chrome/"));
        assert!(!BROWSER_USER_AGENT.contains("  "), "line continuation must not leave double spaces");
    }

    #[test]
    fn test_tool_user_agent_has_version() {
        assert_eq!(
            tool_user_agent(),
            format!("magneto/{}", env!("CARGO_PKG_VERSION"))
        );
    }
}

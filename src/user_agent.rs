//! User-Agent string sent with every backend request.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/vandersat/vds-client";

/// Default User-Agent for backend and resource requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("vds-client/{version} (+{PROJECT_UA_URL})")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_contains_version_and_project_url() {
        let ua = default_user_agent();
        assert!(ua.contains(PROJECT_UA_URL), "UA must contain project URL");
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("vds-client/")
                .and_then(|s| s.split(' ').next())
                .unwrap(),
            "UA must contain crate version"
        );
    }
}

use devflow_core::config::GatewayConfig;

/// Check a request's credentials against the configured token.
///
/// With no token configured every request is allowed. Otherwise a Bearer
/// header must match; without a header the `?token=` query is tried.
pub fn validate_auth(config: &GatewayConfig, bearer: Option<&str>, query_token: Option<&str>) -> bool {
    let Some(expected) = config.resolved_token() else {
        return true;
    };
    match bearer {
        Some(given) => given == expected,
        None => query_token == Some(expected),
    }
}

/// Extract token from the query string (?token=...).
pub fn extract_token_from_query(query: &str) -> Option<&str> {
    query.split('&').find_map(|pair| pair.strip_prefix("token="))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: Option<&str>) -> GatewayConfig {
        GatewayConfig {
            token: token.map(str::to_string),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn open_without_token() {
        assert!(validate_auth(&config(None), None, None));
        assert!(validate_auth(&config(None), Some("anything"), None));
    }

    #[test]
    fn bearer_must_match() {
        let cfg = config(Some("s3cret"));
        assert!(validate_auth(&cfg, Some("s3cret"), None));
        assert!(!validate_auth(&cfg, Some("wrong"), None));
        assert!(!validate_auth(&cfg, None, None));
        // A wrong header is not rescued by the query string.
        assert!(!validate_auth(&cfg, Some("wrong"), Some("s3cret")));
    }

    #[test]
    fn query_token() {
        let cfg = config(Some("s3cret"));
        assert_eq!(extract_token_from_query("format=entries&token=s3cret"), Some("s3cret"));
        assert_eq!(extract_token_from_query("format=entries"), None);
        assert!(validate_auth(&cfg, None, Some("s3cret")));
    }

    #[test]
    fn unexpanded_env_token_means_open() {
        assert!(validate_auth(&config(Some("${DEVFLOW_GATEWAY_TOKEN}")), None, None));
    }
}

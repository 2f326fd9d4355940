// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `transport.rs`

#[cfg(test)]
mod tests {
    use super::super::prefixed_uri;
    use crate::constants::REMOTE_API_PREFIX;
    use http::Uri;

    /// API paths get the gateway prefix prepended
    #[test]
    fn test_prefix_is_prepended() {
        let uri: Uri = "http://www.googleapis.com/apis/apps/v1/deployments"
            .parse()
            .unwrap();

        let rewritten = prefixed_uri(&uri, REMOTE_API_PREFIX).expect("rewrite should succeed");

        assert_eq!(
            rewritten.path(),
            "/apis/core.kubernetes/apis/apps/v1/deployments",
            "Prefix should be prepended to the original path"
        );
    }

    /// Query strings survive the rewrite
    #[test]
    fn test_prefix_preserves_query() {
        let uri: Uri = "http://www.googleapis.com/api/v1/pods?watch=true&resourceVersion=5"
            .parse()
            .unwrap();

        let rewritten = prefixed_uri(&uri, REMOTE_API_PREFIX).expect("rewrite should succeed");

        assert_eq!(rewritten.path(), "/apis/core.kubernetes/api/v1/pods");
        assert_eq!(
            rewritten.query(),
            Some("watch=true&resourceVersion=5"),
            "Query parameters must not be dropped"
        );
    }

    /// Paths that already carry the prefix are left alone
    #[test]
    fn test_prefix_not_doubled() {
        let uri: Uri = "https://www.googleapis.com/apis/core.kubernetes/api/v1/pods"
            .parse()
            .unwrap();

        let rewritten = prefixed_uri(&uri, REMOTE_API_PREFIX).expect("rewrite should succeed");

        assert_eq!(
            rewritten.path(),
            "/apis/core.kubernetes/api/v1/pods",
            "An already-prefixed path must not be prefixed again"
        );
    }

    /// The scheme is always forced to https
    #[test]
    fn test_scheme_forced_to_https() {
        let uri: Uri = "http://www.googleapis.com/api/v1/pods".parse().unwrap();

        let rewritten = prefixed_uri(&uri, REMOTE_API_PREFIX).expect("rewrite should succeed");

        assert_eq!(
            rewritten.scheme_str(),
            Some("https"),
            "Plain http should be upgraded to avoid a redirect round-trip"
        );
    }

    /// A bare authority rewrites to the prefix root
    #[test]
    fn test_prefix_on_root_path() {
        let uri: Uri = "http://www.googleapis.com/".parse().unwrap();

        let rewritten = prefixed_uri(&uri, REMOTE_API_PREFIX).expect("rewrite should succeed");

        assert_eq!(rewritten.path(), "/apis/core.kubernetes/");
    }
}

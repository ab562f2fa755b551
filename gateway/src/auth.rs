use axum::http::HeaderMap;

use crate::error::{GatewayError, GatewayResult};
use crate::registry::Namespace;

/// Gate a write/delete request on the namespace's Basic-Auth secret.
///
/// Namespaces without a secret admit everyone. The credential token is
/// compared against the pre-parsed secret as-is; a mismatch or missing
/// header yields 401 with a challenge naming the namespace.
pub fn check_basic_auth(namespace: &Namespace, headers: &HeaderMap) -> GatewayResult<()> {
    let Some(secret) = namespace.auth_secret.as_deref() else {
        return Ok(());
    };

    let supplied = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .map(str::trim);

    match supplied {
        Some(token) if token == secret => Ok(()),
        _ => Err(GatewayError::Unauthorized {
            realm: namespace.name.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use storage::SuccessPolicy;

    use super::*;

    fn namespace(secret: Option<&str>) -> Namespace {
        Namespace {
            name: "bar".to_string(),
            groups_count: 3,
            policy: SuccessPolicy::Quorum,
            auth_secret: secret.map(String::from),
        }
    }

    #[test]
    fn open_namespace_admits_everyone() {
        assert!(check_basic_auth(&namespace(None), &HeaderMap::new()).is_ok());
    }

    #[test]
    fn missing_header_is_challenged_with_realm() {
        let err = check_basic_auth(&namespace(Some("s3cret")), &HeaderMap::new()).unwrap_err();
        match err {
            GatewayError::Unauthorized { realm } => assert_eq!(realm, "bar"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn matching_token_passes() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic s3cret"));
        assert!(check_basic_auth(&namespace(Some("s3cret")), &headers).is_ok());
    }

    #[test]
    fn wrong_token_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic nope"));
        assert!(check_basic_auth(&namespace(Some("s3cret")), &headers).is_err());
    }
}

//! Session resolution for protected routes.
//!
//! The edge does not issue sessions, it only validates the signed cookie the
//! application set. Resolution is memoized in the request extensions so any
//! number of call sites pay for at most one signature check per request;
//! requests are driven on a single task, so the slot is written at most once.

use actix_web::{HttpMessage, HttpRequest};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SessionConfig;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// A validated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub expires_at: i64,
}

/// Memoized resolution outcome, stored in request extensions.
#[derive(Clone)]
struct ResolvedSession(Option<Session>);

pub struct SessionService {
    cookie_name: String,
    decoding_key: Option<DecodingKey>,
    validation: Validation,
    public_paths: Vec<String>,
}

impl SessionService {
    pub fn new(config: &SessionConfig) -> Self {
        let decoding_key = if config.jwt_secret.is_empty() {
            None
        } else {
            Some(DecodingKey::from_secret(config.jwt_secret.as_bytes()))
        };

        Self {
            cookie_name: config.cookie_name.clone(),
            decoding_key,
            validation: Validation::new(Algorithm::HS256),
            public_paths: config.public_paths.clone(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// True when the path is on the public allow-list and session resolution
    /// must be skipped. A trailing slash marks a prefix entry; bare `/`
    /// matches only itself.
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|entry| {
            if entry == "/" {
                path == "/"
            } else if entry.ends_with('/') {
                path.starts_with(entry.as_str())
            } else {
                path == entry
            }
        })
    }

    /// Resolves the session for this request, at most once per request.
    pub fn resolve(&self, req: &HttpRequest) -> Option<Session> {
        {
            let extensions = req.extensions();
            if let Some(cached) = extensions.get::<ResolvedSession>() {
                return cached.0.clone();
            }
        }

        let session = req
            .cookie(&self.cookie_name)
            .and_then(|cookie| self.validate_token(cookie.value()));

        req.extensions_mut()
            .insert(ResolvedSession(session.clone()));
        session
    }

    fn validate_token(&self, token: &str) -> Option<Session> {
        let key = self.decoding_key.as_ref()?;
        match jsonwebtoken::decode::<SessionClaims>(token, key, &self.validation) {
            Ok(data) => Some(Session {
                user_id: data.claims.sub,
                expires_at: data.claims.exp,
            }),
            Err(e) => {
                debug!("Session cookie rejected: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-session-secret";

    fn service() -> SessionService {
        SessionService::new(&SessionConfig {
            cookie_name: "lg_session".to_string(),
            jwt_secret: SECRET.to_string(),
            public_paths: vec![
                "/".to_string(),
                "/login".to_string(),
                "/api/auth/".to_string(),
            ],
        })
    }

    fn token_for(user_id: &str, secret: &str, ttl_secs: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + ttl_secs,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    // ============ token validation ============

    #[test]
    fn test_valid_cookie_resolves_session() {
        let service = service();
        let req = TestRequest::default()
            .cookie(Cookie::new("lg_session", token_for("user_1", SECRET, 3600)))
            .to_http_request();

        let session = service.resolve(&req).unwrap();
        assert_eq!(session.user_id, "user_1");
    }

    #[test]
    fn test_expired_cookie_is_rejected() {
        let service = service();
        let req = TestRequest::default()
            .cookie(Cookie::new("lg_session", token_for("user_1", SECRET, -3600)))
            .to_http_request();

        assert!(service.resolve(&req).is_none());
    }

    #[test]
    fn test_wrong_signature_is_rejected() {
        let service = service();
        let req = TestRequest::default()
            .cookie(Cookie::new(
                "lg_session",
                token_for("user_1", "other-secret", 3600),
            ))
            .to_http_request();

        assert!(service.resolve(&req).is_none());
    }

    #[test]
    fn test_missing_or_garbage_cookie_is_rejected() {
        let service = service();

        let bare = TestRequest::default().to_http_request();
        assert!(service.resolve(&bare).is_none());

        let garbage = TestRequest::default()
            .cookie(Cookie::new("lg_session", "not.a.jwt"))
            .to_http_request();
        assert!(service.resolve(&garbage).is_none());
    }

    #[test]
    fn test_empty_secret_disables_sessions() {
        let service = SessionService::new(&SessionConfig {
            cookie_name: "lg_session".to_string(),
            jwt_secret: String::new(),
            public_paths: vec![],
        });
        let req = TestRequest::default()
            .cookie(Cookie::new("lg_session", token_for("user_1", SECRET, 3600)))
            .to_http_request();

        assert!(service.resolve(&req).is_none());
    }

    // ============ per-request memoization ============

    #[test]
    fn test_resolution_is_memoized_per_request() {
        let service = service();
        let req = TestRequest::default()
            .cookie(Cookie::new("lg_session", token_for("user_1", SECRET, 3600)))
            .to_http_request();

        // Pre-seed the slot; a second resolve must consume it instead of
        // re-validating the cookie.
        req.extensions_mut().insert(ResolvedSession(Some(Session {
            user_id: "cached_user".to_string(),
            expires_at: 0,
        })));

        let session = service.resolve(&req).unwrap();
        assert_eq!(session.user_id, "cached_user");
    }

    // ============ public allow-list ============

    #[test]
    fn test_public_path_matching() {
        let service = service();
        let cases = vec![
            ("/", true),
            ("/login", true),
            ("/loginx", false),
            ("/api/auth/callback", true),
            ("/api/auth", false),
            ("/api/workspace/acme/analytics", false),
            ("/anything-else", false),
        ];
        for (path, expected) in cases {
            assert_eq!(service.is_public_path(path), expected, "path: {}", path);
        }
    }
}

// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use vda_model::Claims;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing_authorization_header")]
    MissingHeader,
    #[error("invalid_authorization_scheme")]
    InvalidScheme,
    #[error("invalid_token")]
    InvalidToken,
}

impl AuthError {
    #[must_use]
    pub fn status(self) -> axum::http::StatusCode {
        match self {
            // A malformed scheme is a caller bug, not a credential problem.
            Self::InvalidScheme => axum::http::StatusCode::BAD_REQUEST,
            Self::MissingHeader | Self::InvalidToken => axum::http::StatusCode::UNAUTHORIZED,
        }
    }
}

/// Static bearer-token table parsed from `token:tenant:subject` triples.
/// Read-only after construction, so sharing across tasks is free.
pub struct Authenticator {
    tokens: HashMap<String, Claims>,
}

impl Authenticator {
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let mut tokens = HashMap::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let fields: Vec<&str> = part.split(':').collect();
            if fields.len() < 2 {
                continue;
            }
            let token = fields[0].trim();
            let tenant_id = fields[1].trim();
            if token.is_empty() || tenant_id.is_empty() {
                continue;
            }
            let subject = fields.get(2).map(|s| s.trim()).filter(|s| !s.is_empty());
            tokens.insert(
                token.to_string(),
                Claims::new(tenant_id, subject.unwrap_or("unknown")),
            );
        }
        Self { tokens }
    }

    pub fn authenticate(&self, auth_header: &str) -> Result<Claims, AuthError> {
        let header = auth_header.trim();
        if header.is_empty() {
            return Err(AuthError::MissingHeader);
        }
        let Some((scheme, token)) = header.split_once(' ') else {
            return Err(AuthError::InvalidScheme);
        };
        if !scheme.eq_ignore_ascii_case("Bearer") {
            return Err(AuthError::InvalidScheme);
        }
        self.tokens
            .get(token.trim())
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthError, Authenticator};

    #[test]
    fn token_table_parses_triples_and_defaults_subject() {
        let auth = Authenticator::new("tok-a:t_acme:alice, tok-b:t_beta ,broken, :t_x:s");
        let claims = auth.authenticate("Bearer tok-a").expect("claims");
        assert_eq!(claims.tenant_id, "t_acme");
        assert_eq!(claims.subject, "alice");

        let claims = auth.authenticate("bearer tok-b").expect("claims");
        assert_eq!(claims.tenant_id, "t_beta");
        assert_eq!(claims.subject, "unknown");
    }

    #[test]
    fn error_taxonomy_matches_header_shape() {
        let auth = Authenticator::new("tok-a:t_acme");
        assert_eq!(auth.authenticate(""), Err(AuthError::MissingHeader));
        assert_eq!(auth.authenticate("tok-a"), Err(AuthError::InvalidScheme));
        assert_eq!(auth.authenticate("Basic tok-a"), Err(AuthError::InvalidScheme));
        assert_eq!(auth.authenticate("Bearer nope"), Err(AuthError::InvalidToken));
    }
}

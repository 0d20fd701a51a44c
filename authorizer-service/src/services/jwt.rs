use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;

use super::error::ServiceError;
use super::keys::{Jwks, SigningKeys};
use crate::models::ClaimsEnvelope;

const REFRESH_TOKEN_BYTES: usize = 32;

/// Signs and verifies access tokens with the process signing key.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<SigningKeys>,
    issuer: String,
}

impl TokenService {
    pub fn new(keys: Arc<SigningKeys>, issuer: String) -> Self {
        tracing::info!(kid = %keys.kid(), issuer = %issuer, "Token service initialized with RS256 key");
        Self { keys, issuer }
    }

    pub fn key_id(&self) -> &str {
        self.keys.kid()
    }

    pub fn jwks(&self) -> Jwks {
        self.keys.jwks()
    }

    /// Sign `claims` as an RS256 JWS carrying the key id in its header.
    pub fn issue(&self, claims: &ClaimsEnvelope) -> Result<String, ServiceError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.keys.kid().to_string());

        encode(&header, claims, self.keys.encoding_key())
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
    }

    /// Verify signature, issuer and expiry. Only RS256 is accepted and there
    /// is no leeway on `exp`.
    pub fn validate(&self, token: &str) -> Result<ClaimsEnvelope, ServiceError> {
        let header = decode_header(token).map_err(|e| {
            tracing::debug!(reason = ?e.kind(), "Malformed token header");
            ServiceError::InvalidToken
        })?;

        if let Some(kid) = header.kid.as_deref() {
            if kid != self.keys.kid() {
                tracing::debug!(kid = %kid, "Token signed by unknown key");
                return Err(ServiceError::InvalidToken);
            }
        }

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);

        decode::<ClaimsEnvelope>(token, self.keys.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(reason = ?e.kind(), "Token validation failed");
                ServiceError::InvalidToken
            })
    }

    /// 32 random bytes, base64url without padding. Opaque to clients.
    pub fn generate_refresh_token() -> String {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthorizationEntry;
    use crate::services::keys::tests::TEST_PRIVATE_KEY;
    use chrono::Utc;
    use jsonwebtoken::EncodingKey;

    fn token_service() -> Result<TokenService, anyhow::Error> {
        Ok(TokenService::new(
            Arc::new(SigningKeys::from_pem(TEST_PRIVATE_KEY)?),
            "authorizer".to_string(),
        ))
    }

    fn claims(iat: i64, exp: i64) -> ClaimsEnvelope {
        ClaimsEnvelope {
            iss: "authorizer".to_string(),
            sub: uuid::Uuid::now_v7().to_string(),
            aud: vec!["BILLING".to_string()],
            iat,
            exp,
            username: "jdoe".to_string(),
            email: "jdoe@example.com".to_string(),
            authorization: vec![AuthorizationEntry {
                app: "BILLING".to_string(),
                roles: vec!["clerk".to_string()],
                permissions: vec!["invoice.read".to_string()],
            }],
        }
    }

    fn fresh_claims() -> ClaimsEnvelope {
        let now = Utc::now().timestamp();
        claims(now, now + 3600)
    }

    #[test]
    fn test_issue_and_validate() -> Result<(), anyhow::Error> {
        let service = token_service()?;
        let original = fresh_claims();

        let token = service.issue(&original)?;
        let decoded = service.validate(&token)?;

        assert_eq!(decoded, original);
        Ok(())
    }

    #[test]
    fn test_header_carries_kid() -> Result<(), anyhow::Error> {
        let service = token_service()?;
        let token = service.issue(&fresh_claims())?;

        let header = decode_header(&token)?;
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some(service.key_id()));
        assert_eq!(service.jwks().keys[0].kid, service.key_id());
        Ok(())
    }

    #[test]
    fn test_tampered_signature_is_rejected() -> Result<(), anyhow::Error> {
        let service = token_service()?;
        let token = service.issue(&fresh_claims())?;

        let signature_start = token.rfind('.').unwrap() + 1;
        let target = signature_start + (token.len() - signature_start) / 2;
        let mut bytes = token.into_bytes();
        bytes[target] = if bytes[target] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes)?;

        assert!(matches!(
            service.validate(&tampered),
            Err(ServiceError::InvalidToken)
        ));
        Ok(())
    }

    #[test]
    fn test_tampered_payload_is_rejected() -> Result<(), anyhow::Error> {
        let service = token_service()?;
        let token = service.issue(&fresh_claims())?;
        let parts: Vec<&str> = token.split('.').collect();

        let mut escalated = fresh_claims();
        escalated.authorization[0].permissions.push("invoice.write".to_string());
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&escalated)?);
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(service.validate(&forged).is_err());
        Ok(())
    }

    #[test]
    fn test_expired_token_is_rejected() -> Result<(), anyhow::Error> {
        let service = token_service()?;
        let now = Utc::now().timestamp();
        let token = service.issue(&claims(now - 7200, now - 1))?;

        assert!(matches!(
            service.validate(&token),
            Err(ServiceError::InvalidToken)
        ));
        Ok(())
    }

    #[test]
    fn test_hs256_is_rejected() -> Result<(), anyhow::Error> {
        let service = token_service()?;
        let jwk = service.jwks().keys[0].clone();

        // Classic key-confusion attempt: HMAC keyed with the public modulus.
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(jwk.kid.clone());
        let forged = encode(
            &header,
            &fresh_claims(),
            &EncodingKey::from_secret(jwk.n.as_bytes()),
        )?;

        assert!(matches!(
            service.validate(&forged),
            Err(ServiceError::InvalidToken)
        ));
        Ok(())
    }

    #[test]
    fn test_foreign_kid_is_rejected() -> Result<(), anyhow::Error> {
        let service = token_service()?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("someone-else".to_string());
        let token = encode(&header, &fresh_claims(), service.keys.encoding_key())?;

        assert!(service.validate(&token).is_err());
        Ok(())
    }

    #[test]
    fn test_foreign_issuer_is_rejected() -> Result<(), anyhow::Error> {
        let service = token_service()?;
        let mut foreign = fresh_claims();
        foreign.iss = "someone-else".to_string();
        let token = service.issue(&foreign)?;

        assert!(matches!(
            service.validate(&token),
            Err(ServiceError::InvalidToken)
        ));
        Ok(())
    }

    #[test]
    fn test_garbage_is_rejected() -> Result<(), anyhow::Error> {
        let service = token_service()?;
        assert!(service.validate("").is_err());
        assert!(service.validate("not.a.jwt").is_err());
        Ok(())
    }

    #[test]
    fn test_refresh_tokens_are_random_and_url_safe() -> Result<(), anyhow::Error> {
        let first = TokenService::generate_refresh_token();
        let second = TokenService::generate_refresh_token();

        assert_ne!(first, second);
        assert_eq!(URL_SAFE_NO_PAD.decode(&first)?.len(), REFRESH_TOKEN_BYTES);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        Ok(())
    }
}

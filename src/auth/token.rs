use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// What a token authorizes. Tokens issued for one purpose are never
/// accepted for another.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    Confirm,
    Reset,
    ChangeEmail,
    Session,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub purpose: Purpose,
    pub sub: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_email: Option<String>,
    pub iat: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Signature, encoding or payload shape did not check out.
    BadSignature,
    Expired,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::BadSignature => write!(f, "bad signature"),
            TokenError::Expired => write!(f, "token expired"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Signs and verifies HS256 tokens with the process secret.
///
/// Expiry is not baked into the token: the caller supplies a max age at
/// decode time and the token is checked against its issue time.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate(
        &self,
        purpose: Purpose,
        subject_id: i64,
        new_email: Option<&str>,
    ) -> Result<String, String> {
        self.generate_at(purpose, subject_id, new_email, Utc::now())
    }

    pub fn generate_at(
        &self,
        purpose: Purpose,
        subject_id: i64,
        new_email: Option<&str>,
        issued_at: DateTime<Utc>,
    ) -> Result<String, String> {
        let claims = TokenClaims {
            purpose,
            sub: subject_id,
            new_email: new_email.map(str::to_string),
            iat: issued_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| format!("Token encode failed: {e}"))?;
        tracing::debug!(user_id = subject_id, purpose = ?purpose, "token signed");
        Ok(token)
    }

    pub fn decode(&self, token: &str, max_age: Duration) -> Result<TokenClaims, TokenError> {
        self.decode_at(token, max_age, Utc::now())
    }

    pub fn decode_at(
        &self,
        token: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        let claims = decode::<TokenClaims>(token, &self.decoding, &validation())
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                TokenError::BadSignature
            })?;

        let age = now.timestamp().saturating_sub(claims.iat);
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        if age > max_age {
            tracing::debug!(user_id = claims.sub, age, "token expired");
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

// Expiry is checked against `iat` by the codec itself, so the registered
// `exp` claim is neither required nor validated.
fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    const HOUR: Duration = Duration::from_secs(3600);

    fn codec() -> TokenCodec {
        TokenCodec::new("test-secret-key")
    }

    #[test]
    fn generate_and_decode_carries_all_fields() {
        let codec = codec();
        let token = codec
            .generate(Purpose::ChangeEmail, 42, Some("new@example.com"))
            .unwrap();
        let claims = codec.decode(&token, HOUR).unwrap();
        assert_eq!(claims.purpose, Purpose::ChangeEmail);
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.new_email.as_deref(), Some("new@example.com"));
    }

    #[test]
    fn token_is_url_safe_ascii() {
        let token = codec().generate(Purpose::Confirm, 7, None).unwrap();
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        );
    }

    #[test]
    fn wrong_secret_is_bad_signature() {
        let token = codec().generate(Purpose::Confirm, 1, None).unwrap();
        let other = TokenCodec::new("a-different-secret");
        assert_eq!(other.decode(&token, HOUR), Err(TokenError::BadSignature));
    }

    #[test]
    fn appended_character_is_bad_signature() {
        let token = codec().generate(Purpose::Reset, 1, None).unwrap();
        let tampered = format!("{token}a");
        assert_eq!(codec().decode(&tampered, HOUR), Err(TokenError::BadSignature));
    }

    #[test]
    fn altered_payload_is_bad_signature() {
        let codec = codec();
        let token = codec.generate(Purpose::Reset, 1, None).unwrap();
        let forged_payload = codec.generate(Purpose::Reset, 2, None).unwrap();

        // Splice the payload of a token for user 2 onto the signature of user 1.
        let parts: Vec<&str> = token.split('.').collect();
        let forged: Vec<&str> = forged_payload.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged[1], parts[2]);
        assert_eq!(codec.decode(&spliced, HOUR), Err(TokenError::BadSignature));
    }

    #[test]
    fn garbage_is_bad_signature() {
        assert_eq!(codec().decode("", HOUR), Err(TokenError::BadSignature));
        assert_eq!(
            codec().decode("not.a.token", HOUR),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn expired_after_max_age() {
        let codec = codec();
        let issued = Utc::now();
        let token = codec.generate_at(Purpose::Confirm, 1, None, issued).unwrap();

        let max_age = Duration::from_secs(1);
        assert!(codec.decode_at(&token, max_age, issued).is_ok());
        assert!(
            codec
                .decode_at(&token, max_age, issued + ChronoDuration::seconds(1))
                .is_ok()
        );
        assert_eq!(
            codec.decode_at(&token, max_age, issued + ChronoDuration::seconds(2)),
            Err(TokenError::Expired)
        );
    }

    #[tokio::test]
    async fn expires_in_real_time() {
        let codec = codec();
        let token = codec.generate(Purpose::Confirm, 1, None).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            codec.decode(&token, Duration::from_secs(1)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn tokens_without_new_email_omit_it() {
        let codec = codec();
        let token = codec.generate(Purpose::Confirm, 5, None).unwrap();
        let claims = codec.decode(&token, HOUR).unwrap();
        assert_eq!(claims.new_email, None);
    }
}

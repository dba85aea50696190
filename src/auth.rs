//! Upload token authentication.
//!
//! Clients authenticate with an HTTP Basic `Authorization` header whose
//! username is the upload token.  The password half is ignored.  The token
//! is accepted if it is a member of the configured token set; there is no
//! hashing, expiry or lockout.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use subtle::ConstantTimeEq;

use crate::errors::UploadError;

// ── Token set ───────────────────────────────────────────────────────

/// The set of accepted upload tokens, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct TokenSet {
    tokens: Vec<String>,
}

impl TokenSet {
    /// Build a token set, dropping blank entries and duplicates.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set: Vec<String> = Vec::new();
        for token in tokens {
            let token = token.into();
            if !token.is_empty() && !set.contains(&token) {
                set.push(token);
            }
        }
        Self { tokens: set }
    }

    /// Exact membership test.  Each candidate is compared in constant time.
    pub fn contains(&self, candidate: &str) -> bool {
        self.tokens
            .iter()
            .fold(false, |found, token| found | constant_time_eq(token, candidate))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Constant-time string comparison.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

// ── Authorization header parsing ────────────────────────────────────

/// Extract the username from a `Basic` credential.
///
/// The decoded value is split at its first `:`; without one, the whole
/// value is the username.  Returns `None` if the header is not a Basic
/// credential, is not valid base64, or is not UTF-8.
pub fn parse_basic_username(header: &str) -> Option<String> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let username = decoded
        .split_once(':')
        .map_or(decoded.as_str(), |(username, _password)| username);
    Some(username.to_string())
}

// ── Verification ────────────────────────────────────────────────────

/// Authenticate a request from its raw `Authorization` header value.
///
/// An absent or blank header is `NoAuth`.  Any other header that does not
/// carry an accepted token is `BadAuth`, including non-Basic schemes and
/// undecodable credentials.  On success the token is returned for logging.
pub fn authenticate(tokens: &TokenSet, header: Option<&str>) -> Result<String, UploadError> {
    let header = header
        .filter(|h| !h.trim().is_empty())
        .ok_or(UploadError::NoAuth)?;

    match parse_basic_username(header) {
        Some(username) if tokens.contains(&username) => Ok(username),
        _ => Err(UploadError::BadAuth),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
    }

    #[test]
    fn test_parse_basic_username() {
        assert_eq!(
            parse_basic_username(&basic("token", "")),
            Some("token".to_string())
        );
        assert_eq!(
            parse_basic_username(&basic("token", "ignored:with:colons")),
            Some("token".to_string())
        );
    }

    #[test]
    fn test_parse_basic_scheme_case_insensitive() {
        let header = basic("token", "x").replacen("Basic", "bAsIc", 1);
        assert_eq!(parse_basic_username(&header), Some("token".to_string()));
    }

    #[test]
    fn test_parse_basic_rejects_other_schemes() {
        assert_eq!(parse_basic_username("Bearer token"), None);
        assert_eq!(parse_basic_username("Basic"), None);
        assert_eq!(parse_basic_username("Basic !!!not-base64!!!"), None);
    }

    #[test]
    fn test_parse_basic_without_separator() {
        let header = format!("Basic {}", STANDARD.encode("token"));
        assert_eq!(parse_basic_username(&header), Some("token".to_string()));
    }

    #[test]
    fn test_token_set_membership() {
        let tokens = TokenSet::new(["token", "other", "", "token"]);
        assert_eq!(tokens.len(), 2);
        assert!(tokens.contains("token"));
        assert!(tokens.contains("other"));
        assert!(!tokens.contains("toke"));
        assert!(!tokens.contains("TOKEN"));
        assert!(!tokens.contains(""));
    }

    #[test]
    fn test_authenticate_no_header() {
        let tokens = TokenSet::new(["token"]);
        assert!(matches!(
            authenticate(&tokens, None),
            Err(UploadError::NoAuth)
        ));
        assert!(matches!(
            authenticate(&tokens, Some("  ")),
            Err(UploadError::NoAuth)
        ));
    }

    #[test]
    fn test_authenticate_unusable_header_is_bad_auth() {
        let tokens = TokenSet::new(["token"]);
        for header in ["Bearer token", "Basic", "Basic !!!not-base64!!!", "token"] {
            assert!(
                matches!(authenticate(&tokens, Some(header)), Err(UploadError::BadAuth)),
                "{header}"
            );
        }
    }

    #[test]
    fn test_authenticate_bare_username() {
        let tokens = TokenSet::new(["token"]);
        let header = format!("Basic {}", STANDARD.encode("token"));
        assert_eq!(authenticate(&tokens, Some(&header)).unwrap(), "token");
    }

    #[test]
    fn test_authenticate_bad_token() {
        let tokens = TokenSet::new(["token"]);
        let header = basic("wtfbbq", "");
        assert!(matches!(
            authenticate(&tokens, Some(&header)),
            Err(UploadError::BadAuth)
        ));
    }

    #[test]
    fn test_authenticate_ok_ignores_password() {
        let tokens = TokenSet::new(["token"]);
        let header = basic("token", "anything");
        assert_eq!(authenticate(&tokens, Some(&header)).unwrap(), "token");
    }

    #[test]
    fn test_empty_token_set_rejects_everyone() {
        let tokens = TokenSet::default();
        let header = basic("", "");
        assert!(matches!(
            authenticate(&tokens, Some(&header)),
            Err(UploadError::BadAuth)
        ));
    }
}

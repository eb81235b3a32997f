use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const SCHEME: &str = "Basic";

/// A name/password pair, as configured on the server or presented by a
/// client in the `Authorization` header.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub name: String,
    pub password: String,
}

impl Credentials {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            name: name.into(),
            password: password.into(),
        }
    }

    /// Parses `name:password`, splitting at the first colon.
    pub fn parse_pair(pair: &str) -> Option<Self> {
        let (name, password) = pair.split_once(':')?;
        Some(Credentials::new(name, password))
    }

    pub fn to_header_value(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.name, self.password));
        format!("{SCHEME} {token}")
    }

    /// Decodes a basic-auth header value. Returns `None` for any other
    /// scheme or a malformed token.
    pub fn from_header_value(value: &str) -> Option<Self> {
        let (scheme, token) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return None;
        }
        let decoded = STANDARD.decode(token.trim()).ok()?;
        let pair = String::from_utf8(decoded).ok()?;
        Credentials::parse_pair(&pair)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let creds = Credentials::new("alice", "s3cr:et");
        let header = creds.to_header_value();
        assert!(header.starts_with("Basic "));
        assert_eq!(Credentials::from_header_value(&header), Some(creds));
    }

    #[test]
    fn test_known_encoding() {
        let creds = Credentials::new("Aladdin", "open sesame");
        assert_eq!(creds.to_header_value(), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
    }

    #[test]
    fn test_malformed_headers() {
        assert_eq!(Credentials::from_header_value("Bearer abc"), None);
        assert_eq!(Credentials::from_header_value("Basic !!!"), None);
        // "nocolon" base64-encoded
        assert_eq!(Credentials::from_header_value("Basic bm9jb2xvbg=="), None);
        assert_eq!(Credentials::from_header_value(""), None);
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let header = Credentials::new("u", "p").to_header_value().replace("Basic", "basic");
        assert_eq!(
            Credentials::from_header_value(&header),
            Some(Credentials::new("u", "p"))
        );
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            Credentials::parse_pair("bob:pa:ss"),
            Some(Credentials::new("bob", "pa:ss"))
        );
        assert_eq!(Credentials::parse_pair("bob"), None);
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("bob", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}

// ABOUTME: Session-scoped channel address: {ws|wss}://{host}/ws/{sessionId}.
// ABOUTME: Can be derived from an http(s) origin so the scheme mirrors the origin.

use crate::error::SessionError;
use std::fmt;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAddress {
    host: String,
    secure: bool,
    session_id: String,
}

impl ChannelAddress {
    /// Build an address from a bare host (optionally with port)
    pub fn new(host: &str, secure: bool, session_id: &str) -> Result<Self, SessionError> {
        let host = host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(SessionError::InvalidAddress("host is empty".to_string()));
        }
        if host.contains("://") {
            return Err(SessionError::InvalidAddress(format!(
                "host '{}' must not include a scheme; use from_origin instead",
                host
            )));
        }
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(SessionError::InvalidAddress(
                "session id is empty".to_string(),
            ));
        }
        Ok(Self {
            host: host.to_string(),
            secure,
            session_id: session_id.to_string(),
        })
    }

    /// Build an address from a page origin such as `https://agent.example.com`
    pub fn from_origin(origin: &str, session_id: &str) -> Result<Self, SessionError> {
        let url = Url::parse(origin)
            .map_err(|e| SessionError::InvalidAddress(format!("bad origin '{}': {}", origin, e)))?;

        let secure = match url.scheme() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => {
                return Err(SessionError::InvalidAddress(format!(
                    "unsupported origin scheme '{}'",
                    other
                )))
            }
        };

        let host = url
            .host_str()
            .ok_or_else(|| SessionError::InvalidAddress(format!("origin '{}' has no host", origin)))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Self::new(&host, secure, session_id)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}/ws/{}", scheme, self.host, self.session_id)
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_secure_urls() {
        let plain = ChannelAddress::new("localhost:8000", false, "abc").unwrap();
        assert_eq!(plain.url(), "ws://localhost:8000/ws/abc");

        let secure = ChannelAddress::new("agent.example.com/", true, "abc").unwrap();
        assert_eq!(secure.url(), "wss://agent.example.com/ws/abc");
    }

    #[test]
    fn test_origin_scheme_is_mirrored() {
        let https = ChannelAddress::from_origin("https://agent.example.com", "s1").unwrap();
        assert_eq!(https.url(), "wss://agent.example.com/ws/s1");

        let http = ChannelAddress::from_origin("http://127.0.0.1:8000/app", "s1").unwrap();
        assert_eq!(http.url(), "ws://127.0.0.1:8000/ws/s1");
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(ChannelAddress::new("", false, "s1").is_err());
        assert!(ChannelAddress::new("host", false, "  ").is_err());
        assert!(ChannelAddress::new("http://host", false, "s1").is_err());
        assert!(ChannelAddress::from_origin("ftp://host", "s1").is_err());
        assert!(ChannelAddress::from_origin("not a url", "s1").is_err());
    }
}

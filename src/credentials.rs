//! Connection credentials and the options derived from them.
//!
//! [`Credentials`] is the input a client supplies when it first connects a
//! session. It deserializes from the gateway's JSON credential object:
//!
//! ```
//! use chatgate::credentials::{AuthMethod, Credentials};
//!
//! let credentials: Credentials = serde_json::from_str(
//!     r#"{"nick":"alice","host":"irc.example.org","secure":true,
//!        "authMethod":"sasl-plain","authSecret":"hunter2"}"#,
//! )
//! .expect("valid credentials");
//! let options = credentials.connect_options();
//! assert_eq!(options.port, 6697);
//! assert_eq!(options.auth.map(|auth| auth.method), Some(AuthMethod::SaslPlain));
//! ```

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// Well-known port for TLS connections.
pub const DEFAULT_SECURE_PORT: u16 = 6697;
/// Well-known port for plaintext connections.
pub const DEFAULT_INSECURE_PORT: u16 = 6667;

/// Credentials for one backend identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Nick to register with.
    #[serde(alias = "identity")]
    pub nick: String,
    /// Real name sent during registration; defaults to the nick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    /// Backend host name.
    #[serde(alias = "server")]
    pub host: String,
    /// Port; defaults by the `secure` flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Connect over TLS.
    #[serde(default, alias = "secureTransport")]
    pub secure: bool,
    /// How to authenticate; `password` when only a secret is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<AuthMethod>,
    /// Connection or account password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("nick", &self.nick)
            .field("real_name", &self.real_name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("auth_method", &self.auth_method)
            .field("auth_secret", &self.auth_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Credentials for `nick` on `host` with every option at its default.
    #[must_use]
    pub fn new(nick: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            real_name: None,
            host: host.into(),
            port: None,
            secure: false,
            auth_method: None,
            auth_secret: None,
        }
    }

    /// Identifier of the person these credentials act as (`nick@host`).
    #[must_use]
    pub fn actor_id(&self) -> String { format!("{}@{}", self.nick, self.host) }

    /// Resolve defaults into the options used to open a connection.
    #[must_use]
    pub fn connect_options(&self) -> ConnectOptions {
        let port = self.port.unwrap_or(if self.secure {
            DEFAULT_SECURE_PORT
        } else {
            DEFAULT_INSECURE_PORT
        });
        let auth = self
            .auth_secret
            .as_ref()
            .filter(|secret| !secret.is_empty())
            .map(|secret| Auth {
                method: self.auth_method.unwrap_or(AuthMethod::Password),
                secret: secret.clone(),
            });
        ConnectOptions {
            nick: self.nick.clone(),
            real_name: self.real_name.clone().unwrap_or_else(|| self.nick.clone()),
            host: self.host.clone(),
            port,
            secure: self.secure,
            auth,
        }
    }
}

/// How the connection authenticates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    /// `PASS` before registration.
    Password,
    /// SASL `PLAIN` during capability negotiation.
    SaslPlain,
}

/// Authentication method with its secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Auth {
    /// Method to use.
    pub method: AuthMethod,
    /// Password.
    pub secret: String,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("method", &self.method)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Fully resolved options for opening and registering a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Nick to register.
    pub nick: String,
    /// Real name for the `USER` record.
    pub real_name: String,
    /// Host to connect to; also qualifies every identity.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Wrap the connection in TLS.
    pub secure: bool,
    /// Optional authentication.
    pub auth: Option<Auth>,
}

impl ConnectOptions {
    /// Base64 SASL `PLAIN` payload: `authzid NUL authcid NUL password`.
    #[must_use]
    pub fn sasl_plain_payload(&self) -> Option<String> {
        let auth = self.auth.as_ref().filter(|auth| auth.method == AuthMethod::SaslPlain)?;
        let raw = format!("{nick}\0{nick}\0{}", auth.secret, nick = self.nick);
        Some(STANDARD.encode(raw))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(false, None, DEFAULT_INSECURE_PORT)]
    #[case(true, None, DEFAULT_SECURE_PORT)]
    #[case(true, Some(7000), 7000)]
    fn port_defaults_follow_secure_flag(
        #[case] secure: bool,
        #[case] port: Option<u16>,
        #[case] expected: u16,
    ) {
        let mut credentials = Credentials::new("alice", "irc.example.org");
        credentials.secure = secure;
        credentials.port = port;
        assert_eq!(credentials.connect_options().port, expected);
    }

    #[test]
    fn real_name_defaults_to_nick() {
        let options = Credentials::new("alice", "irc.example.org").connect_options();
        assert_eq!(options.real_name, "alice");
        assert!(options.auth.is_none());
    }

    #[test]
    fn password_without_sasl_uses_pass() {
        let mut credentials = Credentials::new("alice", "irc.example.org");
        credentials.auth_secret = Some("secret".into());
        let options = credentials.connect_options();
        assert_eq!(options.auth.map(|auth| auth.method), Some(AuthMethod::Password));
    }

    #[test]
    fn sasl_payload_is_base64_plain() {
        let mut credentials = Credentials::new("alice", "irc.example.org");
        credentials.auth_method = Some(AuthMethod::SaslPlain);
        credentials.auth_secret = Some("pw".into());
        let payload = credentials
            .connect_options()
            .sasl_plain_payload()
            .expect("sasl payload");
        let decoded = STANDARD.decode(payload).expect("valid base64");
        assert_eq!(decoded, b"alice\0alice\0pw");
    }

    #[test]
    fn debug_output_redacts_secret() {
        let auth = Auth {
            method: AuthMethod::Password,
            secret: "hunter2".into(),
        };
        assert!(!format!("{auth:?}").contains("hunter2"));
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let mut credentials = Credentials::new("alice", "irc.example.org");
        credentials.auth_secret = Some("hunter2".into());
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("alice"));
    }

    #[test]
    fn accepts_identity_and_server_aliases() {
        let credentials: Credentials = serde_json::from_str(
            r#"{"identity":"bob","server":"irc.example.org","secureTransport":true}"#,
        )
        .expect("valid credentials");
        assert_eq!(credentials.nick, "bob");
        assert_eq!(credentials.host, "irc.example.org");
        assert!(credentials.secure);
    }

    #[test]
    fn actor_id_joins_nick_and_host() {
        assert_eq!(
            Credentials::new("alice", "irc.example.org").actor_id(),
            "alice@irc.example.org"
        );
    }
}

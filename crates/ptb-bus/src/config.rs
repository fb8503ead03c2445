use std::path::PathBuf;
use std::time::Duration;

/// Default bound on connecting to the broker and flushing one publish.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    #[default]
    Plain,
    Tls,
}

impl TransportSecurity {
    /// Maps the configured protocol label; `ssl`, `tls`, `mqtts` and `nats+tls`
    /// select TLS, anything else stays plain.
    pub fn from_label(label: Option<&str>) -> Self {
        match label
            .map(|value| value.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("ssl" | "tls" | "mqtts" | "nats+tls") => TransportSecurity::Tls,
            _ => TransportSecurity::Plain,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BrokerCredentials {
    pub username: String,
    pub password: String,
}

impl BrokerCredentials {
    /// Credentials are only used when both parts are present and non-empty.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        let username = username.filter(|value| !value.is_empty())?;
        let password = password.filter(|value| !value.is_empty())?;
        Some(Self { username, password })
    }
}

impl std::fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection settings bound into the publisher at startup.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub security: TransportSecurity,
    pub credentials: Option<BrokerCredentials>,
    pub ca_path: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 4222,
            security: TransportSecurity::Plain,
            credentials: None,
            ca_path: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl BrokerConfig {
    pub fn server_url(&self) -> String {
        let scheme = match self.security {
            TransportSecurity::Plain => "nats",
            TransportSecurity::Tls => "tls",
        };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_labels_select_secured_transport() {
        assert_eq!(TransportSecurity::from_label(Some("SSL")), TransportSecurity::Tls);
        assert_eq!(TransportSecurity::from_label(Some(" tls ")), TransportSecurity::Tls);
        assert_eq!(TransportSecurity::from_label(Some("tcp")), TransportSecurity::Plain);
        assert_eq!(TransportSecurity::from_label(None), TransportSecurity::Plain);
    }

    #[test]
    fn credentials_need_both_parts() {
        assert!(BrokerCredentials::from_parts(Some("pos".into()), None).is_none());
        assert!(BrokerCredentials::from_parts(Some("pos".into()), Some(String::new())).is_none());
        let creds = BrokerCredentials::from_parts(Some("pos".into()), Some("s3cret".into())).unwrap();
        assert!(!format!("{creds:?}").contains("s3cret"));
    }

    #[test]
    fn server_url_reflects_security() {
        let mut cfg = BrokerConfig {
            host: "broker.local".into(),
            port: 8883,
            ..Default::default()
        };
        assert_eq!(cfg.server_url(), "nats://broker.local:8883");
        cfg.security = TransportSecurity::Tls;
        assert_eq!(cfg.server_url(), "tls://broker.local:8883");
    }
}

//! Connection options.

use std::str::FromStr;

use url::Url;

use crate::error::Error;

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// SSL connection mode, with the same meaning as libpq's `sslmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Don't use SSL
    Disable,
    /// Connect without SSL; accepted for compatibility
    Allow,
    /// Try SSL, fall back to unencrypted if not supported
    #[default]
    Prefer,
    /// Require SSL connection
    Require,
    /// Require SSL and verify the server certificate chain
    VerifyCa,
    /// Require SSL, verify the certificate chain and the host name
    VerifyFull,
}

impl SslMode {
    /// Value used in a connection string.
    pub fn as_str(self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// Whether an SSLRequest is sent before the startup message.
    pub fn should_try_ssl(self) -> bool {
        !matches!(self, SslMode::Disable | SslMode::Allow)
    }

    /// Whether a server refusing SSL aborts the connection.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull
        )
    }

    /// Whether the server certificate chain is verified.
    pub fn verifies_certificate(self) -> bool {
        matches!(self, SslMode::VerifyCa | SslMode::VerifyFull)
    }
}

impl FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" | "verify_ca" => Ok(SslMode::VerifyCa),
            "verify-full" | "verify_full" => Ok(SslMode::VerifyFull),
            _ => Err(Error::InvalidUsage(format!(
                "Invalid sslmode: expected one of ['disable', 'allow', 'prefer', 'require', 'verify-ca', 'verify-full'], got {}",
                s
            ))),
        }
    }
}

/// Connection options for PostgreSQL.
///
/// String fields left empty and numeric fields left at zero are not sent.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Hostname, or a directory for a Unix-domain socket.
    ///
    /// Default: `""`
    pub host: String,

    /// Numeric IP address, used instead of resolving `host`.
    ///
    /// Default: `""`
    pub hostaddr: String,

    /// Port number for the PostgreSQL server.
    ///
    /// Default: `5432`
    pub port: u16,

    /// Database name to use.
    ///
    /// Default: `""`
    pub dbname: String,

    /// Username for authentication.
    ///
    /// Default: `""`
    pub user: String,

    /// Password for authentication.
    ///
    /// Default: `""`
    pub password: String,

    /// Connect timeout in seconds, 0 waits indefinitely.
    ///
    /// Default: `0`
    pub connect_timeout: u32,

    /// Client encoding.
    ///
    /// Default: `""`
    pub client_encoding: String,

    /// Command-line options sent to the server at startup.
    ///
    /// Default: `""`
    pub options: String,

    /// Application name to report to the server.
    ///
    /// Default: `""`
    pub application_name: String,

    /// Application name used when `application_name` is empty.
    ///
    /// Default: `""`
    pub fallback_application_name: String,

    /// Use TCP keepalives.
    ///
    /// Default: `true`
    pub keepalives: bool,

    /// Seconds of inactivity before a keepalive is sent.
    ///
    /// Default: `0` (system default)
    pub keepalives_idle: u32,

    /// Seconds between unacknowledged keepalives.
    ///
    /// Default: `0` (system default)
    pub keepalives_interval: u32,

    /// Lost keepalives before the connection is considered dead.
    ///
    /// Default: `0` (system default)
    pub keepalives_count: u32,

    /// SSL connection mode.
    ///
    /// Default: `SslMode::Prefer`
    pub ssl_mode: SslMode,

    /// Use SSL compression.
    ///
    /// Default: `true`
    pub ssl_compression: bool,

    /// Client certificate file.
    ///
    /// Default: `""`
    pub ssl_cert: String,

    /// Client private key file.
    ///
    /// Default: `""`
    pub ssl_key: String,

    /// Root certificate file (PEM) used to verify the server.
    ///
    /// Default: `""`
    pub ssl_root_cert: String,

    /// Certificate revocation list file.
    ///
    /// Default: `""`
    pub ssl_crl: String,

    /// Required operating-system user name of the server process.
    ///
    /// Default: `""`
    pub require_peer: String,

    /// Kerberos service name.
    ///
    /// Default: `""`
    pub krb_srv_name: String,

    /// Service name from the service file.
    ///
    /// Default: `""`
    pub service: String,

    /// Log statement lifecycle events at debug level.
    ///
    /// Default: `false`
    pub debug: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            host: String::new(),
            hostaddr: String::new(),
            port: DEFAULT_PORT,
            dbname: String::new(),
            user: String::new(),
            password: String::new(),
            connect_timeout: 0,
            client_encoding: String::new(),
            options: String::new(),
            application_name: String::new(),
            fallback_application_name: String::new(),
            keepalives: true,
            keepalives_idle: 0,
            keepalives_interval: 0,
            keepalives_count: 0,
            ssl_mode: SslMode::Prefer,
            ssl_compression: true,
            ssl_cert: String::new(),
            ssl_key: String::new(),
            ssl_root_cert: String::new(),
            ssl_crl: String::new(),
            require_peer: String::new(),
            krb_srv_name: String::new(),
            service: String::new(),
            debug: false,
        }
    }
}

impl Opts {
    /// Set one option by its connection-string key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        match key {
            "host" => self.host = value.to_string(),
            "hostaddr" => self.hostaddr = value.to_string(),
            "port" => self.port = parse_number(key, value)?,
            "dbname" | "database" => self.dbname = value.to_string(),
            "user" => self.user = value.to_string(),
            "password" => self.password = value.to_string(),
            "connect_timeout" => self.connect_timeout = parse_number(key, value)?,
            "client_encoding" => self.client_encoding = value.to_string(),
            "options" => self.options = value.to_string(),
            "application_name" => self.application_name = value.to_string(),
            "fallback_application_name" => self.fallback_application_name = value.to_string(),
            "keepalives" => self.keepalives = parse_bool(key, value)?,
            "keepalives_idle" => self.keepalives_idle = parse_number(key, value)?,
            "keepalives_interval" => self.keepalives_interval = parse_number(key, value)?,
            "keepalives_count" => self.keepalives_count = parse_number(key, value)?,
            "sslmode" => self.ssl_mode = value.parse()?,
            "sslcompression" => self.ssl_compression = parse_bool(key, value)?,
            "sslcert" => self.ssl_cert = value.to_string(),
            "sslkey" => self.ssl_key = value.to_string(),
            "sslrootcert" => self.ssl_root_cert = value.to_string(),
            "sslcrl" => self.ssl_crl = value.to_string(),
            "requirepeer" => self.require_peer = value.to_string(),
            "krbsrvname" => self.krb_srv_name = value.to_string(),
            "service" => self.service = value.to_string(),
            "debug" => self.debug = parse_bool(key, value)?,
            _ => {
                return Err(Error::InvalidUsage(format!(
                    "Unknown connection option: {}",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Assemble a libpq-style `key=value` connection string.
    ///
    /// Options left at their default value are omitted.
    pub fn to_conninfo(&self) -> String {
        let mut out = String::new();
        let defaults = Opts::default();

        let mut push = |key: &str, value: &str| {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(key);
            out.push('=');
            push_conninfo_value(&mut out, value);
        };

        let strings = [("host", &self.host), ("hostaddr", &self.hostaddr)];
        for (key, value) in strings {
            if !value.is_empty() {
                push(key, value);
            }
        }
        if self.port != defaults.port {
            push("port", &self.port.to_string());
        }
        let strings = [
            ("dbname", &self.dbname),
            ("user", &self.user),
            ("password", &self.password),
        ];
        for (key, value) in strings {
            if !value.is_empty() {
                push(key, value);
            }
        }
        if self.connect_timeout != 0 {
            push("connect_timeout", &self.connect_timeout.to_string());
        }
        let strings = [
            ("client_encoding", &self.client_encoding),
            ("options", &self.options),
            ("application_name", &self.application_name),
            ("fallback_application_name", &self.fallback_application_name),
        ];
        for (key, value) in strings {
            if !value.is_empty() {
                push(key, value);
            }
        }
        if self.keepalives != defaults.keepalives {
            push("keepalives", if self.keepalives { "1" } else { "0" });
        }
        let numbers = [
            ("keepalives_idle", self.keepalives_idle),
            ("keepalives_interval", self.keepalives_interval),
            ("keepalives_count", self.keepalives_count),
        ];
        for (key, value) in numbers {
            if value != 0 {
                push(key, &value.to_string());
            }
        }
        if self.ssl_mode != defaults.ssl_mode {
            push("sslmode", self.ssl_mode.as_str());
        }
        if self.ssl_compression != defaults.ssl_compression {
            push("sslcompression", if self.ssl_compression { "1" } else { "0" });
        }
        let strings = [
            ("sslcert", &self.ssl_cert),
            ("sslkey", &self.ssl_key),
            ("sslrootcert", &self.ssl_root_cert),
            ("sslcrl", &self.ssl_crl),
            ("requirepeer", &self.require_peer),
            ("krbsrvname", &self.krb_srv_name),
            ("service", &self.service),
        ];
        for (key, value) in strings {
            if !value.is_empty() {
                push(key, value);
            }
        }

        out
    }

    /// Parse a libpq-style `key=value` connection string.
    ///
    /// Values may be single-quoted; a backslash escapes the next character.
    pub fn from_conninfo(s: &str) -> Result<Self, Error> {
        let mut opts = Opts::default();
        let mut chars = s.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let mut key = String::new();
            while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
                key.push(c);
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.next() != Some('=') {
                return Err(Error::InvalidUsage(format!(
                    "Missing \"=\" after \"{}\" in connection string",
                    key
                )));
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}

            let mut value = String::new();
            if chars.next_if_eq(&'\'').is_some() {
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some('\\') => {
                            if let Some(c) = chars.next() {
                                value.push(c);
                            }
                        }
                        Some(c) => value.push(c),
                        None => {
                            return Err(Error::InvalidUsage(
                                "Unterminated quoted value in connection string".into(),
                            ));
                        }
                    }
                }
            } else {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    if c == '\\' {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    } else {
                        value.push(c);
                    }
                }
            }

            opts.set(&key, &value)?;
        }

        Ok(opts)
    }
}

fn push_conninfo_value(out: &mut String, value: &str) {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        out.push_str(value);
        return;
    }
    out.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value
        .trim()
        .parse()
        .map_err(|_e| Error::InvalidUsage(format!("Invalid {}: {}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "True" | "1" | "yes" | "on" => Ok(true),
        "false" | "False" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidUsage(format!("Invalid {}: {}", key, value))),
    }
}

impl std::fmt::Display for Opts {
    /// Connection string with the password masked.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut masked = self.clone();
        if !masked.password.is_empty() {
            masked.password = "********".into();
        }
        f.write_str(&masked.to_conninfo())
    }
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a PostgreSQL connection URL.
    ///
    /// Format: `postgres://[user[:password]@]host[:port][/database][?param1=value1&param2=value2&..]`
    ///
    /// Query parameters use the same keys as a connection string.
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !["postgres", "postgresql"].contains(&url.scheme()) {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'postgres://' or 'postgresql://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = Opts {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(DEFAULT_PORT),
            user: url.username().to_string(),
            password: url.password().unwrap_or_default().to_string(),
            dbname: url.path().strip_prefix('/').unwrap_or_default().to_string(),
            ..Opts::default()
        };

        for (key, value) in url.query_pairs() {
            opts.set(&key, &value)?;
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    /// Parse either a `postgres://` URL or a `key=value` connection string.
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let trimmed = s.trim_start();
        if trimmed.starts_with("postgres://") || trimmed.starts_with("postgresql://") {
            let url =
                Url::parse(trimmed).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
            Self::try_from(&url)
        } else {
            Self::from_conninfo(s)
        }
    }
}

impl TryFrom<String> for Opts {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::try_from(s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_conninfo_is_empty() {
        assert_eq!(Opts::default().to_conninfo(), "");
    }

    #[test]
    fn test_conninfo_omits_defaults() {
        let opts = Opts {
            host: "db.example.com".into(),
            dbname: "app".into(),
            user: "alice".into(),
            connect_timeout: 5,
            ..Default::default()
        };
        assert_eq!(
            opts.to_conninfo(),
            "host=db.example.com dbname=app user=alice connect_timeout=5"
        );
    }

    #[test]
    fn test_conninfo_non_default_flags() {
        let opts = Opts {
            port: 6543,
            keepalives: false,
            keepalives_idle: 30,
            ssl_mode: SslMode::VerifyFull,
            ssl_compression: false,
            debug: true,
            ..Default::default()
        };
        assert_eq!(
            opts.to_conninfo(),
            "port=6543 keepalives=0 keepalives_idle=30 sslmode=verify-full sslcompression=0"
        );
    }

    #[test]
    fn test_conninfo_quoting() {
        let opts = Opts {
            password: "it's a secret".into(),
            options: "-c search_path=a\\b".into(),
            ..Default::default()
        };
        assert_eq!(
            opts.to_conninfo(),
            "password='it\\'s a secret' options='-c search_path=a\\\\b'"
        );
    }

    #[test]
    fn test_from_conninfo() {
        let opts = Opts::from_conninfo(
            "host=localhost port = 5433 dbname=test user=bob password='p w\\'d' sslmode=disable debug=1",
        )
        .unwrap();
        assert_eq!(opts.host, "localhost");
        assert_eq!(opts.port, 5433);
        assert_eq!(opts.dbname, "test");
        assert_eq!(opts.user, "bob");
        assert_eq!(opts.password, "p w'd");
        assert_eq!(opts.ssl_mode, SslMode::Disable);
        assert!(opts.debug);
    }

    #[test]
    fn test_conninfo_reparse() {
        let opts = Opts {
            host: "h".into(),
            password: "a b\\c'd".into(),
            keepalives: false,
            ssl_mode: SslMode::Require,
            ..Default::default()
        };
        let parsed = Opts::from_conninfo(&opts.to_conninfo()).unwrap();
        assert_eq!(parsed.host, "h");
        assert_eq!(parsed.password, "a b\\c'd");
        assert!(!parsed.keepalives);
        assert_eq!(parsed.ssl_mode, SslMode::Require);
    }

    #[test]
    fn test_from_conninfo_errors() {
        assert!(Opts::from_conninfo("host").is_err());
        assert!(Opts::from_conninfo("nosuchkey=1").is_err());
        assert!(Opts::from_conninfo("port=abc").is_err());
        assert!(Opts::from_conninfo("password='open").is_err());
        assert!(Opts::from_conninfo("sslmode=sometimes").is_err());
    }

    #[test]
    fn test_url() {
        let opts = Opts::try_from(
            "postgres://alice:secret@db:6000/app?sslmode=require&application_name=svc",
        )
        .unwrap();
        assert_eq!(opts.host, "db");
        assert_eq!(opts.port, 6000);
        assert_eq!(opts.user, "alice");
        assert_eq!(opts.password, "secret");
        assert_eq!(opts.dbname, "app");
        assert_eq!(opts.ssl_mode, SslMode::Require);
        assert_eq!(opts.application_name, "svc");
    }

    #[test]
    fn test_url_rejects_unknown_scheme() {
        let url = Url::parse("mysql://localhost/db").unwrap();
        assert!(Opts::try_from(&url).is_err());
    }

    #[test]
    fn test_display_masks_password() {
        let opts = Opts {
            user: "u".into(),
            password: "hunter2".into(),
            ..Default::default()
        };
        assert_eq!(opts.to_string(), "user=u password=********");
    }

    #[test]
    fn test_ssl_mode() {
        assert!(!SslMode::Disable.should_try_ssl());
        assert!(!SslMode::Allow.should_try_ssl());
        assert!(SslMode::Prefer.should_try_ssl());
        assert!(!SslMode::Prefer.is_required());
        assert!(SslMode::VerifyCa.is_required());
        assert!(SslMode::VerifyCa.verifies_certificate());
        assert_eq!("verify_full".parse::<SslMode>().unwrap(), SslMode::VerifyFull);
    }
}

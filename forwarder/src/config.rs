use hyper::header::HeaderValue;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Value shipped as the proxy secret when nothing is configured.
/// The proxy refuses to start with it.
pub const INSECURE_DEFAULT_SECRET: &str = "changeme";

pub const ENV_PROXY_SECRET: &str = "PROXY_SECRET";
pub const ENV_ARC_LOGIN_URL: &str = "ARC_LOGIN_URL";
pub const ENV_ARC_LIVE_URL: &str = "ARC_LIVE_URL";
pub const ENV_IRRMS_LOGIN_URL: &str = "IRRMS_LOGIN_URL";
pub const ENV_IRRMS_DATA_URL: &str = "IRRMS_DATA_URL";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("proxy secret is empty or left at the insecure default")]
    InsecureSecret,

    #[error("{var} is not a valid URL: {reason}")]
    InvalidUrl { var: String, reason: String },

    #[error("retry backoff must be positive when retries are enabled")]
    InvalidRetry,

    #[error("irrms.web_origin is not a valid header value: {0:?}")]
    InvalidWebOrigin(String),
}

/// Forwarder configuration
///
/// Loaded once at startup (YAML section plus environment overrides) and
/// read-only afterwards.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for proxied requests
    #[serde(default = "default_listener")]
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    /// Shared secret every inbound call must present
    #[serde(default = "default_proxy_secret")]
    pub proxy_secret: String,
    #[serde(default)]
    pub arc: ArcConfig,
    #[serde(default)]
    pub irrms: IrrmsConfig,
    /// Shed code to IRRMS authenticate key. Codes are matched case-insensitively.
    #[serde(default)]
    pub shed_keys: HashMap<String, String>,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Third-party service echoing the caller's public address as `{"ip": ...}`
    #[serde(default = "default_ip_echo_url")]
    pub ip_echo_url: Url,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: default_listener(),
            admin_listener: default_admin_listener(),
            proxy_secret: default_proxy_secret(),
            arc: ArcConfig::default(),
            irrms: IrrmsConfig::default(),
            shed_keys: HashMap::new(),
            timeouts: Timeouts::default(),
            retry: RetryConfig::default(),
            ip_echo_url: default_ip_echo_url(),
        }
    }
}

impl Config {
    /// Validates the forwarder configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.proxy_secret.is_empty() || self.proxy_secret == INSECURE_DEFAULT_SECRET {
            return Err(ValidationError::InsecureSecret);
        }

        if self.retry.max_retries > 0 && self.retry.base_delay_ms == 0 {
            return Err(ValidationError::InvalidRetry);
        }

        if HeaderValue::from_str(&self.irrms.web_origin).is_err() {
            return Err(ValidationError::InvalidWebOrigin(
                self.irrms.web_origin.clone(),
            ));
        }

        Ok(())
    }

    /// Applies environment overrides on top of the file configuration.
    ///
    /// Recognized variables: `PROXY_SECRET`, `ARC_LOGIN_URL`, `ARC_LIVE_URL`,
    /// `IRRMS_LOGIN_URL`, `IRRMS_DATA_URL` and one `IRRMS_<SHED>_KEY` per shed.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in vars {
            let name = name.as_ref();
            match name {
                ENV_PROXY_SECRET => self.proxy_secret = value.into(),
                ENV_ARC_LOGIN_URL => self.arc.login_url = parse_env_url(name, value)?,
                ENV_ARC_LIVE_URL => self.arc.live_url = parse_env_url(name, value)?,
                ENV_IRRMS_LOGIN_URL => self.irrms.login_url = parse_env_url(name, value)?,
                ENV_IRRMS_DATA_URL => self.irrms.data_url = parse_env_url(name, value)?,
                _ => {
                    if let Some(shed) = shed_from_env_name(name) {
                        self.shed_keys.insert(shed.to_uppercase(), value.into());
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_env_url(var: &str, value: impl Into<String>) -> Result<Url, ValidationError> {
    let value = value.into();
    Url::parse(&value).map_err(|e| ValidationError::InvalidUrl {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

/// `IRRMS_TATA_KEY` -> `Some("TATA")`
fn shed_from_env_name(name: &str) -> Option<&str> {
    name.strip_prefix("IRRMS_")
        .and_then(|rest| rest.strip_suffix("_KEY"))
        .filter(|shed| !shed.is_empty())
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

fn default_listener() -> Listener {
    Listener {
        host: "0.0.0.0".into(),
        port: 8000,
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 8001,
    }
}

fn default_proxy_secret() -> String {
    INSECURE_DEFAULT_SECRET.into()
}

fn default_ip_echo_url() -> Url {
    static_url("https://api.ipify.org/?format=json")
}

// literal
fn static_url(s: &str) -> Url {
    Url::parse(s).expect("built-in default URL must parse")
}

/// ARC endpoints. ARC authorizes by source address, so no credential is configured.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ArcConfig {
    pub login_url: Url,
    pub live_url: Url,
}

impl Default for ArcConfig {
    fn default() -> Self {
        ArcConfig {
            login_url: static_url("http://49.249.49.218:5000/api/login"),
            live_url: static_url("http://49.249.49.218:5000/api/DefTableLocodetails"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct IrrmsConfig {
    pub login_url: Url,
    pub data_url: Url,
    /// Sent as `Origin` and (with a trailing slash) `Referer` on every IRRMS call
    #[serde(default = "default_irrms_web_origin")]
    pub web_origin: String,
}

fn default_irrms_web_origin() -> String {
    "https://irrms.locomatrice.com".into()
}

impl Default for IrrmsConfig {
    fn default() -> Self {
        IrrmsConfig {
            login_url: static_url(
                "https://irrms-service.locomatrice.com/RMS/save/session/management/login",
            ),
            data_url: static_url(
                "https://irrms-service.locomatrice.com/RMS/get/realTimeData/getAllLocosRealtimeData",
            ),
            web_origin: default_irrms_web_origin(),
        }
    }
}

/// Per-call timeout budgets, in seconds
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Timeouts {
    pub identity_secs: u64,
    pub passthrough_secs: u64,
    pub probe_secs: u64,
    pub irrms_login_secs: u64,
    pub irrms_data_secs: u64,
    pub arc_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            identity_secs: 6,
            passthrough_secs: 15,
            probe_secs: 5,
            irrms_login_secs: 20,
            irrms_data_secs: 25,
            arc_secs: 20,
        }
    }
}

impl Timeouts {
    pub fn identity(&self) -> Duration {
        Duration::from_secs(self.identity_secs)
    }

    pub fn passthrough(&self) -> Duration {
        Duration::from_secs(self.passthrough_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn irrms_login(&self) -> Duration {
        Duration::from_secs(self.irrms_login_secs)
    }

    pub fn irrms_data(&self) -> Duration {
        Duration::from_secs(self.irrms_data_secs)
    }

    pub fn arc(&self) -> Duration {
        Duration::from_secs(self.arc_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts made after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubles for every further retry
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 500,
        }
    }
}

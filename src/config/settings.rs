//! Process settings read once at startup from the environment (`.env` honored by the binary).

use crate::error::SettingsError;
use crate::format::ResponseFormat;
use base64::Engine;
use sqlx::postgres::PgConnectOptions;
use std::str::FromStr;
use url::Url;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_SESSION_COOKIE: &str = "connect.sid";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseSettings {
    /// Full connection URL. Takes precedence over the individual parts.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    /// Already decoded from its Base64 form.
    pub password: Option<String>,
    pub name: Option<String>,
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connect_options(&self) -> Result<PgConnectOptions, SettingsError> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url).map_err(|e| SettingsError::Invalid {
                name: "DATABASE_URL",
                reason: e.to_string(),
            });
        }
        let mut opts = PgConnectOptions::new().host(&self.host).port(self.port);
        if let Some(user) = &self.user {
            opts = opts.username(user);
        }
        if let Some(password) = &self.password {
            opts = opts.password(password);
        }
        if let Some(name) = &self.name {
            opts = opts.database(name);
        }
        Ok(opts)
    }

    /// Host for log lines; never includes credentials.
    pub fn display_host(&self) -> String {
        match &self.url {
            Some(url) => url
                .rsplit('@')
                .next()
                .unwrap_or(url.as_str())
                .to_string(),
            None => format!("{}:{}", self.host, self.port),
        }
    }
}

/// Single sign-on server this service bounces users to. Both redirect targets are
/// built once, when the settings are read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CasSettings {
    login: Url,
    logout: Url,
}

impl CasSettings {
    pub fn new(cas_url: &str, service_url: &str) -> Result<Self, SettingsError> {
        let base = parse_url("CAS_URL", cas_url)?;
        let service = parse_url("SERVICE_URL", service_url)?;

        let mut login = endpoint(&base, "login")?;
        login.query_pairs_mut().append_pair("service", service.as_str());
        let logout = endpoint(&base, "logout")?;
        Ok(CasSettings { login, logout })
    }

    pub fn login_url(&self) -> &str {
        self.login.as_str()
    }

    pub fn logout_url(&self) -> &str {
        self.logout.as_str()
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, SettingsError> {
    Url::parse(value).map_err(|e| SettingsError::Invalid {
        name,
        reason: format!("[{}]: {}", value, e),
    })
}

/// `<base>/<name>`, whether or not the base path ends in a slash.
fn endpoint(base: &Url, name: &str) -> Result<Url, SettingsError> {
    let mut url = base.clone();
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|_| SettingsError::Invalid {
            name: "CAS_URL",
            reason: format!("[{}] cannot carry a path", base),
        })?
        .pop_if_empty()
        .push(name);
    Ok(url)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub listen_on: String,
    pub port: u16,
    pub database: DatabaseSettings,
    /// Allowed CORS origin. `None` disables CORS handling.
    pub access_control_allow_origin: Option<String>,
    pub default_response_format: ResponseFormat,
    pub cas: Option<CasSettings>,
    pub session_cookie: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = parse_number(&get, "PORT")?.unwrap_or(3000);
        let db_port = parse_number(&get, "DB_PORT")?.unwrap_or(5432);
        let max_connections = parse_number(&get, "DB_MAX_CONNECTIONS")?.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        if max_connections == 0 {
            return Err(SettingsError::Invalid {
                name: "DB_MAX_CONNECTIONS",
                reason: "must be at least 1".into(),
            });
        }

        let password = get("DB_PASSWORD").map(|p| decode_password(&p)).transpose()?;

        let default_response_format = match get("DEFAULT_RESPONSE_FORMAT") {
            Some(f) => f.parse::<ResponseFormat>().map_err(|reason| SettingsError::Invalid {
                name: "DEFAULT_RESPONSE_FORMAT",
                reason,
            })?,
            None => ResponseFormat::default(),
        };

        let cas = match get("CAS_URL") {
            Some(url) => {
                let service_url = get("SERVICE_URL").ok_or(SettingsError::Missing("SERVICE_URL"))?;
                Some(CasSettings::new(&url, &service_url)?)
            }
            None => None,
        };

        Ok(Settings {
            listen_on: get("LISTEN_ON").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database: DatabaseSettings {
                url: get("DATABASE_URL"),
                host: get("DB_HOST").unwrap_or_else(|| "localhost".into()),
                port: db_port,
                user: get("DB_USER"),
                password,
                name: get("DB_NAME"),
                max_connections,
            },
            access_control_allow_origin: get("ACCESS_CONTROL_ALLOW_ORIGIN"),
            default_response_format,
            cas,
            session_cookie: get("SESSION_COOKIE").unwrap_or_else(|| DEFAULT_SESSION_COOKIE.into()),
        })
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.listen_on, self.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            listen_on: "0.0.0.0".into(),
            port: 3000,
            database: DatabaseSettings {
                url: None,
                host: "localhost".into(),
                port: 5432,
                user: None,
                password: None,
                name: None,
                max_connections: DEFAULT_MAX_CONNECTIONS,
            },
            access_control_allow_origin: None,
            default_response_format: ResponseFormat::default(),
            cas: None,
            session_cookie: DEFAULT_SESSION_COOKIE.into(),
        }
    }
}

fn parse_number<T, G>(get: &G, name: &'static str) -> Result<Option<T>, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .map(|v| {
            v.parse::<T>().map_err(|e| SettingsError::Invalid {
                name,
                reason: format!("[{}]: {}", v, e),
            })
        })
        .transpose()
}

/// The database password is configured Base64 encoded.
fn decode_password(encoded: &str) -> Result<String, SettingsError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| SettingsError::Invalid {
            name: "DB_PASSWORD",
            reason: format!("must be Base64 encoded: {}", e),
        })?;
    String::from_utf8(bytes).map_err(|e| SettingsError::Invalid {
        name: "DB_PASSWORD",
        reason: e.to_string(),
    })
}

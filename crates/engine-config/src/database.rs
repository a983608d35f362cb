use crate::error::SettingsError;
use connectors::sql::postgres::utils::connection_string;
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_SSLMODE: &str = "require";

/// Destination credentials for one provider.
#[derive(Clone, PartialEq, Eq)]
pub enum DatabaseSettings {
    Url(String),
    Params {
        host: String,
        port: u16,
        dbname: String,
        user: String,
        password: String,
        sslmode: String,
    },
}

impl DatabaseSettings {
    /// Reads `DATABASE_URL`, or else `{PROVIDER}_DB_HOST`, `_PORT`, `_NAME`,
    /// `_USER`, `_PASSWORD` and `_SSLMODE` from `vars`.
    pub fn from_env(provider: &str, vars: &HashMap<String, String>) -> Result<Self, SettingsError> {
        if let Some(url) = non_empty(vars, "DATABASE_URL") {
            debug!("Using DATABASE_URL for the destination");
            return Ok(DatabaseSettings::Url(url.to_string()));
        }

        let prefix = provider.trim().to_ascii_uppercase().replace(['-', ' ', '.'], "_");
        let key = |suffix: &str| format!("{prefix}_DB_{suffix}");
        let required = |suffix: &str| {
            non_empty(vars, &key(suffix))
                .map(str::to_string)
                .ok_or_else(|| SettingsError::MissingVariable(key(suffix)))
        };

        let port = match non_empty(vars, &key("PORT")) {
            Some(raw) => raw.parse::<u16>().map_err(|_| SettingsError::InvalidValue {
                key: key("PORT"),
                value: raw.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let sslmode = non_empty(vars, &key("SSLMODE"))
            .unwrap_or(DEFAULT_SSLMODE)
            .to_ascii_lowercase();
        if !matches!(sslmode.as_str(), "disable" | "prefer" | "require") {
            return Err(SettingsError::InvalidValue {
                key: key("SSLMODE"),
                value: sslmode,
            });
        }

        Ok(DatabaseSettings::Params {
            host: required("HOST")?,
            port,
            dbname: required("NAME")?,
            user: required("USER")?,
            password: non_empty(vars, &key("PASSWORD")).unwrap_or_default().to_string(),
            sslmode,
        })
    }

    pub fn connection_url(&self) -> String {
        match self {
            DatabaseSettings::Url(url) => url.clone(),
            DatabaseSettings::Params {
                host,
                port,
                dbname,
                user,
                password,
                sslmode,
            } => {
                let port = port.to_string();
                connection_string(&[
                    ("host", host.as_str()),
                    ("port", port.as_str()),
                    ("dbname", dbname.as_str()),
                    ("user", user.as_str()),
                    ("password", password.as_str()),
                    ("sslmode", sslmode.as_str()),
                ])
            }
        }
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseSettings::Url(_) => f.write_str("DatabaseSettings::Url(<redacted>)"),
            DatabaseSettings::Params {
                host,
                port,
                dbname,
                user,
                sslmode,
                ..
            } => f
                .debug_struct("DatabaseSettings")
                .field("host", host)
                .field("port", port)
                .field("dbname", dbname)
                .field("user", user)
                .field("sslmode", sslmode)
                .finish_non_exhaustive(),
        }
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

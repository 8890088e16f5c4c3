use std::{env, fmt, path::Path};

use log::info;

use crate::error::AgeingError;

/// Connection settings for the database holding the ageing fact table.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

// keep the password out of the logs
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl DbConfig {
    /// Read `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER` and `DB_PASSWORD` from
    /// the process environment.
    pub fn from_env() -> Result<DbConfig, AgeingError> {
        DbConfig::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`DbConfig::from_env`] but with an arbitrary source of
    /// variables.  All five values are required.
    pub fn from_lookup<F>(lookup: F) -> Result<DbConfig, AgeingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| AgeingError::Config(format!("{} must be set", key)))
        };
        let port = required("DB_PORT")?;
        let port = port.trim().parse::<u16>().map_err(|e| {
            AgeingError::Config(format!("DB_PORT must be a port number, got {:?}: {}", port, e))
        })?;
        Ok(DbConfig {
            host: required("DB_HOST")?,
            port,
            database: required("DB_NAME")?,
            user: required("DB_USER")?,
            password: required("DB_PASSWORD")?,
        })
    }

    /// The client configuration, with every setting passed through as is.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .password(&self.password);
        config
    }
}

/// Load the environment file for `env_name`, e.g. `.env/prod.env`.  If that
/// file doesn't exist fall back to a `.env` file in the working directory.
/// Variables already set in the process environment are not overridden.
pub fn load_env_file(env_name: &str) -> Result<(), AgeingError> {
    let path = format!(".env/{}.env", env_name);
    let path = Path::new(&path);
    if path.exists() {
        dotenvy::from_path(path)
            .map_err(|e| AgeingError::Config(format!("failed to load {}: {}", path.display(), e)))?;
        info!("loaded environment from {}", path.display());
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(p) => info!("loaded environment from {}", p.display()),
        Err(e) if e.not_found() => {
            info!("no environment file found, using process environment")
        }
        Err(e) => return Err(AgeingError::Config(format!("failed to load .env: {}", e))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, error::Error};

    use tokio_postgres::config::Host;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn test_vars() -> HashMap<String, String> {
        vars(&[
            ("DB_HOST", "test_host"),
            ("DB_PORT", "5432"),
            ("DB_NAME", "test_db"),
            ("DB_USER", "test_user"),
            ("DB_PASSWORD", "test_pass"),
        ])
    }

    #[test]
    fn read_config() -> Result<(), Box<dyn Error>> {
        let env = test_vars();
        let config = DbConfig::from_lookup(|k| env.get(k).cloned())?;
        assert_eq!(config.host, "test_host");
        assert_eq!(config.port, 5432);
        assert_eq!(config.database, "test_db");
        assert_eq!(config.user, "test_user");
        assert_eq!(config.password, "test_pass");
        Ok(())
    }

    #[test]
    fn missing_variable() {
        let mut env = test_vars();
        env.remove("DB_NAME");
        let res = DbConfig::from_lookup(|k| env.get(k).cloned());
        match res {
            Err(AgeingError::Config(msg)) => assert!(msg.contains("DB_NAME")),
            other => panic!("expected a config error, got {:?}", other),
        }
    }

    #[test]
    fn invalid_port() {
        let mut env = test_vars();
        env.insert("DB_PORT".into(), "54x2".into());
        assert!(matches!(
            DbConfig::from_lookup(|k| env.get(k).cloned()),
            Err(AgeingError::Config(_))
        ));
        env.insert("DB_PORT".into(), "70000".into());
        assert!(matches!(
            DbConfig::from_lookup(|k| env.get(k).cloned()),
            Err(AgeingError::Config(_))
        ));
    }

    #[test]
    fn pg_config_passes_values_through() -> Result<(), Box<dyn Error>> {
        let env = test_vars();
        let config = DbConfig::from_lookup(|k| env.get(k).cloned())?;
        let pg = config.pg_config();
        assert_eq!(pg.get_hosts(), &[Host::Tcp("test_host".to_string())]);
        assert_eq!(pg.get_ports(), &[5432]);
        assert_eq!(pg.get_dbname(), Some("test_db"));
        assert_eq!(pg.get_user(), Some("test_user"));
        assert_eq!(pg.get_password(), Some("test_pass".as_bytes()));
        Ok(())
    }

    #[test]
    fn debug_hides_password() -> Result<(), Box<dyn Error>> {
        let env = test_vars();
        let config = DbConfig::from_lookup(|k| env.get(k).cloned())?;
        let s = format!("{:?}", config);
        assert!(!s.contains("test_pass"));
        assert!(s.contains("test_host"));
        Ok(())
    }
}

use anyhow::{Context, Result, bail};
use std::env;
use std::path::PathBuf;

pub const API_URL_VAR: &str = "APPTRACK_API_URL";
pub const USER_POOL_VAR: &str = "APPTRACK_USER_POOL_ID";
pub const CLIENT_ID_VAR: &str = "APPTRACK_CLIENT_ID";

/// Deployment settings, read once at startup. Nothing here is secret: the
/// pool and client ids are the same values a browser client would embed.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the application API, without a trailing slash.
    pub api_base_url: String,
    /// Region-prefixed user pool id, e.g. "us-east-1_AbCdEfGhI".
    pub user_pool_id: String,
    /// App client id within the pool.
    pub client_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_base_url: require(API_URL_VAR)?,
            user_pool_id: require(USER_POOL_VAR)?,
            client_id: require(CLIENT_ID_VAR)?,
        })
    }

    /// AWS region parsed from the pool id prefix.
    pub fn region(&self) -> Result<&str> {
        match self.user_pool_id.split_once('_') {
            Some((region, _)) if !region.is_empty() => Ok(region),
            _ => bail!(
                "user pool id '{}' is not region-prefixed (expected something like us-east-1_AbCdEfGhI)",
                self.user_pool_id
            ),
        }
    }

    /// Regional Cognito identity-provider endpoint.
    pub fn auth_endpoint(&self) -> Result<String> {
        Ok(format!("https://cognito-idp.{}.amazonaws.com/", self.region()?))
    }
}

fn require(key: &str) -> Result<String> {
    let value = env::var(key).with_context(|| {
        format!("{key} environment variable not set. Set it with: export {key}=<value>")
    })?;
    let value = value.trim();
    if value.is_empty() {
        bail!("{key} environment variable is set but empty");
    }
    Ok(value.to_string())
}

/// Directory for the session file and logs, e.g. ~/.local/share/apptrack on
/// Linux.
pub fn data_dir() -> PathBuf {
    if let Some(proj) = directories::ProjectDirs::from("", "", "apptrack") {
        proj.data_dir().to_path_buf()
    } else {
        PathBuf::from(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pool: &str) -> Config {
        Config {
            api_base_url: "https://api.example.com/prod".to_string(),
            user_pool_id: pool.to_string(),
            client_id: "client123".to_string(),
        }
    }

    #[test]
    fn test_region_comes_from_pool_id_prefix() {
        let config = config("us-east-1_AbCdEfGhI");
        assert_eq!(config.region().unwrap(), "us-east-1");
        assert_eq!(
            config.auth_endpoint().unwrap(),
            "https://cognito-idp.us-east-1.amazonaws.com/"
        );
    }

    #[test]
    fn test_region_rejects_unprefixed_pool_id() {
        assert!(config("nounderscore").region().is_err());
        assert!(config("_poolonly").region().is_err());
    }

    #[test]
    fn test_from_env_reads_and_trims_all_three_vars() {
        unsafe {
            env::set_var(API_URL_VAR, " https://api.example.com/prod ");
            env::set_var(USER_POOL_VAR, "eu-west-2_XyZ");
            env::set_var(CLIENT_ID_VAR, "client123");
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.api_base_url, "https://api.example.com/prod");
        assert_eq!(config.region().unwrap(), "eu-west-2");
        assert_eq!(config.client_id, "client123");

        unsafe {
            env::set_var(CLIENT_ID_VAR, "   ");
        }
        assert!(Config::from_env().is_err());

        unsafe {
            env::remove_var(API_URL_VAR);
            env::remove_var(USER_POOL_VAR);
            env::remove_var(CLIENT_ID_VAR);
        }
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains(API_URL_VAR));
    }
}

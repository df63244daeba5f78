use anyhow::{Context, Result};
use secrecy::SecretString;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub app: AppConfig,
    pub certificates: CertificateConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

#[derive(Debug)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub name: String,
    pub environment: Environment,
    /// Base URL used when building certificate verification links.
    pub public_url: String,
    pub static_dir: String,
}

#[derive(Debug, Clone)]
pub struct CertificateConfig {
    pub fonts_dir: PathBuf,
    pub default_font_family: String,
    pub load_system_fonts: bool,
    pub template_upload_max_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Server configuration
        let host = env::var("SERVER_HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string())
            .parse::<IpAddr>()
            .context("Failed to parse SERVER_HOST")?;

        let port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse::<u16>()
            .context("Failed to parse SERVER_PORT")?;

        // Database configuration
        let db_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let db_max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(val) => Some(val.parse().context("Failed to parse DATABASE_MAX_CONNECTIONS")?),
            Err(_) => Some(10),
        };
        let db_min_connections = match env::var("DATABASE_MIN_CONNECTIONS") {
            Ok(val) => Some(val.parse().context("Failed to parse DATABASE_MIN_CONNECTIONS")?),
            Err(_) => Some(1),
        };

        // App configuration
        let environment = env::var("APP_ENVIRONMENT")
            .ok()
            .and_then(|value| value.parse::<Environment>().ok())
            .unwrap_or_default();

        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "Training Backend".to_string());
        let public_url = env::var("APP_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port));
        let static_dir = env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string());

        // Certificate rendering configuration
        let fonts_dir = env::var("CERTIFICATE_FONTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("storage/fonts"));
        let default_font_family = env::var("CERTIFICATE_DEFAULT_FONT_FAMILY")
            .unwrap_or_else(|_| "sans-serif".to_string());
        let load_system_fonts = match env::var("CERTIFICATE_LOAD_SYSTEM_FONTS") {
            Ok(val) => val
                .parse::<bool>()
                .context("Failed to parse CERTIFICATE_LOAD_SYSTEM_FONTS")?,
            Err(_) => true,
        };
        let template_upload_max_bytes = match env::var("TEMPLATE_UPLOAD_MAX_BYTES") {
            Ok(val) => val.parse().context("Failed to parse TEMPLATE_UPLOAD_MAX_BYTES")?,
            Err(_) => 4 * 1024 * 1024,
        };

        Ok(Config {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: SecretString::from(db_url),
                max_connections: db_max_connections,
                min_connections: db_min_connections,
            },
            app: AppConfig {
                name: app_name,
                environment,
                public_url: public_url.trim_end_matches('/').to_string(),
                static_dir,
            },
            certificates: CertificateConfig {
                fonts_dir,
                default_font_family,
                load_system_fonts,
                template_upload_max_bytes,
            },
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "development" => Ok(Environment::Development),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

// Use once_cell for a global config instance that's initialized once
use once_cell::sync::OnceCell;

static CONFIG: OnceCell<Config> = OnceCell::new();

pub fn init() -> Result<&'static Config> {
    CONFIG.get_or_try_init(Config::from_env)
}

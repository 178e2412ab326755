use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "devicedb";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_AUTH_FILE: &str = "internal_admin_auth.json";

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub bind_addr: String,
    pub internal_auth_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let db_path =
            dotenvy::var("DEVICE_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        let bind_addr =
            dotenvy::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let internal_auth_file =
            dotenvy::var("INTERNAL_AUTH_FILE").unwrap_or_else(|_| DEFAULT_AUTH_FILE.to_string());

        Self {
            db_path: PathBuf::from(db_path),
            bind_addr,
            internal_auth_file: PathBuf::from(internal_auth_file),
        }
    }
}

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use golance_chat::{config, UserId};
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Credentials {
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Credentials {
    pub fn new(user_id: UserId, token: &str) -> Self {
        Credentials {
            user_id,
            token: Some(BASE64.encode(token)),
        }
    }

    pub fn get_token(&self) -> Option<String> {
        self.token.as_ref().and_then(|encoded| {
            let bytes = BASE64.decode(encoded).ok()?;
            String::from_utf8(bytes).ok()
        })
    }
}

/// User id and bearer token from GOLANCE_USER_ID / GOLANCE_TOKEN, if both are set
pub fn credentials_from_env() -> Result<Option<(UserId, String)>> {
    match (env::var("GOLANCE_USER_ID"), env::var("GOLANCE_TOKEN")) {
        (Ok(id), Ok(token)) => {
            let user_id = id
                .parse::<UserId>()
                .map_err(|e| anyhow!("GOLANCE_USER_ID is not a valid id '{}': {}", id, e))?;
            Ok(Some((user_id, token)))
        }
        _ => Ok(None),
    }
}

pub fn save_credentials(credentials: &Credentials) -> Result<()> {
    save_credentials_to(&get_credentials_path()?, credentials)
}

pub fn load_credentials() -> Result<Option<Credentials>> {
    load_credentials_from(&get_credentials_path()?)
}

fn save_credentials_to(path: &Path, credentials: &Credentials) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, credentials)?;

    info!("Credentials saved for user {}", credentials.user_id);
    Ok(())
}

fn load_credentials_from(path: &Path) -> Result<Option<Credentials>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)?;
    let credentials: Credentials = serde_json::from_str(&contents)?;
    info!("Loaded credentials for user {} from {}", credentials.user_id, path.display());

    Ok(Some(credentials))
}

fn get_credentials_path() -> Result<PathBuf> {
    Ok(config::config_dir()?.join(CREDENTIALS_FILE))
}

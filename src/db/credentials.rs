use keyring::Entry;

use crate::error::{Error, Result};

const SERVICE_NAME: &str = "askql";
const LLM_API_KEY_ACCOUNT: &str = "llm-api-key";

fn entry(account: &str) -> Result<Entry> {
    Entry::new(SERVICE_NAME, account)
        .map_err(|e| Error::Credentials(format!("Failed to create keyring entry: {}", e)))
}

fn get_secret(account: &str) -> Result<Option<String>> {
    match entry(account)?.get_password() {
        Ok(secret) => Ok(Some(secret)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(Error::Credentials(format!(
            "Failed to retrieve credentials: {}",
            e
        ))),
    }
}

fn set_secret(account: &str, secret: &str) -> Result<()> {
    entry(account)?
        .set_password(secret)
        .map_err(|e| Error::Credentials(format!("Failed to store credentials: {}", e)))
}

/// Database password for a connection's credential key (`user@host:port/db`)
pub fn get_password(credential_key: &str) -> Result<Option<String>> {
    get_secret(credential_key)
}

pub fn store_password(credential_key: &str, password: &str) -> Result<()> {
    set_secret(credential_key, password)
}

pub fn get_api_key() -> Result<Option<String>> {
    get_secret(LLM_API_KEY_ACCOUNT)
}

pub fn store_api_key(api_key: &str) -> Result<()> {
    set_secret(LLM_API_KEY_ACCOUNT, api_key)
}

/// Keychain lookups are best effort: a missing or locked keychain means "no secret".
pub fn lookup_or_none(result: Result<Option<String>>) -> Option<String> {
    match result {
        Ok(secret) => secret,
        Err(e) => {
            log::warn!("{}", e);
            None
        }
    }
}

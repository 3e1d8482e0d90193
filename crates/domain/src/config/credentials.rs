use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable holding the secret id.
pub const SECRET_ID_ENV: &str = "SKYWORK_SECRET_ID";
/// Environment variable holding the secret key.
pub const SECRET_KEY_ENV: &str = "SKYWORK_SECRET_KEY";

/// The secret pair used to sign the stream request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub secret_id: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Read the pair from [`SECRET_ID_ENV`] and [`SECRET_KEY_ENV`].
    ///
    /// Empty values count as missing.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let id = lookup(SECRET_ID_ENV).filter(|v| !v.is_empty());
        let key = lookup(SECRET_KEY_ENV).filter(|v| !v.is_empty());
        match (id, key) {
            (Some(id), Some(key)) => Ok(Self::new(id, key)),
            _ => Err(Error::Config(format!(
                "{SECRET_ID_ENV} and {SECRET_KEY_ENV} must be set"
            ))),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

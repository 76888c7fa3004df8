use url::Url;

use crate::platform::{Credential, PlatformError, Result};

/// Username GitHub accepts alongside a token in HTTPS URLs.
const TOKEN_USER: &str = "x-access-token";

/// A remote repository location plus the credential used to reach it.
#[derive(Debug, Clone)]
pub struct Remote {
    url: String,
    credential: Option<Credential>,
}

impl Remote {
    pub fn new(url: impl Into<String>, credential: Option<Credential>) -> Self {
        Self {
            url: url.into(),
            credential,
        }
    }

    /// The URL without credentials, safe to log or persist.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The URL git should use, with the token embedded when present.
    pub(crate) fn authenticated_url(&self) -> Result<String> {
        let Some(credential) = &self.credential else {
            return Ok(self.url.clone());
        };

        let mut url = Url::parse(&self.url)
            .map_err(|e| PlatformError::internal(format!("invalid remote URL {}: {e}", self.url)))?;
        let cannot_carry =
            |()| PlatformError::internal(format!("remote URL {} cannot carry credentials", self.url));
        url.set_username(TOKEN_USER).map_err(cannot_carry)?;
        url.set_password(Some(credential.expose()))
            .map_err(cannot_carry)?;
        Ok(url.to_string())
    }

    /// Remove this remote's secret from arbitrary text.
    pub(crate) fn redact(&self, text: &str) -> String {
        match &self.credential {
            Some(credential) if !credential.expose().is_empty() => {
                text.replace(credential.expose(), "***")
            }
            _ => text.to_string(),
        }
    }
}

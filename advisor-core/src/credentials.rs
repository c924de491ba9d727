//! Where the credential triple comes from.

use std::fs;
use std::path::{Path, PathBuf};

use advisor_sdk::{Credential, is_guid};
use serde::Deserialize;
use tracing::debug;

use crate::AdvisorError;

/// Produces the credential injected into a recommendation source.
pub trait CredentialProvider {
    fn kind(&self) -> &'static str;
    fn credential(&self) -> Result<Credential, AdvisorError>;
}

/// Secrets file in TOML form:
///
/// ```toml
/// AZURE_TENANT_ID = "..."
/// AZURE_CLIENT_ID = "..."
/// AZURE_CLIENT_SECRET = "..."
/// ```
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    path: PathBuf,
}

#[derive(Deserialize)]
struct SecretsFile {
    #[serde(rename = "AZURE_TENANT_ID")]
    tenant_id: Option<String>,
    #[serde(rename = "AZURE_CLIENT_ID")]
    client_id: Option<String>,
    #[serde(rename = "AZURE_CLIENT_SECRET")]
    client_secret: Option<String>,
}

impl StaticCredentialProvider {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn kind(&self) -> &'static str {
        "secrets-file"
    }

    fn credential(&self) -> Result<Credential, AdvisorError> {
        let path_display = self.path.display();
        let text = fs::read_to_string(&self.path).map_err(|error| {
            AdvisorError::Validation(format!("cannot read secrets file {path_display}: {error}"))
        })?;
        let secrets: SecretsFile = toml::from_str(&text).map_err(|error| {
            AdvisorError::Validation(format!("malformed secrets file {path_display}: {error}"))
        })?;

        debug!(path = %path_display, "loaded credentials from secrets file");
        validated(
            secrets.tenant_id.as_deref(),
            secrets.client_id.as_deref(),
            secrets.client_secret.as_deref(),
        )
    }
}

/// Values entered by the user at run time.
#[derive(Debug, Clone, Default)]
pub struct InteractiveCredentialProvider {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl CredentialProvider for InteractiveCredentialProvider {
    fn kind(&self) -> &'static str {
        "interactive"
    }

    fn credential(&self) -> Result<Credential, AdvisorError> {
        validated(
            self.tenant_id.as_deref(),
            self.client_id.as_deref(),
            self.client_secret.as_deref(),
        )
    }
}

fn validated(
    tenant_id: Option<&str>,
    client_id: Option<&str>,
    client_secret: Option<&str>,
) -> Result<Credential, AdvisorError> {
    let tenant_id = required("AZURE_TENANT_ID", tenant_id)?;
    let client_id = required("AZURE_CLIENT_ID", client_id)?;
    let client_secret = required("AZURE_CLIENT_SECRET", client_secret)?;

    if !is_guid(client_id) {
        return Err(AdvisorError::Validation(format!(
            "AZURE_CLIENT_ID '{client_id}' is not a GUID"
        )));
    }

    Ok(Credential::new(tenant_id, client_id, client_secret))
}

fn required<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str, AdvisorError> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(AdvisorError::Validation(format!("{name} is missing"))),
    }
}

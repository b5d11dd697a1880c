//! Registry credential resolution from on-disk configuration.
//!
//! Reads the per-user JSON credential file (`config.json` under the
//! directory named by `DOCKER_CONFIG`, falling back to `~/.docker`)
//! and resolves stored basic-auth, identity-token, or helper-delegated
//! credentials for a registry hostname. The file is consulted
//! read-only; imux never writes credentials.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use base64::Engine;
use imux_core::error::{ImuxError, Result};
use serde::Deserialize;

/// Environment variable naming an alternate credential config directory.
pub const CONFIG_DIR_ENV: &str = "DOCKER_CONFIG";

/// Directory under the user's home holding the default config file.
const CONFIG_DIR_NAME: &str = ".docker";

/// Credential config file name.
const CONFIG_FILE_NAME: &str = "config.json";

/// Resolved credentials for one registry host.
///
/// An identity token is represented as a password with an empty
/// username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// One `auths` entry in the credential file.
#[derive(Debug, Clone, Default, Deserialize)]
struct AuthEntry {
    /// base64 of `username:password`
    #[serde(default)]
    auth: Option<String>,

    #[serde(default)]
    username: Option<String>,

    #[serde(default)]
    password: Option<String>,

    #[serde(default)]
    identitytoken: Option<String>,
}

/// The per-user credential configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,

    #[serde(default, rename = "credHelpers")]
    cred_helpers: HashMap<String, String>,

    #[serde(default, rename = "credsStore")]
    creds_store: Option<String>,
}

impl AuthConfig {
    /// Load the credential configuration.
    ///
    /// `path` may name the config file itself or the directory holding
    /// it; when absent, the `DOCKER_CONFIG` environment override and
    /// then the per-user default directory are consulted. A missing
    /// file yields an empty configuration (anonymous access); a
    /// malformed file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) if p.is_dir() => p.join(CONFIG_FILE_NAME),
            Some(p) => p.to_path_buf(),
            None => default_config_dir().join(CONFIG_FILE_NAME),
        };
        if !file.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&file).map_err(|e| {
            ImuxError::Credential(format!(
                "can't read credential config {}: {}",
                file.display(),
                e
            ))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            ImuxError::Credential(format!(
                "can't parse credential config {}: {}",
                file.display(),
                e
            ))
        })
    }

    /// Resolve stored credentials for a registry host.
    ///
    /// Order: the host's dedicated credential helper, then the inline
    /// `auths` entry (identity token, base64 `auth`, then plain
    /// username/password), then the file-wide credential store helper.
    pub fn credentials_for(
        &self,
        host: &str,
        helper: &dyn CredentialHelper,
    ) -> Result<Option<Credentials>> {
        if let Some(name) = self.cred_helpers.get(host) {
            if let Some(creds) = helper.get(name, host)? {
                return Ok(Some(creds));
            }
        }

        if let Some(entry) = self.lookup_entry(host) {
            if let Some(creds) = decode_entry(entry, host)? {
                return Ok(Some(creds));
            }
        }

        if let Some(name) = &self.creds_store {
            if let Some(creds) = helper.get(name, host)? {
                return Ok(Some(creds));
            }
        }

        Ok(None)
    }

    /// Find the `auths` entry for a host. Keys may be bare hostnames or
    /// legacy URL forms like `https://index.docker.io/v1/`.
    fn lookup_entry(&self, host: &str) -> Option<&AuthEntry> {
        if let Some(entry) = self.auths.get(host) {
            return Some(entry);
        }
        self.auths
            .iter()
            .find(|(key, _)| normalize_auth_key(key) == host)
            .map(|(_, entry)| entry)
    }
}

/// Strip scheme and path from a credential file key.
fn normalize_auth_key(key: &str) -> &str {
    let stripped = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    stripped.split('/').next().unwrap_or(stripped)
}

/// Decode an inline `auths` entry into credentials.
fn decode_entry(entry: &AuthEntry, host: &str) -> Result<Option<Credentials>> {
    if let Some(token) = entry.identitytoken.as_ref().filter(|t| !t.is_empty()) {
        return Ok(Some(Credentials {
            username: String::new(),
            password: token.clone(),
        }));
    }
    if let Some(auth) = entry.auth.as_ref().filter(|a| !a.is_empty()) {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(auth)
            .map_err(|e| {
                ImuxError::Credential(format!("invalid base64 auth entry for {}: {}", host, e))
            })?;
        let decoded = String::from_utf8(decoded).map_err(|e| {
            ImuxError::Credential(format!("invalid auth entry for {}: {}", host, e))
        })?;
        let (username, password) = decoded.split_once(':').ok_or_else(|| {
            ImuxError::Credential(format!(
                "auth entry for {} is not in username:password form",
                host
            ))
        })?;
        return Ok(Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }));
    }
    match (&entry.username, &entry.password) {
        (Some(u), Some(p)) if !u.is_empty() || !p.is_empty() => Ok(Some(Credentials {
            username: u.clone(),
            password: p.clone(),
        })),
        _ => Ok(None),
    }
}

/// Default credential config directory (`$DOCKER_CONFIG` or `~/.docker`).
pub fn default_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// External credential provider capability.
///
/// Implementations look up stored credentials for a host via a named
/// helper program.
pub trait CredentialHelper {
    fn get(&self, helper: &str, host: &str) -> Result<Option<Credentials>>;
}

/// Username a helper returns when its secret is an identity token.
const TOKEN_USERNAME: &str = "<token>";

/// Output of a credential helper `get` call.
#[derive(Debug, Deserialize)]
struct HelperOutput {
    #[serde(rename = "Username", default)]
    username: String,
    #[serde(rename = "Secret", default)]
    secret: String,
}

/// Credential helper that execs `docker-credential-<name> get`.
#[derive(Debug, Default)]
pub struct ExecCredentialHelper;

impl CredentialHelper for ExecCredentialHelper {
    fn get(&self, helper: &str, host: &str) -> Result<Option<Credentials>> {
        let program = format!("docker-credential-{}", helper);
        let mut child = Command::new(&program)
            .arg("get")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                ImuxError::Credential(format!("can't run credential helper {}: {}", program, e))
            })?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(host.as_bytes()).map_err(|e| {
                ImuxError::Credential(format!("can't query credential helper {}: {}", program, e))
            })?;
        }

        let output = child.wait_with_output().map_err(|e| {
            ImuxError::Credential(format!("credential helper {} failed: {}", program, e))
        })?;

        if !output.status.success() {
            // helpers exit non-zero when no credentials are stored
            tracing::debug!(helper = %program, host, "credential helper returned no credentials");
            return Ok(None);
        }

        let parsed: HelperOutput = serde_json::from_slice(&output.stdout).map_err(|e| {
            ImuxError::Credential(format!(
                "can't parse credential helper {} output: {}",
                program, e
            ))
        })?;

        if parsed.secret.is_empty() {
            return Ok(None);
        }
        let username = if parsed.username == TOKEN_USERNAME {
            String::new()
        } else {
            parsed.username
        };
        Ok(Some(Credentials {
            username,
            password: parsed.secret,
        }))
    }
}

//! Per-host registry connection configuration.
//!
//! A `RegistryHost` is an explicit value carrying everything one
//! operation needs to talk to a registry: scheme, TLS posture,
//! capabilities, and resolved credentials. It is threaded through the
//! fetcher and push pipeline rather than held as process state, so
//! operations against different registries can coexist.

use std::path::PathBuf;

use imux_core::error::Result;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;

use crate::credentials::{AuthConfig, Credentials, ExecCredentialHelper};
use crate::reference::ImageReference;

/// Operations a resolved host permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    pub resolve: bool,
    pub pull: bool,
    pub push: bool,
}

/// Caller-supplied knobs for host resolution.
#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    /// Explicit username; overrides the credential file when non-empty.
    pub username: String,
    /// Explicit password; overrides the credential file when non-empty.
    pub password: String,
    /// Disable TLS certificate verification for this host only.
    pub insecure: bool,
    /// Connect over HTTP instead of HTTPS.
    pub plain_http: bool,
    /// Credential configuration file or directory.
    pub auth_config: Option<PathBuf>,
    /// Whether the operation will push content.
    pub for_push: bool,
}

/// Connection configuration for one registry host.
#[derive(Debug, Clone)]
pub struct RegistryHost {
    /// Hostname the client connects to (API hostname).
    pub host: String,
    /// Registry name as written in references.
    pub registry: String,
    pub plain_http: bool,
    pub insecure: bool,
    pub capabilities: HostCapabilities,
    credentials: Option<Credentials>,
}

impl RegistryHost {
    /// Build the host configuration for a target reference.
    ///
    /// Credentials: explicit username/password when either is non-empty,
    /// otherwise the on-disk credential configuration looked up under
    /// the registry's credential hostname (helpers included).
    pub fn resolve(reference: &ImageReference, opts: &HostOptions) -> Result<Self> {
        let credentials = if !opts.username.is_empty() || !opts.password.is_empty() {
            Some(Credentials {
                username: opts.username.clone(),
                password: opts.password.clone(),
            })
        } else {
            let config = AuthConfig::load(opts.auth_config.as_deref())?;
            config.credentials_for(reference.credential_host(), &ExecCredentialHelper)?
        };

        Ok(Self {
            host: reference.api_host().to_string(),
            registry: reference.registry.clone(),
            plain_http: opts.plain_http,
            insecure: opts.insecure,
            capabilities: HostCapabilities {
                resolve: true,
                pull: true,
                push: opts.for_push,
            },
            credentials,
        })
    }

    /// Build a protocol client for this host.
    ///
    /// The platform resolver is disabled: a multi-platform index must
    /// surface as an index, never be silently narrowed to one platform.
    pub fn client(&self) -> Client {
        let protocol = if self.plain_http {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        let config = ClientConfig {
            protocol,
            accept_invalid_certificates: self.insecure,
            platform_resolver: None,
            ..Default::default()
        };
        Client::new(config)
    }

    /// Authentication for registry calls.
    pub fn auth(&self) -> RegistryAuth {
        match &self.credentials {
            Some(c) => RegistryAuth::Basic(c.username.clone(), c.password.clone()),
            None => RegistryAuth::Anonymous,
        }
    }

    /// True when credentials were resolved (explicit or stored).
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Security plugin property bag.
//!
//! The server does not implement authentication, access control or
//! encryption itself - those are plugin responsibilities. The
//! configuration carries an opaque `String -> String` property bag that
//! is forwarded verbatim to the plugins; the only obligation of the core
//! is to check that the bag is internally consistent before start, so a
//! misconfigured security posture fails loudly instead of silently
//! running unauthenticated.

use std::collections::BTreeMap;

/// Property naming the authentication plugin (e.g. `builtin.PKI-DH`).
pub const KEY_AUTH_PLUGIN: &str = "sec.auth.plugin";
/// Property naming the access-control plugin (e.g. `builtin.Access-Permissions`).
pub const KEY_ACCESS_PLUGIN: &str = "sec.access.plugin";
/// Property naming the cryptographic plugin (e.g. `builtin.AES-GCM-GMAC`).
pub const KEY_CRYPTO_PLUGIN: &str = "sec.crypto.plugin";

/// Credential properties required when an authentication plugin is named.
pub const AUTH_REQUIRED_KEYS: &[&str] = &[
    "sec.auth.identity_ca",
    "sec.auth.identity_certificate",
    "sec.auth.private_key",
];

/// Policy properties required when an access-control plugin is named.
pub const ACCESS_REQUIRED_KEYS: &[&str] = &[
    "sec.access.permissions_ca",
    "sec.access.governance",
    "sec.access.permissions",
];

/// Resolved view of the property bag: which plugins are enabled.
///
/// `None` means security is disabled (empty bag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    pub authentication: String,
    pub access_control: Option<String>,
    pub cryptography: Option<String>,
}

impl SecurityContext {
    /// Resolve and validate the property bag.
    pub fn from_properties(
        properties: &BTreeMap<String, String>,
    ) -> Result<Option<Self>, SecurityError> {
        validate_properties(properties)?;
        let Some(authentication) = properties.get(KEY_AUTH_PLUGIN) else {
            return Ok(None);
        };
        Ok(Some(Self {
            authentication: authentication.clone(),
            access_control: properties.get(KEY_ACCESS_PLUGIN).cloned(),
            cryptography: properties.get(KEY_CRYPTO_PLUGIN).cloned(),
        }))
    }
}

/// Check the property bag for internal consistency.
///
/// An empty bag is valid (security disabled). Plugin names themselves
/// are opaque - only the presence of their required companion keys is
/// checked here.
pub fn validate_properties(properties: &BTreeMap<String, String>) -> Result<(), SecurityError> {
    let auth = properties.get(KEY_AUTH_PLUGIN);
    let access = properties.get(KEY_ACCESS_PLUGIN);
    let crypto = properties.get(KEY_CRYPTO_PLUGIN);

    if let Some(plugin) = auth {
        require_keys(properties, plugin, AUTH_REQUIRED_KEYS)?;
    }
    if let Some(plugin) = access {
        if auth.is_none() {
            return Err(SecurityError::RequiresAuthentication(plugin.clone()));
        }
        require_keys(properties, plugin, ACCESS_REQUIRED_KEYS)?;
    }
    if let Some(plugin) = crypto {
        if auth.is_none() {
            return Err(SecurityError::RequiresAuthentication(plugin.clone()));
        }
    }
    Ok(())
}

fn require_keys(
    properties: &BTreeMap<String, String>,
    plugin: &str,
    keys: &[&str],
) -> Result<(), SecurityError> {
    for key in keys {
        match properties.get(*key) {
            None => {
                return Err(SecurityError::MissingKey {
                    plugin: plugin.to_string(),
                    key: (*key).to_string(),
                })
            }
            Some(value) if !value.starts_with("file://") => {
                return Err(SecurityError::InvalidCredentialUri {
                    key: (*key).to_string(),
                    value: value.clone(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Security property errors. Fatal at server start.
#[derive(Debug, Clone)]
pub enum SecurityError {
    /// A plugin is named but a required companion key is absent.
    MissingKey { plugin: String, key: String },
    /// The plugin depends on an authentication plugin being named.
    RequiresAuthentication(String),
    /// Credential values must be `file://` URIs.
    InvalidCredentialUri { key: String, value: String },
}

impl std::fmt::Display for SecurityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingKey { plugin, key } => {
                write!(f, "plugin {} requires property {}", plugin, key)
            }
            Self::RequiresAuthentication(plugin) => {
                write!(f, "plugin {} requires an authentication plugin", plugin)
            }
            Self::InvalidCredentialUri { key, value } => {
                write!(f, "{} must be a file:// URI, got {}", key, value)
            }
        }
    }
}

impl std::error::Error for SecurityError {}

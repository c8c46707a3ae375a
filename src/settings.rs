//! Loader for Maven `settings.xml` and `settings-security.xml` documents.
//! Parsing keeps every field verbatim; encrypted values are only unwrapped
//! later by the `crypto` module once a master key is available.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file unreadable: {0}")]
    NotFound(String),
    #[error("settings document malformed: {0}")]
    Malformed(String),
}

/// Credential and transport configuration for one remote repository or
/// service endpoint. `password` and `passphrase` may hold `{...}` encrypted
/// tokens; they are stored here exactly as written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, rename = "privateKey")]
    pub private_key: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Flat element-name to text map. Nested configuration blocks are not
    /// modeled.
    #[serde(default)]
    pub configuration: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mirror {
    pub id: String,
    #[serde(default, rename = "mirrorOf")]
    pub mirror_of: Option<String>,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    #[serde(default, rename = "activeByDefault")]
    pub active_by_default: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Profile {
    pub id: String,
    pub activation: Option<Activation>,
    pub repositories: Vec<Repository>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proxy {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub protocol: Option<String>,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, rename = "nonProxyHosts")]
    pub non_proxy_hosts: Option<String>,
}

/// Structured view of one parsed `settings.xml`. Immutable after
/// construction; callers extract credentials from it and drop it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettingsDocument {
    pub servers: Vec<Server>,
    pub mirrors: Vec<Mirror>,
    pub profiles: Vec<Profile>,
    pub active_profiles: Vec<String>,
    pub proxies: Vec<Proxy>,
}

impl SettingsDocument {
    fn from_raw(raw: RawSettings) -> Self {
        // Duplicate server ids keep the last occurrence, in keeping with how
        // later entries override earlier ones elsewhere in Maven settings.
        let mut servers: Vec<Server> = Vec::new();
        for server in raw.servers.server {
            if let Some(existing) = servers.iter_mut().find(|s| s.id == server.id) {
                *existing = server;
            } else {
                servers.push(server);
            }
        }

        let profiles = raw
            .profiles
            .profile
            .into_iter()
            .map(|p| Profile {
                id: p.id,
                activation: p.activation,
                repositories: p.repositories.repository,
            })
            .collect();

        Self {
            servers,
            mirrors: raw.mirrors.mirror,
            profiles,
            active_profiles: raw.active_profiles.active_profile,
            proxies: raw.proxies.proxy,
        }
    }

    /// Looks up a server entry by id.
    pub fn server(&self, id: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == id)
    }
}

/// Contents of a `settings-security.xml` file: an optional master password
/// (usually an encrypted token) or a relocation to another security file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SecuritySettings {
    #[serde(default)]
    pub master: Option<String>,
    #[serde(default)]
    pub relocation: Option<String>,
}

// Maven wraps each list in a container element (`<servers><server>..`), so
// deserialization goes through these wrapper structs before conversion into
// the public model.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(default)]
    servers: RawServers,
    #[serde(default)]
    mirrors: RawMirrors,
    #[serde(default)]
    profiles: RawProfiles,
    #[serde(default, rename = "activeProfiles")]
    active_profiles: RawActiveProfiles,
    #[serde(default)]
    proxies: RawProxies,
}

#[derive(Debug, Default, Deserialize)]
struct RawServers {
    #[serde(default)]
    server: Vec<Server>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMirrors {
    #[serde(default)]
    mirror: Vec<Mirror>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProfiles {
    #[serde(default)]
    profile: Vec<RawProfile>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    id: String,
    #[serde(default)]
    activation: Option<Activation>,
    #[serde(default)]
    repositories: RawRepositories,
}

#[derive(Debug, Default, Deserialize)]
struct RawRepositories {
    #[serde(default)]
    repository: Vec<Repository>,
}

#[derive(Debug, Default, Deserialize)]
struct RawActiveProfiles {
    #[serde(default, rename = "activeProfile")]
    active_profile: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProxies {
    #[serde(default)]
    proxy: Vec<Proxy>,
}

fn read_file(path: &Path) -> Result<String, SettingsError> {
    fs::read_to_string(path)
        .map_err(|e| SettingsError::NotFound(format!("{}: {e}", path.display())))
}

/// Parses a `settings.xml` file into the structured model. Read-only and
/// idempotent; parsing the same file twice yields equal documents.
pub fn load_settings(path: impl AsRef<Path>) -> Result<SettingsDocument, SettingsError> {
    let xml = read_file(path.as_ref())?;
    let raw: RawSettings =
        quick_xml::de::from_str(&xml).map_err(|e| SettingsError::Malformed(format!("{e}")))?;
    Ok(SettingsDocument::from_raw(raw))
}

/// Parses a `settings-security.xml` file. Values are trimmed because the
/// master token conventionally sits on its own indented line.
pub fn load_security_settings(path: impl AsRef<Path>) -> Result<SecuritySettings, SettingsError> {
    let xml = read_file(path.as_ref())?;
    let raw: SecuritySettings =
        quick_xml::de::from_str(&xml).map_err(|e| SettingsError::Malformed(format!("{e}")))?;
    Ok(SecuritySettings {
        master: raw.master.map(|m| m.trim().to_string()),
        relocation: raw.relocation.map(|r| r.trim().to_string()),
    })
}

//! Composition layer: parse settings, resolve the master key once, and hand
//! decrypted credentials and repository targets to the build-system caller.
//! Nothing here performs network access or repository registration; the
//! caller consumes the resolved values and does its own wiring.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::crypto::dispatcher::{self, DispatchError, MasterKey, PlaintextPolicy};
use crate::settings::{self, Mirror, Profile, Server, SettingsDocument, SettingsError};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("`{0}` holds an encrypted value but no master password is configured")]
    MissingMaster(String),
}

/// One decrypted credential, the only artifact handed to the caller. The
/// secret is the server's password, or its passphrase when no password is
/// set. Callers own the plaintext from here on and must not log it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCredential {
    pub server_id: String,
    pub username: Option<String>,
    pub secret: String,
}

/// A repository target from an active profile, re-routed through a matching
/// mirror and joined with the credential of the server entry of the same id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRepository {
    pub id: String,
    pub url: String,
    pub credential: Option<ResolvedCredential>,
}

/// The active proxy with its password already decrypted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedProxy {
    pub protocol: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub non_proxy_hosts: Option<String>,
}

fn decrypt_value(
    owner: &str,
    raw: &str,
    master: Option<&MasterKey>,
    policy: PlaintextPolicy,
) -> Result<String, ResolveError> {
    match master {
        Some(key) => Ok(key.decrypt_field(raw, policy)?),
        None if dispatcher::is_encrypted_token(raw) => {
            Err(ResolveError::MissingMaster(owner.to_string()))
        }
        None => match policy {
            PlaintextPolicy::Allow => Ok(raw.to_string()),
            PlaintextPolicy::Reject => Err(DispatchError::UnsupportedToken.into()),
        },
    }
}

fn credential_for(
    server: &Server,
    master: Option<&MasterKey>,
    policy: PlaintextPolicy,
) -> Result<Option<ResolvedCredential>, ResolveError> {
    let raw = match server.password.as_deref().or(server.passphrase.as_deref()) {
        Some(raw) => raw,
        None => return Ok(None),
    };
    let secret = decrypt_value(&server.id, raw, master, policy)?;
    Ok(Some(ResolvedCredential {
        server_id: server.id.clone(),
        username: server.username.clone(),
        secret,
    }))
}

/// Decrypts the credentials of every server entry in an already-parsed
/// document. Servers without a password or passphrase are skipped.
pub fn resolve_document(
    doc: &SettingsDocument,
    master: Option<&MasterKey>,
    policy: PlaintextPolicy,
) -> Result<Vec<ResolvedCredential>, ResolveError> {
    let mut out = Vec::with_capacity(doc.servers.len());
    for server in &doc.servers {
        if let Some(credential) = credential_for(server, master, policy)? {
            out.push(credential);
        }
    }
    Ok(out)
}

/// End-to-end resolution from file paths: parse the settings file, resolve
/// the master key from the optional security file, decrypt every server
/// credential. The master key is computed once and reused for all entries.
pub fn resolve_credentials(
    settings_path: impl AsRef<Path>,
    security_path: Option<&Path>,
    policy: PlaintextPolicy,
) -> Result<Vec<ResolvedCredential>, ResolveError> {
    let doc = settings::load_settings(settings_path)?;
    let master = load_master(security_path)?;
    resolve_document(&doc, master.as_ref(), policy)
}

fn load_master(security_path: Option<&Path>) -> Result<Option<MasterKey>, ResolveError> {
    match security_path {
        Some(path) => Ok(dispatcher::master_key_from_file(path)?),
        None => Ok(None),
    }
}

/// Finds the first mirror whose `mirrorOf` patterns select the repository id.
pub fn find_mirror<'a>(doc: &'a SettingsDocument, repo_id: &str) -> Option<&'a Mirror> {
    doc.mirrors
        .iter()
        .find(|m| mirror_matches(m.mirror_of.as_deref(), repo_id))
}

/// Pattern language of `<mirrorOf>`: `*` and `external:*` select everything,
/// a comma-separated list selects ids, and a `!id` entry excludes that id.
/// Exclusions win over wildcards regardless of their position in the list.
fn mirror_matches(mirror_of: Option<&str>, repo_id: &str) -> bool {
    let Some(mirror_of) = mirror_of else {
        return false;
    };
    if mirror_of == "*" || mirror_of == "external:*" {
        return true;
    }
    let mut matched = false;
    for pattern in mirror_of.split(',') {
        let pattern = pattern.trim();
        if let Some(excluded) = pattern.strip_prefix('!') {
            if excluded == repo_id {
                return false;
            }
        } else if pattern == repo_id || pattern == "*" || pattern == "external:*" {
            matched = true;
        }
    }
    matched
}

fn profile_is_active(doc: &SettingsDocument, profile: &Profile) -> bool {
    doc.active_profiles.iter().any(|id| id == &profile.id)
        || profile
            .activation
            .as_ref()
            .and_then(|a| a.active_by_default)
            .unwrap_or(false)
}

/// Collects the repositories of every active profile, re-targets each through
/// a matching mirror, and attaches the decrypted credential of the server
/// entry whose id matches the effective (possibly mirrored) repository id.
pub fn resolve_repositories(
    doc: &SettingsDocument,
    master: Option<&MasterKey>,
    policy: PlaintextPolicy,
) -> Result<Vec<ResolvedRepository>, ResolveError> {
    let mut out = Vec::new();
    for profile in doc.profiles.iter().filter(|p| profile_is_active(doc, p)) {
        for repo in &profile.repositories {
            let (id, url) = match find_mirror(doc, &repo.id) {
                Some(mirror) => (mirror.id.clone(), mirror.url.clone()),
                None => (repo.id.clone(), repo.url.clone()),
            };
            let credential = match doc.server(&id) {
                Some(server) => credential_for(server, master, policy)?,
                None => None,
            };
            out.push(ResolvedRepository { id, url, credential });
        }
    }
    Ok(out)
}

/// Returns the first proxy not explicitly deactivated, with its password
/// decrypted. `<active>` defaults to true when absent.
pub fn resolve_proxy(
    doc: &SettingsDocument,
    master: Option<&MasterKey>,
    policy: PlaintextPolicy,
) -> Result<Option<ResolvedProxy>, ResolveError> {
    let proxy = match doc.proxies.iter().find(|p| p.active.unwrap_or(true)) {
        Some(proxy) => proxy,
        None => return Ok(None),
    };
    let owner = proxy.id.as_deref().unwrap_or(&proxy.host);
    let password = match proxy.password.as_deref() {
        Some(raw) => Some(decrypt_value(owner, raw, master, policy)?),
        None => None,
    };
    Ok(Some(ResolvedProxy {
        protocol: proxy.protocol.clone(),
        host: proxy.host.clone(),
        port: proxy.port,
        username: proxy.username.clone(),
        password,
        non_proxy_hosts: proxy.non_proxy_hosts.clone(),
    }))
}

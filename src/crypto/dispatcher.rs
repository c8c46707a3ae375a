//! Token decoration and master-password handling. Encrypted values travel as
//! `{base64}` tokens, possibly surrounded by free text and possibly carrying
//! an attribute prefix; the master password itself is stored encrypted under
//! a fixed, publicly known passphrase.

use std::path::{Path, PathBuf};

use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::cipher::{self, CipherError};
use crate::settings::{self, SecuritySettings, SettingsError};

/// Fixed passphrase the ecosystem uses to encrypt the master password itself.
/// Must match Maven's constant byte for byte or existing security files stop
/// decrypting.
pub const DEFAULT_MASTER_PASSPHRASE: &str = "settings.security";

/// Relocation chains longer than this are treated as cycles.
const MAX_RELOCATIONS: usize = 5;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("value is not an encrypted token and plaintext use is not permitted")]
    UnsupportedToken,
    #[error("security settings contain no master password")]
    MissingMaster,
    #[error("security file relocation chain is too deep, assuming a cycle")]
    RelocationLoop,
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Whether a credential field without the `{...}` wrapper may be used as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaintextPolicy {
    Allow,
    Reject,
}

/// Extracts the payload between the first unescaped `{` and the next
/// unescaped `}`. Text around the braces is ignored, so annotated values
/// like `reset 2024-03-11 {CFUju8n8eKQHj8u=}` still resolve. Empty braces do
/// not count as a token.
pub fn unwrap_token(value: &str) -> Option<&str> {
    let bytes = value.as_bytes();
    let mut start = None;
    for (i, &b) in bytes.iter().enumerate() {
        let escaped = i > 0 && bytes[i - 1] == b'\\';
        match b {
            b'{' if start.is_none() && !escaped => start = Some(i + 1),
            b'}' if !escaped => {
                if let Some(s) = start {
                    return if i > s { Some(&value[s..i]) } else { None };
                }
            }
            _ => {}
        }
    }
    None
}

/// True when the value carries a `{...}` encrypted token.
pub fn is_encrypted_token(value: &str) -> bool {
    unwrap_token(value).is_some()
}

/// Drops an optional `[key=value,...]` attribute prefix from a token payload.
fn strip_attributes(payload: &str) -> &str {
    if let Some(rest) = payload.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[end + 1..];
        }
    }
    payload
}

/// Master password resolved once per run. The plaintext is zeroed on drop so
/// it does not outlive the resolution pass.
pub struct MasterKey {
    value: String,
}

impl MasterKey {
    /// Resolves the master password from parsed security settings. An
    /// encrypted `<master>` entry is decrypted with the fixed default
    /// passphrase; a plaintext entry is used directly.
    pub fn resolve(security: &SecuritySettings) -> Result<Self, DispatchError> {
        let master = security
            .master
            .as_deref()
            .ok_or(DispatchError::MissingMaster)?;
        let value = match unwrap_token(master) {
            Some(payload) => {
                cipher::decrypt64(strip_attributes(payload), DEFAULT_MASTER_PASSPHRASE)?
            }
            None => master.to_string(),
        };
        Ok(Self { value })
    }

    /// Wraps an already-known plaintext master password.
    pub fn from_plaintext(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Decrypts one credential field. Values without the token wrapper pass
    /// through unchanged under `PlaintextPolicy::Allow` and are rejected
    /// otherwise.
    pub fn decrypt_field(
        &self,
        value: &str,
        policy: PlaintextPolicy,
    ) -> Result<String, DispatchError> {
        match unwrap_token(value) {
            Some(payload) => Ok(cipher::decrypt64(strip_attributes(payload), &self.value)?),
            None => match policy {
                PlaintextPolicy::Allow => Ok(value.to_string()),
                PlaintextPolicy::Reject => Err(DispatchError::UnsupportedToken),
            },
        }
    }

    /// Wraps a plaintext in an encrypted token using this master key, the
    /// counterpart of `mvn --encrypt-password`.
    pub fn encrypt_field(&self, plaintext: &str) -> Result<String, DispatchError> {
        Ok(decorate(&cipher::encrypt64(plaintext, &self.value)?))
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

/// Wraps a base64 payload in the `{...}` token delimiters.
pub fn decorate(payload: &str) -> String {
    format!("{{{payload}}}")
}

/// Loads a security settings file, following `<relocation>` redirects, and
/// resolves the master key it holds. Returns `Ok(None)` when the file chain
/// ends without a `<master>` element, which only becomes an error once an
/// encrypted field actually needs the key.
pub fn master_key_from_file(path: impl AsRef<Path>) -> Result<Option<MasterKey>, DispatchError> {
    let mut current = path.as_ref().to_path_buf();
    for _ in 0..=MAX_RELOCATIONS {
        let security = settings::load_security_settings(&current)?;
        if let Some(target) = security.relocation.as_deref().filter(|t| !t.is_empty()) {
            current = PathBuf::from(target);
            continue;
        }
        return match security.master {
            Some(_) => MasterKey::resolve(&security).map(Some),
            None => Ok(None),
        };
    }
    Err(DispatchError::RelocationLoop)
}

#[cfg(test)]
mod tests {
    use super::{
        decorate, is_encrypted_token, master_key_from_file, unwrap_token, DispatchError,
        MasterKey, PlaintextPolicy,
    };
    use crate::settings::SecuritySettings;
    use std::fs;
    use tempfile::{tempdir, NamedTempFile};

    // "velvet otter" encrypted under the fixed default passphrase, and
    // "deploy-secret" encrypted under "velvet otter".
    const MASTER_TOKEN: &str = "{AQIDBAUGBwgH+OEBDEBZYhsn+laUzGaZEaqqqqqqqqo=}";
    const SERVER_TOKEN: &str = "{CQoLDA0ODxAHnm1WfM7R8chxDCKOm4XnvlxcXFxcXFw=}";

    fn security(master: &str) -> SecuritySettings {
        SecuritySettings {
            master: Some(master.to_string()),
            relocation: None,
        }
    }

    #[test]
    fn unwraps_token_shapes() {
        assert_eq!(unwrap_token("{abc==}"), Some("abc=="));
        assert_eq!(unwrap_token("reset on 2024-03-11 {abc==} by ops"), Some("abc=="));
        assert_eq!(unwrap_token("plain-password"), None);
        assert_eq!(unwrap_token("{}"), None);
        // Escaped braces are literal characters, not delimiters.
        assert_eq!(unwrap_token(r"pass\{word\}"), None);
        assert!(is_encrypted_token("{abc==}"));
        assert!(!is_encrypted_token("hunter2"));
    }

    #[test]
    fn resolves_encrypted_master_password() {
        let key = MasterKey::resolve(&security(MASTER_TOKEN)).expect("master should resolve");
        assert_eq!(
            key.decrypt_field(SERVER_TOKEN, PlaintextPolicy::Reject)
                .expect("server token should decrypt"),
            "deploy-secret"
        );
    }

    #[test]
    fn uses_plaintext_master_directly() {
        let key = MasterKey::resolve(&security("velvet otter")).expect("master should resolve");
        assert_eq!(
            key.decrypt_field(SERVER_TOKEN, PlaintextPolicy::Reject)
                .expect("server token should decrypt"),
            "deploy-secret"
        );
    }

    #[test]
    fn strips_attribute_prefix_before_decrypting() {
        let key = MasterKey::from_plaintext("velvet otter");
        let annotated = "{[type=AES,mode=CBC]CQoLDA0ODxAHnm1WfM7R8chxDCKOm4XnvlxcXFxcXFw=}";
        assert_eq!(
            key.decrypt_field(annotated, PlaintextPolicy::Reject)
                .expect("annotated token should decrypt"),
            "deploy-secret"
        );
    }

    #[test]
    fn plaintext_policy_gates_unwrapped_values() {
        let key = MasterKey::from_plaintext("velvet otter");
        assert_eq!(
            key.decrypt_field("hunter2", PlaintextPolicy::Allow)
                .expect("plaintext should pass through"),
            "hunter2"
        );
        assert!(matches!(
            key.decrypt_field("hunter2", PlaintextPolicy::Reject),
            Err(DispatchError::UnsupportedToken)
        ));
    }

    #[test]
    fn encrypt_field_round_trips_through_decorate() {
        let key = MasterKey::from_plaintext("velvet otter");
        let token = key.encrypt_field("fresh-secret").expect("encryption should succeed");
        assert!(token.starts_with('{') && token.ends_with('}'));
        assert_eq!(
            key.decrypt_field(&token, PlaintextPolicy::Reject)
                .expect("fresh token should decrypt"),
            "fresh-secret"
        );
        assert_eq!(decorate("abc"), "{abc}");
    }

    #[test]
    fn missing_master_is_an_error() {
        let empty = SecuritySettings::default();
        assert!(matches!(
            MasterKey::resolve(&empty),
            Err(DispatchError::MissingMaster)
        ));
    }

    #[test]
    fn follows_security_file_relocation() {
        let dir = tempdir().expect("temp dir");
        let target = dir.path().join("relocated-security.xml");
        fs::write(
            &target,
            format!("<settingsSecurity><master>{MASTER_TOKEN}</master></settingsSecurity>"),
        )
        .expect("fixture write");

        let entry = NamedTempFile::new().expect("temp file");
        fs::write(
            entry.path(),
            format!(
                "<settingsSecurity><relocation>{}</relocation></settingsSecurity>",
                target.display()
            ),
        )
        .expect("fixture write");

        let key = master_key_from_file(entry.path())
            .expect("relocation should resolve")
            .expect("master should be present");
        assert_eq!(
            key.decrypt_field(SERVER_TOKEN, PlaintextPolicy::Reject)
                .expect("server token should decrypt"),
            "deploy-secret"
        );
    }

    #[test]
    fn relocation_cycles_are_cut_off() {
        let entry = NamedTempFile::new().expect("temp file");
        fs::write(
            entry.path(),
            format!(
                "<settingsSecurity><relocation>{}</relocation></settingsSecurity>",
                entry.path().display()
            ),
        )
        .expect("fixture write");

        assert!(matches!(
            master_key_from_file(entry.path()),
            Err(DispatchError::RelocationLoop)
        ));
    }

    #[test]
    fn security_file_without_master_yields_no_key() {
        let entry = NamedTempFile::new().expect("temp file");
        fs::write(entry.path(), "<settingsSecurity></settingsSecurity>").expect("fixture write");
        assert!(master_key_from_file(entry.path())
            .expect("load should succeed")
            .is_none());
    }
}

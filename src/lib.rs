//! Rust rewrite of the Maven settings credential core. Parses `settings.xml`
//! and `settings-security.xml`, resolves the master password, and decrypts
//! server credentials so a build tool can configure repository authentication
//! without shelling out to Maven.

pub mod crypto;
pub mod resolver;
pub mod settings;

//! Minimal CLI standing in for the build-tool adapter. Commands are
//! intentionally small and auditable so operators can see exactly how
//! settings credentials are handled.

use std::env;
use std::path::Path;

use serde_json::json;
use mvn_settings_rs::crypto::cipher::encrypt64;
use mvn_settings_rs::crypto::dispatcher::{
    decorate, master_key_from_file, PlaintextPolicy, DEFAULT_MASTER_PASSPHRASE,
};
use mvn_settings_rs::resolver::{resolve_credentials, resolve_proxy, resolve_repositories};
use mvn_settings_rs::settings::load_settings;

fn print_usage() {
    eprintln!("Commands:\n  encrypt-master-password <plaintext>\n  encrypt-password <plaintext> <security-file>\n  decrypt-password <token> <security-file>\n  resolve <settings-file> [security-file]\n  repos <settings-file> [security-file]\n  show <settings-file>");
}

fn security_arg(args: &[String], index: usize) -> Option<&Path> {
    args.get(index).map(Path::new)
}

fn load_master(path: &str) -> Option<mvn_settings_rs::crypto::dispatcher::MasterKey> {
    match master_key_from_file(path) {
        Ok(Some(key)) => Some(key),
        Ok(None) => {
            eprintln!("security file holds no master password");
            None
        }
        Err(err) => {
            eprintln!("master password resolution failed: {err}");
            None
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "encrypt-master-password" => {
            if args.len() != 3 {
                return print_usage();
            }
            match encrypt64(&args[2], DEFAULT_MASTER_PASSPHRASE) {
                Ok(payload) => println!("{}", decorate(&payload)),
                Err(err) => eprintln!("encryption failed: {err}"),
            }
        }
        "encrypt-password" => {
            if args.len() != 4 {
                return print_usage();
            }
            let Some(master) = load_master(&args[3]) else {
                return;
            };
            match master.encrypt_field(&args[2]) {
                Ok(token) => println!("{token}"),
                Err(err) => eprintln!("encryption failed: {err}"),
            }
        }
        "decrypt-password" => {
            if args.len() != 4 {
                return print_usage();
            }
            let Some(master) = load_master(&args[3]) else {
                return;
            };
            match master.decrypt_field(&args[2], PlaintextPolicy::Reject) {
                Ok(plaintext) => println!("{plaintext}"),
                Err(err) => eprintln!("decryption failed: {err}"),
            }
        }
        "resolve" => {
            if args.len() != 3 && args.len() != 4 {
                return print_usage();
            }
            match resolve_credentials(&args[2], security_arg(&args, 3), PlaintextPolicy::Allow) {
                Ok(credentials) => {
                    println!("{}", serde_json::to_string_pretty(&credentials).unwrap())
                }
                Err(err) => eprintln!("credential resolution failed: {err}"),
            }
        }
        "repos" => {
            if args.len() != 3 && args.len() != 4 {
                return print_usage();
            }
            let doc = match load_settings(&args[2]) {
                Ok(doc) => doc,
                Err(err) => return eprintln!("settings load failed: {err}"),
            };
            let master = match security_arg(&args, 3) {
                Some(path) => match master_key_from_file(path) {
                    Ok(key) => key,
                    Err(err) => return eprintln!("master password resolution failed: {err}"),
                },
                None => None,
            };
            let repos = match resolve_repositories(&doc, master.as_ref(), PlaintextPolicy::Allow) {
                Ok(repos) => repos,
                Err(err) => return eprintln!("repository resolution failed: {err}"),
            };
            let proxy = match resolve_proxy(&doc, master.as_ref(), PlaintextPolicy::Allow) {
                Ok(proxy) => proxy,
                Err(err) => return eprintln!("proxy resolution failed: {err}"),
            };
            let printable = json!({ "repositories": repos, "proxy": proxy });
            println!("{}", serde_json::to_string_pretty(&printable).unwrap());
        }
        "show" => {
            if args.len() != 3 {
                return print_usage();
            }
            match load_settings(&args[2]) {
                Ok(mut doc) => {
                    // Redact credential fields before printing; `resolve` is
                    // the command that intentionally emits plaintext.
                    for server in &mut doc.servers {
                        if server.password.is_some() {
                            server.password = Some("<redacted>".to_string());
                        }
                        if server.passphrase.is_some() {
                            server.passphrase = Some("<redacted>".to_string());
                        }
                    }
                    for proxy in &mut doc.proxies {
                        if proxy.password.is_some() {
                            proxy.password = Some("<redacted>".to_string());
                        }
                    }
                    println!("{}", serde_json::to_string_pretty(&doc).unwrap());
                }
                Err(err) => eprintln!("settings load failed: {err}"),
            }
        }
        _ => print_usage(),
    }
}

//! vaultship — interactive provisioner for a self-hosted vault server.
//!
//! One strictly sequential run: preflight, cleanup of any previous
//! deployment, interactive input collection, certificate acquisition,
//! artifact materialization (settings, systemd unit, nginx site), image
//! pull, firewall, optional login dashboard, service start with one
//! recovery attempt, and backup scheduling.

use std::sync::LazyLock;

pub mod backup;
pub mod certs;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod preflight;
pub mod render;
pub mod service;

/// Field descriptor table entry: prompt section/name, env-var override,
/// prompt label, hardcoded default, secret flag (redacted in logs).
#[macro_export]
macro_rules! define_fields {
    [$($sec:literal / $name:literal => $ev:literal, $label:literal, $def:literal, $secret:literal,)*] => {
        &[$($crate::config::Fd {
            sec: $sec,
            name: $name,
            ev: $ev,
            label: $label,
            d: $def,
            s: $secret,
        },)*]
    };
}

pub static FIELD_DESCRIPTORS: LazyLock<Vec<config::Fd>> = LazyLock::new(|| {
    [
        IDENTITY_FD, CERT_FD, NETWORK_FD, RUNTIME_FD, DB_FD, SMTP_FD, FEATURE_FD,
    ]
    .iter()
    .flat_map(|group| group.iter().cloned())
    .collect()
});

pub const IDENTITY_FD: &[config::Fd] = define_fields![
    "identity"/"domain"          => "VAULTSHIP_DOMAIN",        "Fully qualified domain name (e.g. vault.example.com)", "",        false,
    "identity"/"email"           => "VAULTSHIP_EMAIL",         "Contact email (certificate registration)",             "",        false,
    "identity"/"org_name"        => "VAULTSHIP_ORG_NAME",      "Organization name (wildcard certificate request)",     "",        false,
];

pub const CERT_FD: &[config::Fd] = define_fields![
    "certificate"/"cert_path"    => "VAULTSHIP_CERT_PATH",     "Path to existing certificate (PEM)",                   "",        false,
    "certificate"/"key_path"     => "VAULTSHIP_KEY_PATH",      "Path to existing private key (PEM)",                   "",        false,
    "certificate"/"csr_path"     => "VAULTSHIP_CSR_PATH",      "Path to existing certificate request (PEM)",           "",        false,
];

pub const NETWORK_FD: &[config::Fd] = define_fields![
    "network"/"external_port"    => "VAULTSHIP_EXTERNAL_PORT", "External HTTPS port (client-facing)",                  "443",     false,
    "network"/"internal_port"    => "VAULTSHIP_INTERNAL_PORT", "Internal HTTPS port (nginx listen)",                   "443",     false,
];

pub const RUNTIME_FD: &[config::Fd] = define_fields![
    "runtime"/"image_tag"        => "VAULTSHIP_IMAGE_TAG",     "Application image version tag",                        "latest",  false,
    "runtime"/"admin_token"      => "VAULTSHIP_ADMIN_TOKEN",   "Admin access token (press Enter to use generated)",    "",        true,
];

pub const DB_FD: &[config::Fd] = define_fields![
    "database"/"db_host"         => "VAULTSHIP_DB_HOST",       "Database host",                                        "127.0.0.1", false,
    "database"/"db_port"         => "VAULTSHIP_DB_PORT",       "Database port",                                        "",        false,
    "database"/"db_name"         => "VAULTSHIP_DB_NAME",       "Database name",                                        "vault",   false,
    "database"/"db_user"         => "VAULTSHIP_DB_USER",       "Database user",                                        "vault",   false,
    "database"/"db_password"     => "VAULTSHIP_DB_PASSWORD",   "Database password",                                    "",        true,
];

pub const SMTP_FD: &[config::Fd] = define_fields![
    "smtp"/"smtp_host"           => "VAULTSHIP_SMTP_HOST",     "SMTP relay host (press Enter to skip mail)",           "",        false,
    "smtp"/"smtp_port"           => "VAULTSHIP_SMTP_PORT",     "SMTP relay port",                                      "587",     false,
    "smtp"/"smtp_username"       => "VAULTSHIP_SMTP_USERNAME", "SMTP username",                                        "",        false,
    "smtp"/"smtp_password"       => "VAULTSHIP_SMTP_PASSWORD", "SMTP password",                                        "",        true,
    "smtp"/"smtp_from"           => "VAULTSHIP_SMTP_FROM",     "SMTP from-address",                                    "",        false,
];

pub const FEATURE_FD: &[config::Fd] = define_fields![
    "feature"/"dashboard"        => "VAULTSHIP_DASHBOARD",     "Install login status dashboard? (y/n)",                "y",       false,
];

/// Look up a descriptor by env-var name. Panics only on a typo in our own
/// tables, never on user input.
pub fn fd(ev: &str) -> &'static config::Fd {
    FIELD_DESCRIPTORS
        .iter()
        .find(|fd| fd.ev == ev)
        .unwrap_or_else(|| panic!("unknown field descriptor {}", ev))
}

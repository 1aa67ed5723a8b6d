//! configuration record, runtime defaults, and interactive collection
//!
//! The [`SetupConfig`] record is built once by `collect_config`, refined by
//! the certificate stage (default paths filled in), and never mutated by
//! any later stage. It dies with the process — the generated artifacts on
//! disk are the durable state.

use serde::{Deserialize, Serialize};

use std::{
    error::Error,
    fs,
    io::{self},
    path::{Path, PathBuf},
};

use crate::{
    certs::base_domain,
    cli::{
        prompt_continue, read_choice, read_input, read_secret_input, read_validated,
        redact_if_secret, validate_domain, validate_email, validate_non_empty, validate_port,
    },
    fd,
};

// ── Field descriptors ──

/// One field descriptor row (see `define_fields!` in lib.rs).
#[derive(Clone)]
pub struct Fd {
    pub sec: &'static str,
    pub name: &'static str,
    pub ev: &'static str,
    pub label: &'static str,
    pub d: &'static str,
    pub s: bool,
}

// ── Configuration record ──

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertMode {
    /// Automated single-domain issuance via the ACME client.
    LetsEncrypt,
    /// Manual wildcard flow: generate key + CSR, wait for the signed cert.
    WildcardNew,
    /// Import an existing certificate/key pair.
    ImportExisting,
    /// Resume an interrupted wildcard flow from existing key + CSR.
    WildcardResume,
}

impl CertMode {
    pub fn label(&self) -> &'static str {
        match self {
            CertMode::LetsEncrypt => "Let's Encrypt (automated, public domain)",
            CertMode::WildcardNew => "Wildcard via your own CA (generate key + CSR, manual signing)",
            CertMode::ImportExisting => "Import an existing certificate and key",
            CertMode::WildcardResume => "Resume an interrupted wildcard request",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbBackend {
    Sqlite,
    Mysql,
    Postgres,
}

impl DbBackend {
    pub fn label(&self) -> &'static str {
        match self {
            DbBackend::Sqlite => "SQLite (embedded, default)",
            DbBackend::Mysql => "MySQL / MariaDB",
            DbBackend::Postgres => "PostgreSQL",
        }
    }

    pub fn default_port(&self) -> &'static str {
        match self {
            DbBackend::Sqlite => "",
            DbBackend::Mysql => "3306",
            DbBackend::Postgres => "5432",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub backend: DbBackend,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

/// Certificate-stage inputs. `cert_path` is the operator-supplied cert in
/// import mode, and the drop path watched for the signed artifact in the
/// wildcard modes.
#[derive(Clone, Debug)]
pub struct CertInputs {
    pub mode: CertMode,
    pub email: String,
    pub org_name: String,
    pub base_domain: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub csr_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct SetupConfig {
    pub domain: String,
    pub cert: CertInputs,
    pub external_port: u16,
    pub internal_port: u16,
    pub access_url: String,
    pub image_tag: String,
    pub db: DbConfig,
    pub admin_token: String,
    pub smtp: Option<SmtpConfig>,
    pub install_dashboard: bool,
}

// ── Runtime defaults (loaded from env vars, with hardcoded fallbacks) ──

#[derive(Clone)]
pub struct RuntimeDefaults {
    pub image_repo: String,
    pub container_name: String,
    pub unit_name: String,
    pub unit_path: PathBuf,
    pub install_dir: PathBuf,
    pub data_dir: PathBuf,
    pub tls_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_prefix: String,
    pub backup_script_path: PathBuf,
    pub dashboard_path: PathBuf,
    pub nginx_site_path: PathBuf,
    pub letsencrypt_dir: PathBuf,
    pub log_path: PathBuf,
    pub probe_url: String,
    pub app_port: u16,
    pub settle_secs: u64,
    pub poll_interval_secs: u64,
    pub wait_prompt: String,
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

impl RuntimeDefaults {
    pub fn load() -> Self {
        let install_dir = PathBuf::from(env_or("VAULTSHIP_INSTALL_DIR", "/opt/vaultship"));
        Self {
            image_repo: env_or("VAULTSHIP_IMAGE_REPO", "vaultwarden/server"),
            container_name: env_or("VAULTSHIP_CONTAINER", "vaultship"),
            unit_name: env_or("VAULTSHIP_UNIT", "vaultship.service"),
            unit_path: PathBuf::from(env_or(
                "VAULTSHIP_UNIT_PATH",
                "/etc/systemd/system/vaultship.service",
            )),
            data_dir: PathBuf::from(env_or("VAULTSHIP_DATA_DIR", "/opt/vaultship/data")),
            tls_dir: PathBuf::from(env_or("VAULTSHIP_TLS_DIR", "/opt/vaultship/tls")),
            backup_dir: PathBuf::from(env_or("VAULTSHIP_BACKUP_DIR", "/opt/vaultship/backups")),
            backup_prefix: env_or("VAULTSHIP_BACKUP_PREFIX", "vaultship"),
            backup_script_path: PathBuf::from(env_or(
                "VAULTSHIP_BACKUP_SCRIPT",
                "/usr/local/sbin/vaultship-backup.sh",
            )),
            dashboard_path: PathBuf::from(env_or(
                "VAULTSHIP_DASHBOARD_PATH",
                "/etc/profile.d/vaultship-status.sh",
            )),
            nginx_site_path: PathBuf::from(env_or(
                "VAULTSHIP_NGINX_SITE",
                "/etc/nginx/conf.d/vaultship.conf",
            )),
            letsencrypt_dir: PathBuf::from(env_or("VAULTSHIP_LETSENCRYPT_DIR", "/etc/letsencrypt")),
            log_path: PathBuf::from(env_or("VAULTSHIP_LOG_PATH", "/var/log/vaultship-setup.log")),
            probe_url: env_or("VAULTSHIP_PROBE_URL", "https://hub.docker.com"),
            app_port: env_or("VAULTSHIP_APP_PORT", "8080").parse().unwrap_or(8080),
            settle_secs: env_or("VAULTSHIP_SETTLE_SECS", "10").parse().unwrap_or(10),
            poll_interval_secs: env_or("VAULTSHIP_POLL_INTERVAL_SECS", "30")
                .parse()
                .unwrap_or(30),
            wait_prompt: env_or(
                "VAULTSHIP_WAIT_PROMPT",
                "Signed certificate not found yet. Submit the CSR to your CA and place the result at",
            ),
            install_dir,
        }
    }

    pub fn env_file(&self) -> PathBuf {
        self.install_dir.join("vault.env")
    }

    pub fn admin_record_path(&self) -> PathBuf {
        self.install_dir.join("admin-token.txt")
    }

    /// Managed destination for the resolved certificate/key pair (wildcard
    /// and import modes; Let's Encrypt serves straight from its live dir).
    pub fn managed_cert_path(&self) -> PathBuf {
        self.tls_dir.join("fullchain.pem")
    }

    pub fn managed_key_path(&self) -> PathBuf {
        self.tls_dir.join("privkey.pem")
    }
}

/// Resolve a default value with priority: env var > saved answer > field default.
pub fn default_val(ev: &str, saved: Option<&str>) -> String {
    std::env::var(ev)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| saved.unwrap_or(fd(ev).d).to_string())
}

// ── Derivations ──

/// `https://domain` on the default HTTPS port, else `https://domain:port`.
pub fn access_url(domain: &str, external_port: u16) -> String {
    if external_port == 443 {
        format!("https://{}", domain)
    } else {
        format!("https://{}:{}", domain, external_port)
    }
}

/// Outbound mail is all-or-nothing: a relay is configured only when both
/// the host and the from-address are present. A partially filled set is
/// reported and dropped entirely — no partial keys reach the settings file.
pub fn build_smtp(
    host: String,
    port: u16,
    username: String,
    password: String,
    from_address: String,
) -> Option<SmtpConfig> {
    let any_given = !host.is_empty() || !username.is_empty() || !from_address.is_empty();
    if host.is_empty() || from_address.is_empty() {
        if any_given {
            tracing::warn!(
                "  Warning: SMTP host and from-address are both required — mail relay disabled."
            );
        }
        return None;
    }
    Some(SmtpConfig {
        host,
        port,
        username,
        password,
        from_address,
    })
}

/// Generate a random alphanumeric credential string of the given length.
pub fn generate_credential(len: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

// ── Saved answers (non-secret prompt defaults for re-runs) ──

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct SavedAnswers {
    pub domain: String,
    pub email: String,
    pub org_name: String,
    pub external_port: String,
    pub internal_port: String,
    pub image_tag: String,
    pub db_host: String,
    pub db_port: String,
    pub db_name: String,
    pub db_user: String,
    pub smtp_host: String,
    pub smtp_port: String,
    pub smtp_username: String,
    pub smtp_from: String,
    pub install_dashboard: bool,
}

pub fn answers_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/root"))
        .join(".vaultship")
        .join("answers.json")
}

pub fn save_answers(config: &SetupConfig) -> Result<(), Box<dyn Error>> {
    let answers = SavedAnswers {
        domain: config.domain.clone(),
        email: config.cert.email.clone(),
        org_name: config.cert.org_name.clone(),
        external_port: config.external_port.to_string(),
        internal_port: config.internal_port.to_string(),
        image_tag: config.image_tag.clone(),
        db_host: config.db.host.clone(),
        db_port: if config.db.port == 0 {
            String::new()
        } else {
            config.db.port.to_string()
        },
        db_name: config.db.name.clone(),
        db_user: config.db.user.clone(),
        smtp_host: config.smtp.as_ref().map(|s| s.host.clone()).unwrap_or_default(),
        smtp_port: config
            .smtp
            .as_ref()
            .map(|s| s.port.to_string())
            .unwrap_or_default(),
        smtp_username: config
            .smtp
            .as_ref()
            .map(|s| s.username.clone())
            .unwrap_or_default(),
        smtp_from: config
            .smtp
            .as_ref()
            .map(|s| s.from_address.clone())
            .unwrap_or_default(),
        install_dashboard: config.install_dashboard,
    };
    let path = answers_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, serde_json::to_string_pretty(&answers)?)?;
    Ok(())
}

pub fn load_answers() -> Option<SavedAnswers> {
    let contents = fs::read_to_string(answers_path()).ok()?;
    serde_json::from_str(&contents).ok()
}

// ── Interactive collection ──

fn nonempty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub fn collect_config(
    lines: &mut io::Lines<io::StdinLock<'_>>,
    defaults: &RuntimeDefaults,
) -> Result<SetupConfig, Box<dyn Error>> {
    let saved = load_answers();
    if let Some(s) = &saved {
        if !s.domain.is_empty() {
            tracing::info!("  Found saved answers from a previous run (domain: {})", s.domain);
        }
    }
    let saved = saved.unwrap_or_default();

    tracing::info!("\n── Identity ──");
    let d = default_val("VAULTSHIP_DOMAIN", nonempty(&saved.domain));
    let domain = read_validated(
        lines,
        fd("VAULTSHIP_DOMAIN").label,
        nonempty(&d),
        validate_domain,
    )?;

    tracing::info!("\n── Certificate ──");
    let mode = match read_choice(
        lines,
        "Certificate mode:",
        &[
            CertMode::LetsEncrypt.label(),
            CertMode::WildcardNew.label(),
            CertMode::ImportExisting.label(),
            CertMode::WildcardResume.label(),
        ],
    )? {
        0 => CertMode::LetsEncrypt,
        1 => CertMode::WildcardNew,
        2 => CertMode::ImportExisting,
        _ => CertMode::WildcardResume,
    };

    let mut email = String::new();
    let mut org_name = String::new();
    let mut base = String::new();
    let mut cert_path = PathBuf::new();
    let mut key_path = PathBuf::new();
    let mut csr_path = PathBuf::new();

    match mode {
        CertMode::LetsEncrypt => {
            let d = default_val("VAULTSHIP_EMAIL", nonempty(&saved.email));
            email = read_validated(lines, fd("VAULTSHIP_EMAIL").label, nonempty(&d), validate_email)?;
        }
        CertMode::WildcardNew => {
            let d = default_val("VAULTSHIP_ORG_NAME", nonempty(&saved.org_name));
            org_name = read_validated(
                lines,
                fd("VAULTSHIP_ORG_NAME").label,
                nonempty(&d),
                validate_non_empty,
            )?;
            base = prompt_base_domain(lines, &domain)?;
            key_path = default_wildcard_path(lines, defaults, "privkey.pem", "Private key path")?;
            csr_path = default_wildcard_path(lines, defaults, "request.csr", "CSR output path")?;
            cert_path =
                default_wildcard_path(lines, defaults, "signed.pem", "Signed certificate drop path")?;
        }
        CertMode::ImportExisting => {
            let cp = read_validated(
                lines,
                fd("VAULTSHIP_CERT_PATH").label,
                None,
                existing_file_validator,
            )?;
            let kp = read_validated(
                lines,
                fd("VAULTSHIP_KEY_PATH").label,
                None,
                existing_file_validator,
            )?;
            cert_path = PathBuf::from(cp);
            key_path = PathBuf::from(kp);
        }
        CertMode::WildcardResume => {
            base = prompt_base_domain(lines, &domain)?;
            let kp = read_validated(
                lines,
                fd("VAULTSHIP_KEY_PATH").label,
                Some(&defaults.tls_dir.join("privkey.pem").display().to_string()),
                existing_file_validator,
            )?;
            let cp = read_validated(
                lines,
                fd("VAULTSHIP_CSR_PATH").label,
                Some(&defaults.tls_dir.join("request.csr").display().to_string()),
                existing_file_validator,
            )?;
            key_path = PathBuf::from(kp);
            csr_path = PathBuf::from(cp);
            cert_path =
                default_wildcard_path(lines, defaults, "signed.pem", "Signed certificate drop path")?;
        }
    }

    tracing::info!("\n── Network ──");
    let d = default_val("VAULTSHIP_EXTERNAL_PORT", nonempty(&saved.external_port));
    let external_port: u16 = read_validated(
        lines,
        fd("VAULTSHIP_EXTERNAL_PORT").label,
        Some(&d),
        validate_port,
    )?
    .parse()?;
    let d = default_val("VAULTSHIP_INTERNAL_PORT", nonempty(&saved.internal_port));
    let internal_port: u16 = read_validated(
        lines,
        fd("VAULTSHIP_INTERNAL_PORT").label,
        Some(&d),
        validate_port,
    )?
    .parse()?;
    let access_url = access_url(&domain, external_port);
    tracing::info!("  Access URL: {}", access_url);

    tracing::info!("\n── Runtime ──");
    let d = default_val("VAULTSHIP_IMAGE_TAG", nonempty(&saved.image_tag));
    let image_tag = read_validated(
        lines,
        fd("VAULTSHIP_IMAGE_TAG").label,
        Some(&d),
        validate_non_empty,
    )?;

    let db = collect_db(lines, &saved)?;

    let generated = generate_credential(48);
    let admin_token = read_secret_input(fd("VAULTSHIP_ADMIN_TOKEN").label, Some(&generated))?;
    tracing::info!(
        "  Admin token: {}",
        redact_if_secret("VAULTSHIP_ADMIN_TOKEN", &admin_token)
    );

    tracing::info!("\n── Outbound mail (optional) ──");
    let d = default_val("VAULTSHIP_SMTP_HOST", nonempty(&saved.smtp_host));
    let smtp_host = read_input(lines, fd("VAULTSHIP_SMTP_HOST").label, nonempty(&d))?;
    let smtp = if smtp_host.is_empty() {
        tracing::info!("  Mail relay skipped.");
        None
    } else {
        let d = default_val("VAULTSHIP_SMTP_PORT", nonempty(&saved.smtp_port));
        let smtp_port: u16 =
            read_validated(lines, fd("VAULTSHIP_SMTP_PORT").label, Some(&d), validate_port)?
                .parse()?;
        let d = default_val("VAULTSHIP_SMTP_USERNAME", nonempty(&saved.smtp_username));
        let smtp_username = read_input(lines, fd("VAULTSHIP_SMTP_USERNAME").label, nonempty(&d))?;
        let smtp_password = read_secret_input(fd("VAULTSHIP_SMTP_PASSWORD").label, None)?;
        let d = default_val("VAULTSHIP_SMTP_FROM", nonempty(&saved.smtp_from));
        let smtp_from = read_input(lines, fd("VAULTSHIP_SMTP_FROM").label, nonempty(&d))?;
        build_smtp(smtp_host, smtp_port, smtp_username, smtp_password, smtp_from)
    };

    tracing::info!("\n── Features ──");
    let install_dashboard = prompt_continue(lines, "Install the login status dashboard?")?;

    let config = SetupConfig {
        domain,
        cert: CertInputs {
            mode,
            email,
            org_name,
            base_domain: base,
            cert_path,
            key_path,
            csr_path,
        },
        external_port,
        internal_port,
        access_url,
        image_tag,
        db,
        admin_token,
        smtp,
        install_dashboard,
    };

    if prompt_continue(lines, "Save answers (without secrets) for next time?")? {
        if let Err(e) = save_answers(&config) {
            tracing::warn!("  Warning: failed to save answers: {}", e);
        } else {
            tracing::info!("  Answers saved to {}", answers_path().display());
        }
    }

    Ok(config)
}

fn collect_db(
    lines: &mut io::Lines<io::StdinLock<'_>>,
    saved: &SavedAnswers,
) -> Result<DbConfig, Box<dyn Error>> {
    let backend = match read_choice(
        lines,
        "Database backend:",
        &[
            DbBackend::Sqlite.label(),
            DbBackend::Mysql.label(),
            DbBackend::Postgres.label(),
        ],
    )? {
        0 => DbBackend::Sqlite,
        1 => DbBackend::Mysql,
        _ => DbBackend::Postgres,
    };

    if backend == DbBackend::Sqlite {
        return Ok(DbConfig {
            backend,
            host: String::new(),
            port: 0,
            name: String::new(),
            user: String::new(),
            password: String::new(),
        });
    }

    let d = default_val("VAULTSHIP_DB_HOST", nonempty(&saved.db_host));
    let host = read_validated(lines, fd("VAULTSHIP_DB_HOST").label, Some(&d), validate_non_empty)?;
    let port_default = if saved.db_port.is_empty() {
        backend.default_port().to_string()
    } else {
        saved.db_port.clone()
    };
    let port: u16 = read_validated(
        lines,
        fd("VAULTSHIP_DB_PORT").label,
        Some(&port_default),
        validate_port,
    )?
    .parse()?;
    let d = default_val("VAULTSHIP_DB_NAME", nonempty(&saved.db_name));
    let name = read_validated(lines, fd("VAULTSHIP_DB_NAME").label, Some(&d), validate_non_empty)?;
    let d = default_val("VAULTSHIP_DB_USER", nonempty(&saved.db_user));
    let user = read_validated(lines, fd("VAULTSHIP_DB_USER").label, Some(&d), validate_non_empty)?;
    let password = read_secret_input(fd("VAULTSHIP_DB_PASSWORD").label, None)?;
    if password.is_empty() {
        return Err("database password is required for an external backend".into());
    }

    Ok(DbConfig {
        backend,
        host,
        port,
        name,
        user,
        password,
    })
}

fn prompt_base_domain(
    lines: &mut io::Lines<io::StdinLock<'_>>,
    domain: &str,
) -> Result<String, Box<dyn Error>> {
    let derived = base_domain(domain).unwrap_or(domain).to_string();
    read_validated(
        lines,
        "Wildcard base domain (covers *.base)",
        Some(&derived),
        validate_domain,
    )
}

fn default_wildcard_path(
    lines: &mut io::Lines<io::StdinLock<'_>>,
    defaults: &RuntimeDefaults,
    file: &str,
    label: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let d = defaults.tls_dir.join(file).display().to_string();
    Ok(PathBuf::from(read_validated(
        lines,
        label,
        Some(&d),
        validate_non_empty,
    )?))
}

fn existing_file_validator(s: &str) -> Result<(), String> {
    if s.trim().is_empty() {
        return Err("path must not be empty".into());
    }
    if !Path::new(s).is_file() {
        return Err(format!("no file at '{}'", s));
    }
    Ok(())
}

// ── Timestamp formatting (no chrono dependency) ──

pub fn days_to_date(days: u64) -> (u64, u64, u64) {
    // Simple Gregorian calendar conversion from days since epoch
    let mut y = 1970;
    let mut remaining = days;

    loop {
        let days_in_year = if is_leap_year(y) { 366 } else { 365 };
        if remaining < days_in_year {
            break;
        }
        remaining -= days_in_year;
        y += 1;
    }

    let month_days: [u64; 12] = if is_leap_year(y) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut m = 0;
    for (i, &md) in month_days.iter().enumerate() {
        if remaining < md {
            m = i;
            break;
        }
        remaining -= md;
    }

    (y, (m + 1) as u64, remaining + 1)
}

pub fn is_leap_year(y: u64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

/// `YYYY-MM-DD HH:MMZ` from a unix timestamp, for generated-file headers.
pub fn format_timestamp(secs: u64) -> String {
    let days = secs / 86400;
    let rem = secs % 86400;
    let (year, month, day) = days_to_date(days);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}Z",
        year,
        month,
        day,
        rem / 3600,
        (rem % 3600) / 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_url_default_port_omitted() {
        assert_eq!(access_url("vault.example.com", 443), "https://vault.example.com");
        assert_eq!(
            access_url("vault.example.com", 4443),
            "https://vault.example.com:4443"
        );
    }

    #[test]
    fn smtp_all_or_nothing() {
        assert!(build_smtp(
            "smtp.example.com".into(),
            587,
            "u".into(),
            "p".into(),
            "vault@example.com".into()
        )
        .is_some());
        // Missing from-address — entire relay dropped
        assert!(build_smtp("smtp.example.com".into(), 587, "u".into(), "p".into(), String::new())
            .is_none());
        // Missing host — entire relay dropped
        assert!(build_smtp(String::new(), 587, "u".into(), "p".into(), "vault@example.com".into())
            .is_none());
        // Username/password alone never enable the relay
        assert!(build_smtp(String::new(), 587, "u".into(), "p".into(), String::new()).is_none());
    }

    #[test]
    fn timestamp_formatting() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00Z");
        // 2024-02-29 12:30 UTC — leap day round trip
        assert_eq!(format_timestamp(1_709_209_800), "2024-02-29 12:30Z");
    }

    #[test]
    fn credential_charset_and_length() {
        let cred = generate_credential(48);
        assert_eq!(cred.len(), 48);
        assert!(cred.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}

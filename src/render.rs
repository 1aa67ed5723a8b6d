//! artifact rendering: settings file, systemd unit, nginx site, shell
//! scripts, admin token record
//!
//! Every artifact goes through `${VAR}` substitution over a compile-time
//! embedded template, with variable maps built from typed config fields so
//! a missing value is a render error rather than a silently blank line.

use std::{
    collections::HashMap,
    error::Error,
    fs,
    io,
    os::unix::fs::PermissionsExt,
    path::Path,
};

use crate::{
    certs::CertPaths,
    config::{format_timestamp, DbBackend, RuntimeDefaults, SetupConfig},
};

const ENV_TPL: &str = include_str!("../templates/vault.env.tpl");
const SMTP_TPL: &str = include_str!("../templates/smtp-block.tpl");
const UNIT_TPL: &str = include_str!("../templates/unit.service.tpl");
const NGINX_REDIRECT_TPL: &str = include_str!("../templates/nginx-redirect.conf.tpl");
const NGINX_TLS_TPL: &str = include_str!("../templates/nginx-tls.conf.tpl");
const BACKUP_TPL: &str = include_str!("../templates/backup.sh.tpl");
const DASHBOARD_TPL: &str = include_str!("../templates/dashboard.sh.tpl");
const ADMIN_RECORD_TPL: &str = include_str!("../templates/admin-record.txt.tpl");

// ── Template substitution ──

/// Replace every `${VAR}` in `template` from the map. Unknown or unclosed
/// placeholders are errors, never passed through.
pub fn substitute_template_raw(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, Box<dyn Error>> {
    let mut result = String::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() && chars[i + 1] == '{' {
            i += 2; // skip ${
            let start = i;
            while i < chars.len() && chars[i] != '}' {
                i += 1;
            }
            if i >= chars.len() {
                return Err("Unclosed ${...} placeholder in template".into());
            }
            let var_name: String = chars[start..i].iter().collect();
            match variables.get(&var_name) {
                Some(val) => result.push_str(val),
                None => return Err(format!("Variable '{}' has no value", var_name).into()),
            }
            i += 1; // skip }
        } else {
            result.push(chars[i]);
            i += 1;
        }
    }

    Ok(result)
}

fn vars(pairs: &[(&str, String)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// ── Settings file ──

/// Connection URL for the SQL backends; the embedded backend needs none.
pub fn database_url(config: &SetupConfig) -> Option<String> {
    let db = &config.db;
    let scheme = match db.backend {
        DbBackend::Sqlite => return None,
        DbBackend::Mysql => "mysql",
        DbBackend::Postgres => "postgresql",
    };
    Some(format!(
        "{}://{}:{}@{}:{}/{}",
        scheme, db.user, db.password, db.host, db.port, db.name
    ))
}

pub fn render_env_file(config: &SetupConfig, now_secs: u64) -> Result<String, Box<dyn Error>> {
    let database_line = match database_url(config) {
        Some(url) => format!("DATABASE_URL={}\n", url),
        None => String::new(),
    };

    // Mail keys appear only when a relay was actually configured.
    let smtp_block = match &config.smtp {
        Some(smtp) => substitute_template_raw(
            SMTP_TPL,
            &vars(&[
                ("SMTP_HOST", smtp.host.clone()),
                ("SMTP_PORT", smtp.port.to_string()),
                ("SMTP_USERNAME", smtp.username.clone()),
                ("SMTP_PASSWORD", smtp.password.clone()),
                ("SMTP_FROM", smtp.from_address.clone()),
            ]),
        )?,
        None => String::new(),
    };

    substitute_template_raw(
        ENV_TPL,
        &vars(&[
            ("GENERATED_AT", format_timestamp(now_secs)),
            ("ACCESS_URL", config.access_url.clone()),
            ("ADMIN_TOKEN", config.admin_token.clone()),
            ("DATABASE_LINE", database_line),
            ("SMTP_BLOCK", smtp_block),
        ]),
    )
}

// ── Systemd unit ──

pub fn render_unit_file(
    config: &SetupConfig,
    defaults: &RuntimeDefaults,
) -> Result<String, Box<dyn Error>> {
    substitute_template_raw(
        UNIT_TPL,
        &vars(&[
            ("CONTAINER", defaults.container_name.clone()),
            ("ENV_FILE", defaults.env_file().display().to_string()),
            ("APP_PORT", defaults.app_port.to_string()),
            ("DATA_DIR", defaults.data_dir.display().to_string()),
            (
                "IMAGE",
                format!("{}:{}", defaults.image_repo, config.image_tag),
            ),
        ]),
    )
}

// ── Nginx site ──

pub fn render_nginx_conf(
    config: &SetupConfig,
    defaults: &RuntimeDefaults,
    cert: &CertPaths,
) -> Result<String, Box<dyn Error>> {
    let tls = substitute_template_raw(
        NGINX_TLS_TPL,
        &vars(&[
            ("INTERNAL_PORT", config.internal_port.to_string()),
            ("SERVER_NAME", config.domain.clone()),
            ("CERT_PATH", cert.cert.display().to_string()),
            ("KEY_PATH", cert.key.display().to_string()),
            ("APP_PORT", defaults.app_port.to_string()),
        ]),
    )?;

    // TLS on port 80 leaves nowhere to put a plain-HTTP redirect listener.
    if config.internal_port == 80 {
        return Ok(tls);
    }

    let suffix = if config.external_port == 443 {
        String::new()
    } else {
        format!(":{}", config.external_port)
    };
    let redirect = substitute_template_raw(
        NGINX_REDIRECT_TPL,
        &vars(&[
            ("SERVER_NAME", config.domain.clone()),
            ("REDIRECT_SUFFIX", suffix),
        ]),
    )?;

    Ok(format!("{}{}", redirect, tls))
}

/// Post-write sanity pass over the rendered site file. Each required line
/// must be textually present; a miss is fatal before nginx ever sees it.
pub fn self_check_nginx_conf(
    contents: &str,
    config: &SetupConfig,
    defaults: &RuntimeDefaults,
    cert: &CertPaths,
) -> Result<(), Box<dyn Error>> {
    let mut required = vec![
        format!("server_name {};", config.domain),
        format!("listen {} ssl;", config.internal_port),
        format!("ssl_certificate {};", cert.cert.display()),
        format!("ssl_certificate_key {};", cert.key.display()),
        format!("proxy_pass http://127.0.0.1:{};", defaults.app_port),
        "location /notifications/hub".to_string(),
    ];
    if config.internal_port != 80 {
        required.push("listen 80;".to_string());
        let suffix = if config.external_port == 443 {
            String::new()
        } else {
            format!(":{}", config.external_port)
        };
        required.push(format!("return 301 https://$host{}$request_uri;", suffix));
    }

    for line in &required {
        if !contents.contains(line) {
            return Err(format!(
                "rendered nginx site is missing expected directive: {}",
                line
            )
            .into());
        }
    }
    Ok(())
}

// ── Shell artifacts ──

pub fn render_backup_script(defaults: &RuntimeDefaults) -> Result<String, Box<dyn Error>> {
    let data_parent = defaults
        .data_dir
        .parent()
        .unwrap_or(Path::new("/"))
        .display()
        .to_string();
    let data_base = defaults
        .data_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or("data directory has no final path component")?;

    substitute_template_raw(
        BACKUP_TPL,
        &vars(&[
            ("BACKUP_DIR", defaults.backup_dir.display().to_string()),
            ("PREFIX", defaults.backup_prefix.clone()),
            ("DATA_PARENT", data_parent),
            ("DATA_BASE", data_base),
            ("RETENTION_DAYS", crate::backup::RETENTION_DAYS.to_string()),
        ]),
    )
}

pub fn render_dashboard_script(
    access_url: &str,
    defaults: &RuntimeDefaults,
) -> Result<String, Box<dyn Error>> {
    substitute_template_raw(
        DASHBOARD_TPL,
        &vars(&[
            ("ACCESS_URL", access_url.to_string()),
            ("UNIT", defaults.unit_name.clone()),
            ("CONTAINER", defaults.container_name.clone()),
            ("DATA_DIR", defaults.data_dir.display().to_string()),
        ]),
    )
}

// ── Admin token record ──

pub fn render_admin_record(config: &SetupConfig, now_secs: u64) -> Result<String, Box<dyn Error>> {
    substitute_template_raw(
        ADMIN_RECORD_TPL,
        &vars(&[
            ("GENERATED_AT", format_timestamp(now_secs)),
            ("ACCESS_URL", config.access_url.clone()),
            ("ADMIN_TOKEN", config.admin_token.clone()),
        ]),
    )
}

// ── File materialization ──

/// Write with an explicit mode, creating parent directories as needed.
pub fn write_with_mode(path: &Path, contents: &str, mode: u32) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

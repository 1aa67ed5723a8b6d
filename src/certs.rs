//! certificate acquisition: four mutually exclusive flows producing a
//! validated (certificate, key) pair for the proxy layer
//!
//! Every format/correspondence/coverage check shells into `openssl` through
//! the command runner; a pair is accepted only when all checks pass, and
//! any single failure is fatal with a diagnostic naming the check.

use std::{
    error::Error,
    fs,
    io::{self},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    cli::prompt_continue,
    cmd::{run_capture, run_ok, CommandRunner},
    config::{CertMode, RuntimeDefaults, SetupConfig},
    error::ValidationError,
};

/// The resolved pair the proxy layer presents.
#[derive(Clone, Debug)]
pub struct CertPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

// ── Mode dispatch ──

pub async fn obtain_certificate(
    runner: &dyn CommandRunner,
    config: &SetupConfig,
    defaults: &RuntimeDefaults,
    lines: &mut io::Lines<io::StdinLock<'_>>,
) -> Result<CertPaths, Box<dyn Error>> {
    match config.cert.mode {
        CertMode::LetsEncrypt => mode_lets_encrypt(runner, config, defaults).await,
        CertMode::WildcardNew => mode_wildcard_new(runner, config, defaults, lines).await,
        CertMode::ImportExisting => mode_import_existing(runner, config, defaults).await,
        CertMode::WildcardResume => mode_wildcard_resume(runner, config, defaults, lines).await,
    }
}

// ── Mode A: automated single-domain issuance ──

async fn mode_lets_encrypt(
    runner: &dyn CommandRunner,
    config: &SetupConfig,
    defaults: &RuntimeDefaults,
) -> Result<CertPaths, Box<dyn Error>> {
    let live = defaults.letsencrypt_dir.join("live").join(&config.domain);
    let paths = CertPaths {
        cert: live.join("fullchain.pem"),
        key: live.join("privkey.pem"),
    };

    // Idempotent short-circuit: a previously issued pair that still passes
    // every check is reused instead of re-invoking issuance.
    if paths.cert.is_file() && paths.key.is_file() {
        if existing_pair_is_valid(runner, &paths, &config.domain).await {
            tracing::info!(
                "  Valid certificate for {} already present — reusing {}",
                config.domain,
                paths.cert.display()
            );
            return Ok(paths);
        }
        tracing::warn!(
            "  Warning: existing certificate at {} failed validation — re-issuing.",
            paths.cert.display()
        );
    }

    // The standalone challenge binds port 80 itself; nginx (installed and
    // started earlier in the run) has to step aside for the duration.
    let _ = run_capture(runner, "systemctl", &["stop", "nginx"]).await?;
    tracing::info!("  Requesting certificate for {} (standalone challenge)...", config.domain);
    let issued = run_ok(
        runner,
        "certbot",
        &[
            "certonly",
            "--standalone",
            "--non-interactive",
            "--agree-tos",
            "-d",
            &config.domain,
            "--email",
            &config.cert.email,
        ],
    )
    .await;
    let _ = run_capture(runner, "systemctl", &["start", "nginx"]).await?;
    issued.map_err(|e| format!("certificate issuance failed: {}", e))?;

    validate_pair(runner, &paths.cert, &paths.key, &config.domain).await?;
    tracing::info!("  Certificate issued and validated: {}", paths.cert.display());
    Ok(paths)
}

/// Whether an on-disk pair passes every validation check for `domain`.
pub async fn existing_pair_is_valid(
    runner: &dyn CommandRunner,
    paths: &CertPaths,
    domain: &str,
) -> bool {
    validate_pair(runner, &paths.cert, &paths.key, domain)
        .await
        .is_ok()
}

// ── Mode B: manual wildcard initiation ──

async fn mode_wildcard_new(
    runner: &dyn CommandRunner,
    config: &SetupConfig,
    defaults: &RuntimeDefaults,
    lines: &mut io::Lines<io::StdinLock<'_>>,
) -> Result<CertPaths, Box<dyn Error>> {
    let base = &config.cert.base_domain;
    let key = &config.cert.key_path;
    let csr = &config.cert.csr_path;

    ensure_output_dir(key)?;
    ensure_output_dir(csr)?;

    if key.is_file() {
        tracing::info!("  Private key already present at {} — keeping it.", key.display());
        check_private_key(runner, key).await?;
    } else {
        tracing::info!("  Generating RSA-4096 private key at {}", key.display());
        run_ok(
            runner,
            "openssl",
            &[
                "genpkey",
                "-algorithm",
                "RSA",
                "-pkeyopt",
                "rsa_keygen_bits:4096",
                "-out",
                &key.display().to_string(),
            ],
        )
        .await?;
        restrict_permissions(key)?;
    }

    // The CSR is always (re)generated so the wildcard pattern, the base
    // domain SAN, and the organization reflect the current run's inputs.
    tracing::info!("  Writing certificate request for *.{} to {}", base, csr.display());
    run_ok(
        runner,
        "openssl",
        &[
            "req",
            "-new",
            "-key",
            &key.display().to_string(),
            "-out",
            &csr.display().to_string(),
            "-subj",
            &format!("/CN=*.{}/O={}", base, config.cert.org_name),
            "-addext",
            &format!("subjectAltName=DNS:*.{},DNS:{}", base, base),
        ],
    )
    .await?;

    tracing::info!("  Key and CSR written. Submit the CSR to your certificate authority.");
    wait_and_import(runner, config, defaults, lines).await
}

// ── Mode C: existing pair import ──

async fn mode_import_existing(
    runner: &dyn CommandRunner,
    config: &SetupConfig,
    defaults: &RuntimeDefaults,
) -> Result<CertPaths, Box<dyn Error>> {
    let src_cert = &config.cert.cert_path;
    let src_key = &config.cert.key_path;

    validate_pair(runner, src_cert, src_key, &config.domain).await?;

    let dest = CertPaths {
        cert: defaults.managed_cert_path(),
        key: defaults.managed_key_path(),
    };
    install_managed_pair(src_cert, src_key, &dest)?;
    tracing::info!(
        "  Imported certificate and key into {}",
        defaults.tls_dir.display()
    );
    Ok(dest)
}

// ── Mode D: resume interrupted wildcard flow ──

async fn mode_wildcard_resume(
    runner: &dyn CommandRunner,
    config: &SetupConfig,
    defaults: &RuntimeDefaults,
    lines: &mut io::Lines<io::StdinLock<'_>>,
) -> Result<CertPaths, Box<dyn Error>> {
    let key = &config.cert.key_path;
    let csr = &config.cert.csr_path;

    check_private_key(runner, key).await?;
    check_csr(runner, csr).await?;
    check_csr_org(runner, csr).await?;
    tracing::info!("  Existing key and CSR check out — resuming the wait for the signed artifact.");

    wait_and_import(runner, config, defaults, lines).await
}

// ── Shared wait-and-import tail (modes B and D) ──

/// Cooperative suspension point: poll/prompt until the operator has placed
/// the signed certificate at the drop path, then validate and import it.
/// No timeout — the operator drives re-polling.
async fn wait_and_import(
    runner: &dyn CommandRunner,
    config: &SetupConfig,
    defaults: &RuntimeDefaults,
    lines: &mut io::Lines<io::StdinLock<'_>>,
) -> Result<CertPaths, Box<dyn Error>> {
    let drop_path = &config.cert.cert_path;
    loop {
        if drop_path.is_file() {
            break;
        }
        tracing::info!("  {} {}", defaults.wait_prompt, drop_path.display());
        if !prompt_continue(lines, "Check again now?")? {
            tracing::info!("  Re-checking in {}s...", defaults.poll_interval_secs);
            tokio::time::sleep(Duration::from_secs(defaults.poll_interval_secs)).await;
        }
    }
    tracing::info!("  Signed certificate found at {}", drop_path.display());

    let key = &config.cert.key_path;
    let base = &config.cert.base_domain;
    check_certificate(runner, drop_path).await?;
    check_key_matches_cert(runner, key, drop_path).await?;
    check_domain_coverage(runner, drop_path, &config.domain).await?;
    check_domain_coverage(runner, drop_path, &format!("*.{}", base)).await?;

    let dest = CertPaths {
        cert: defaults.managed_cert_path(),
        key: defaults.managed_key_path(),
    };
    install_managed_pair(drop_path, key, &dest)?;
    tracing::info!("  Wildcard certificate imported into {}", defaults.tls_dir.display());
    Ok(dest)
}

/// Copy a validated pair into managed storage at 0600. A source that is
/// already the managed path is left in place — copying a file onto itself
/// would truncate it.
fn install_managed_pair(
    src_cert: &Path,
    src_key: &Path,
    dest: &CertPaths,
) -> Result<(), Box<dyn Error>> {
    ensure_output_dir(&dest.cert)?;
    ensure_output_dir(&dest.key)?;
    if src_cert != dest.cert.as_path() {
        fs::copy(src_cert, &dest.cert)?;
    }
    if src_key != dest.key.as_path() {
        fs::copy(src_key, &dest.key)?;
    }
    restrict_permissions(&dest.cert)?;
    restrict_permissions(&dest.key)?;
    Ok(())
}

// ── Validation primitives ──

pub async fn validate_pair(
    runner: &dyn CommandRunner,
    cert: &Path,
    key: &Path,
    domain: &str,
) -> Result<(), ValidationError> {
    check_certificate(runner, cert).await?;
    check_private_key(runner, key).await?;
    check_key_matches_cert(runner, key, cert).await?;
    check_domain_coverage(runner, cert, domain).await?;
    Ok(())
}

pub async fn check_private_key(
    runner: &dyn CommandRunner,
    path: &Path,
) -> Result<(), ValidationError> {
    let out = run_capture(runner, "openssl", &["pkey", "-in", &path.display().to_string(), "-noout"])
        .await?;
    if !out.success() {
        return Err(ValidationError::BadPrivateKey {
            path: path.to_path_buf(),
            detail: out.stderr.trim().to_string(),
        });
    }
    Ok(())
}

pub async fn check_csr(runner: &dyn CommandRunner, path: &Path) -> Result<(), ValidationError> {
    let out = run_capture(
        runner,
        "openssl",
        &["req", "-in", &path.display().to_string(), "-noout", "-verify"],
    )
    .await?;
    if !out.success() {
        return Err(ValidationError::BadCsr {
            path: path.to_path_buf(),
            detail: out.stderr.trim().to_string(),
        });
    }
    Ok(())
}

pub async fn check_csr_org(runner: &dyn CommandRunner, path: &Path) -> Result<(), ValidationError> {
    let out = run_capture(
        runner,
        "openssl",
        &["req", "-in", &path.display().to_string(), "-noout", "-subject"],
    )
    .await?;
    if !out.success() || !subject_has_org(&out.stdout) {
        return Err(ValidationError::CsrMissingOrg {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

pub async fn check_certificate(
    runner: &dyn CommandRunner,
    path: &Path,
) -> Result<(), ValidationError> {
    let out = run_capture(runner, "openssl", &["x509", "-in", &path.display().to_string(), "-noout"])
        .await?;
    if !out.success() {
        return Err(ValidationError::BadCertificate {
            path: path.to_path_buf(),
            detail: out.stderr.trim().to_string(),
        });
    }
    Ok(())
}

/// The public key derived from the private key must hash-equal the public
/// key embedded in the certificate.
pub async fn check_key_matches_cert(
    runner: &dyn CommandRunner,
    key: &Path,
    cert: &Path,
) -> Result<(), ValidationError> {
    let key_pub = run_ok(
        runner,
        "openssl",
        &["pkey", "-in", &key.display().to_string(), "-pubout"],
    )
    .await
    .map_err(|_| ValidationError::BadPrivateKey {
        path: key.to_path_buf(),
        detail: "could not derive public key".into(),
    })?;
    let cert_pub = run_ok(
        runner,
        "openssl",
        &["x509", "-in", &cert.display().to_string(), "-pubkey", "-noout"],
    )
    .await
    .map_err(|_| ValidationError::BadCertificate {
        path: cert.to_path_buf(),
        detail: "could not extract public key".into(),
    })?;

    if sha256_hex(key_pub.stdout.trim().as_bytes()) != sha256_hex(cert_pub.stdout.trim().as_bytes())
    {
        return Err(ValidationError::KeyMismatch {
            key: key.to_path_buf(),
            cert: cert.to_path_buf(),
        });
    }
    Ok(())
}

pub async fn check_domain_coverage(
    runner: &dyn CommandRunner,
    cert: &Path,
    domain: &str,
) -> Result<(), ValidationError> {
    let names = cert_names(runner, cert).await?;
    if names.iter().any(|n| certificate_covers(n, domain)) {
        return Ok(());
    }
    Err(ValidationError::DomainNotCovered {
        path: cert.to_path_buf(),
        domain: domain.to_string(),
        names: names.join(", "),
    })
}

/// All DNS names the certificate lists: SAN entries, falling back to the
/// subject common name when no SAN extension is present.
pub async fn cert_names(
    runner: &dyn CommandRunner,
    cert: &Path,
) -> Result<Vec<String>, ValidationError> {
    let san = run_capture(
        runner,
        "openssl",
        &[
            "x509",
            "-in",
            &cert.display().to_string(),
            "-noout",
            "-ext",
            "subjectAltName",
        ],
    )
    .await?;
    if san.success() {
        let entries = parse_san_entries(&san.stdout);
        if !entries.is_empty() {
            return Ok(entries);
        }
    }

    let subject = run_capture(
        runner,
        "openssl",
        &["x509", "-in", &cert.display().to_string(), "-noout", "-subject"],
    )
    .await?;
    if !subject.success() {
        return Err(ValidationError::BadCertificate {
            path: cert.to_path_buf(),
            detail: subject.stderr.trim().to_string(),
        });
    }
    Ok(parse_subject_cn(&subject.stdout).into_iter().collect())
}

// ── Pure helpers ──

/// Wildcard `*.X` matches any direct subdomain of `X` but never `X` itself;
/// an exact entry matches only itself.
pub fn certificate_covers(entry: &str, domain: &str) -> bool {
    if let Some(base) = entry.strip_prefix("*.") {
        let Some(prefix) = domain
            .strip_suffix(base)
            .and_then(|p| p.strip_suffix('.'))
        else {
            return false;
        };
        !prefix.is_empty() && !prefix.contains('.')
    } else {
        entry.eq_ignore_ascii_case(domain)
    }
}

/// Strip the leftmost label: `vault.example.com` → `example.com`.
pub fn base_domain(domain: &str) -> Option<&str> {
    domain.split_once('.').map(|(_, rest)| rest)
}

/// Extract `DNS:` entries from `openssl x509 -ext subjectAltName` output.
pub fn parse_san_entries(output: &str) -> Vec<String> {
    output
        .split(|c| c == ',' || c == '\n')
        .filter_map(|part| part.trim().strip_prefix("DNS:"))
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect()
}

/// Extract the CN component from `openssl -subject` output, tolerating both
/// the `CN = x` and `/CN=x` print styles.
pub fn parse_subject_cn(subject: &str) -> Option<String> {
    for sep in ["CN = ", "CN="] {
        if let Some(idx) = subject.find(sep) {
            let rest = &subject[idx + sep.len()..];
            let end = rest
                .find(|c| c == ',' || c == '/' || c == '\n')
                .unwrap_or(rest.len());
            let cn = rest[..end].trim();
            if !cn.is_empty() {
                return Some(cn.to_string());
            }
        }
    }
    None
}

/// Whether an `openssl -subject` line carries an Organization component.
pub fn subject_has_org(subject: &str) -> bool {
    subject.contains("O = ") || subject.contains("/O=") || subject.contains(",O=")
}

pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::Digest;
    let hash = sha2::Sha256::digest(data);
    hex::encode(hash)
}

/// Target directory must exist (created if missing) and be writable; the
/// target itself must not be a directory.
pub fn ensure_output_dir(path: &Path) -> Result<(), ValidationError> {
    if path.is_dir() {
        return Err(ValidationError::BadOutputPath {
            path: path.to_path_buf(),
            detail: "target is a directory".into(),
        });
    }
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent).map_err(|e| ValidationError::BadOutputPath {
        path: path.to_path_buf(),
        detail: format!("cannot create {}: {}", parent.display(), e),
    })?;
    let probe = parent.join(".vaultship-write-probe");
    fs::write(&probe, b"probe").map_err(|e| ValidationError::BadOutputPath {
        path: path.to_path_buf(),
        detail: format!("{} is not writable: {}", parent.display(), e),
    })?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

/// Owner-only read/write on files containing key material.
pub fn restrict_permissions(path: &Path) -> Result<(), io::Error> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_direct_subdomain_only() {
        assert!(certificate_covers("*.example.com", "vault.example.com"));
        assert!(!certificate_covers("*.example.com", "example.com"));
        assert!(!certificate_covers("*.example.com", "a.b.example.com"));
        assert!(!certificate_covers("*.example.com", "vaultexample.com"));
    }

    #[test]
    fn exact_entry_matches_only_itself() {
        assert!(certificate_covers("vault.example.com", "vault.example.com"));
        assert!(!certificate_covers("vault.example.com", "other.example.com"));
        assert!(certificate_covers("Vault.Example.Com", "vault.example.com"));
    }

    #[test]
    fn base_domain_strips_leftmost_label() {
        assert_eq!(base_domain("vault.example.com"), Some("example.com"));
        assert_eq!(base_domain("a.b.example.com"), Some("b.example.com"));
        assert_eq!(base_domain("localhost"), None);
    }

    #[test]
    fn san_parsing() {
        let out = "X509v3 Subject Alternative Name: \n    DNS:*.example.com, DNS:example.com\n";
        assert_eq!(parse_san_entries(out), vec!["*.example.com", "example.com"]);
        assert!(parse_san_entries("no names here").is_empty());
    }

    #[test]
    fn subject_cn_parsing() {
        assert_eq!(
            parse_subject_cn("subject=CN = vault.example.com, O = Acme"),
            Some("vault.example.com".into())
        );
        assert_eq!(
            parse_subject_cn("subject= /O=Acme/CN=vault.example.com"),
            Some("vault.example.com".into())
        );
        assert_eq!(parse_subject_cn("subject=O = Acme"), None);
    }

    #[test]
    fn org_detection() {
        assert!(subject_has_org("subject=CN = *.example.com, O = Acme Corp"));
        assert!(subject_has_org("subject=/CN=*.example.com/O=Acme"));
        assert!(!subject_has_org("subject=CN = *.example.com"));
    }

    #[test]
    fn managed_install_preserves_a_source_at_the_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = CertPaths {
            cert: dir.path().join("fullchain.pem"),
            key: dir.path().join("privkey.pem"),
        };
        fs::write(&dest.cert, "CERT MATERIAL").unwrap();
        fs::write(&dest.key, "KEY MATERIAL").unwrap();

        // Operator pointed the drop path at the managed file itself
        install_managed_pair(&dest.cert, &dest.key, &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest.cert).unwrap(), "CERT MATERIAL");
        assert_eq!(fs::read_to_string(&dest.key).unwrap(), "KEY MATERIAL");

        // Distinct sources are copied in
        let src_cert = dir.path().join("signed.pem");
        let src_key = dir.path().join("other-key.pem");
        fs::write(&src_cert, "NEW CERT").unwrap();
        fs::write(&src_key, "NEW KEY").unwrap();
        install_managed_pair(&src_cert, &src_key, &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest.cert).unwrap(), "NEW CERT");
        assert_eq!(fs::read_to_string(&dest.key).unwrap(), "NEW KEY");
    }

    // ── Mode A issuance decisions (scripted command results) ──

    use crate::cmd::CmdOutput;
    use crate::config::{CertInputs, CertMode, DbBackend, DbConfig, SetupConfig};
    use crate::error::CmdError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every command line; openssl queries get canned answers that
    /// make any pair validate for vault.example.com.
    struct ScriptedRunner {
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }

        fn position(&self, prefix: &str) -> Option<usize> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .position(|c| c.starts_with(prefix))
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput, CmdError> {
            let cmdline = format!("{} {}", program, args.join(" "));
            self.calls.lock().unwrap().push(cmdline.clone());

            let stdout = if cmdline.contains("subjectAltName") {
                "DNS:vault.example.com".to_string()
            } else if cmdline.contains("-pubkey") || cmdline.contains("-pubout") {
                "PUBKEY".to_string()
            } else {
                String::new()
            };
            Ok(CmdOutput {
                status: 0,
                stdout,
                stderr: String::new(),
            })
        }
    }

    fn mode_a_fixture(letsencrypt_dir: &Path) -> (SetupConfig, RuntimeDefaults) {
        let config = SetupConfig {
            domain: "vault.example.com".into(),
            cert: CertInputs {
                mode: CertMode::LetsEncrypt,
                email: "admin@example.com".into(),
                org_name: String::new(),
                base_domain: String::new(),
                cert_path: PathBuf::new(),
                key_path: PathBuf::new(),
                csr_path: PathBuf::new(),
            },
            external_port: 443,
            internal_port: 443,
            access_url: "https://vault.example.com".into(),
            image_tag: "latest".into(),
            db: DbConfig {
                backend: DbBackend::Sqlite,
                host: String::new(),
                port: 0,
                name: String::new(),
                user: String::new(),
                password: String::new(),
            },
            admin_token: "token".into(),
            smtp: None,
            install_dashboard: false,
        };
        let defaults = RuntimeDefaults {
            image_repo: "vaultwarden/server".into(),
            container_name: "vaultship".into(),
            unit_name: "vaultship.service".into(),
            unit_path: PathBuf::from("/etc/systemd/system/vaultship.service"),
            install_dir: PathBuf::from("/opt/vaultship"),
            data_dir: PathBuf::from("/opt/vaultship/data"),
            tls_dir: PathBuf::from("/opt/vaultship/tls"),
            backup_dir: PathBuf::from("/opt/vaultship/backups"),
            backup_prefix: "vaultship".into(),
            backup_script_path: PathBuf::from("/usr/local/sbin/vaultship-backup.sh"),
            dashboard_path: PathBuf::from("/etc/profile.d/vaultship-status.sh"),
            nginx_site_path: PathBuf::from("/etc/nginx/conf.d/vaultship.conf"),
            letsencrypt_dir: letsencrypt_dir.to_path_buf(),
            log_path: PathBuf::from("/tmp/vaultship-setup.log"),
            probe_url: "https://hub.docker.com".into(),
            app_port: 8080,
            settle_secs: 0,
            poll_interval_secs: 0,
            wait_prompt: String::new(),
        };
        (config, defaults)
    }

    #[tokio::test]
    async fn valid_live_pair_short_circuits_issuance_on_every_run() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live").join("vault.example.com");
        fs::create_dir_all(&live).unwrap();
        fs::write(live.join("fullchain.pem"), "CERT").unwrap();
        fs::write(live.join("privkey.pem"), "KEY").unwrap();

        let (config, defaults) = mode_a_fixture(dir.path());
        let runner = ScriptedRunner::new();

        for _ in 0..2 {
            let paths = mode_lets_encrypt(&runner, &config, &defaults).await.unwrap();
            assert_eq!(paths.cert, live.join("fullchain.pem"));
        }
        assert_eq!(runner.count("certbot"), 0);
    }

    #[tokio::test]
    async fn issuance_steps_nginx_aside_for_the_challenge() {
        let dir = tempfile::tempdir().unwrap();
        let (config, defaults) = mode_a_fixture(dir.path());
        let runner = ScriptedRunner::new();

        mode_lets_encrypt(&runner, &config, &defaults).await.unwrap();

        assert_eq!(runner.count("certbot certonly --standalone"), 1);
        let stop = runner.position("systemctl stop nginx").unwrap();
        let certbot = runner.position("certbot certonly").unwrap();
        let start = runner.position("systemctl start nginx").unwrap();
        assert!(stop < certbot && certbot < start);
    }
}

//! auxiliary host scripts: backup archiving + cron scheduling, and the
//! optional login status dashboard

use std::{
    error::Error,
    fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    cmd::{run_capture, run_ok, CommandRunner},
    config::RuntimeDefaults,
    render::{render_backup_script, render_dashboard_script, write_with_mode},
};

/// Archives older than this are pruned, both by the nightly script and by
/// the install-time sweep.
pub const RETENTION_DAYS: u64 = 7;

// ── Backup script ──

pub fn install_backup_script(defaults: &RuntimeDefaults) -> Result<(), Box<dyn Error>> {
    let script = render_backup_script(defaults)?;
    write_with_mode(&defaults.backup_script_path, &script, 0o700)?;
    fs::create_dir_all(&defaults.backup_dir)?;
    tracing::info!(
        "  Backup script installed at {}",
        defaults.backup_script_path.display()
    );
    Ok(())
}

// ── Retention ──

/// Pure selection: entries whose modification time is more than
/// `retention_days` before `now_secs`. An archive exactly at the boundary
/// is kept.
pub fn archives_to_prune(
    entries: &[(PathBuf, u64)],
    now_secs: u64,
    retention_days: u64,
) -> Vec<PathBuf> {
    let cutoff = retention_days * 86_400;
    entries
        .iter()
        .filter(|(_, modified)| now_secs.saturating_sub(*modified) > cutoff)
        .map(|(path, _)| path.clone())
        .collect()
}

/// Install-time sweep of stale archives left by earlier deployments. The
/// nightly script does the same pruning via `find`.
pub fn prune_old_archives(defaults: &RuntimeDefaults) -> Result<usize, Box<dyn Error>> {
    let dir = &defaults.backup_dir;
    if !dir.is_dir() {
        return Ok(0);
    }
    let prefix = format!("{}-", defaults.backup_prefix);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) || !name.ends_with(".tar.gz") {
            continue;
        }
        let modified = entry
            .metadata()?
            .modified()?
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        entries.push((entry.path(), modified));
    }

    let stale = archives_to_prune(&entries, now, RETENTION_DAYS);
    for path in &stale {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("  Warning: could not remove {}: {}", path.display(), e);
        }
    }
    Ok(stale.len())
}

// ── Cron scheduling ──

/// Daily run at 03:15 host time.
pub fn cron_line(defaults: &RuntimeDefaults) -> String {
    format!("15 3 * * * {}", defaults.backup_script_path.display())
}

/// Merge the entry into an existing crontab. `None` means the identical
/// line is already present and nothing needs writing.
pub fn merged_crontab(current: &str, line: &str) -> Option<String> {
    if current.lines().any(|l| l.trim() == line) {
        return None;
    }
    let mut merged = current.trim_end().to_string();
    if !merged.is_empty() {
        merged.push('\n');
    }
    merged.push_str(line);
    merged.push('\n');
    Some(merged)
}

/// Idempotent: any number of runs leaves exactly one schedule entry.
pub async fn ensure_cron_entry(
    runner: &dyn CommandRunner,
    defaults: &RuntimeDefaults,
) -> Result<(), Box<dyn Error>> {
    // Non-zero just means no crontab exists yet.
    let current = run_capture(runner, "crontab", &["-l"]).await?;
    let existing = if current.success() {
        current.stdout
    } else {
        String::new()
    };

    let line = cron_line(defaults);
    let Some(merged) = merged_crontab(&existing, &line) else {
        tracing::info!("  Backup schedule already present in crontab.");
        return Ok(());
    };

    let staging = std::env::temp_dir().join(format!("vaultship-crontab-{}", std::process::id()));
    fs::write(&staging, &merged)?;
    let result = run_ok(runner, "crontab", &[&staging.display().to_string()]).await;
    let _ = fs::remove_file(&staging);
    result?;
    tracing::info!("  Backup scheduled daily: {}", line);
    Ok(())
}

// ── Login dashboard ──

/// Overwrite-idempotent: re-running replaces the whole managed script.
pub fn install_dashboard(
    access_url: &str,
    defaults: &RuntimeDefaults,
) -> Result<(), Box<dyn Error>> {
    let script = render_dashboard_script(access_url, defaults)?;
    write_with_mode(&defaults.dashboard_path, &script, 0o755)?;
    tracing::info!(
        "  Login dashboard installed at {}",
        defaults.dashboard_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults_in(dir: &std::path::Path) -> RuntimeDefaults {
        RuntimeDefaults {
            image_repo: "vaultwarden/server".into(),
            container_name: "vaultship".into(),
            unit_name: "vaultship.service".into(),
            unit_path: dir.join("vaultship.service"),
            install_dir: dir.to_path_buf(),
            data_dir: dir.join("data"),
            tls_dir: dir.join("tls"),
            backup_dir: dir.join("backups"),
            backup_prefix: "vaultship".into(),
            backup_script_path: dir.join("vaultship-backup.sh"),
            dashboard_path: dir.join("vaultship-status.sh"),
            nginx_site_path: dir.join("vaultship.conf"),
            letsencrypt_dir: dir.join("letsencrypt"),
            log_path: dir.join("setup.log"),
            probe_url: "https://hub.docker.com".into(),
            app_port: 8080,
            settle_secs: 0,
            poll_interval_secs: 0,
            wait_prompt: String::new(),
        }
    }

    #[test]
    fn dashboard_install_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = defaults_in(dir.path());
        let url = "https://vault.example.com";

        install_dashboard(url, &defaults).unwrap();
        let first = fs::read_to_string(&defaults.dashboard_path).unwrap();
        install_dashboard(url, &defaults).unwrap();
        let second = fs::read_to_string(&defaults.dashboard_path).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.matches(url).count(), 1);
    }

    #[test]
    fn backup_script_prunes_with_find_and_creates_backup_dir() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = defaults_in(dir.path());

        install_backup_script(&defaults).unwrap();
        let script = fs::read_to_string(&defaults.backup_script_path).unwrap();
        assert!(script.contains("tar -czf"));
        assert!(script.contains(&format!("-mtime +{} -delete", RETENTION_DAYS)));
        assert!(defaults.backup_dir.is_dir());
    }

    #[test]
    fn retention_boundary_at_seven_days() {
        let week = 7 * 86_400;
        let now = 1_000_000_000;
        let entries = vec![
            (PathBuf::from("/b/fresh.tar.gz"), now - 60),
            (PathBuf::from("/b/boundary.tar.gz"), now - week),
            (PathBuf::from("/b/stale.tar.gz"), now - week - 1),
        ];
        let stale = archives_to_prune(&entries, now, 7);
        assert_eq!(stale, vec![PathBuf::from("/b/stale.tar.gz")]);
    }

    #[test]
    fn crontab_merge_is_idempotent() {
        let line = "15 3 * * * /usr/local/sbin/vaultship-backup.sh";

        let first = merged_crontab("", line).unwrap();
        assert_eq!(first, format!("{}\n", line));

        // A second merge over the result is a no-op
        assert!(merged_crontab(&first, line).is_none());

        // Unrelated entries are preserved
        let merged = merged_crontab("0 1 * * * /usr/bin/logrotate\n", line).unwrap();
        assert!(merged.contains("/usr/bin/logrotate"));
        assert_eq!(merged.matches(line).count(), 1);
        assert!(merged_crontab(&merged, line).is_none());
    }
}

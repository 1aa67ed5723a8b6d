//! host service plumbing: previous-deployment cleanup, image pull,
//! firewall, and the supervised start with a single recovery attempt

use std::{error::Error, time::Duration};

use crate::{
    cmd::{command_exists, run_capture, run_ok, CommandRunner},
    config::RuntimeDefaults,
    preflight::OsFamily,
};

// ── Cleanup of a previous deployment (stage runs before any prompt) ──

/// Best-effort and idempotent: a fresh host where none of these targets
/// exist goes through without a single warning worth acting on.
pub async fn cleanup_previous(
    runner: &dyn CommandRunner,
    defaults: &RuntimeDefaults,
) -> Result<(), Box<dyn Error>> {
    let unit = &defaults.unit_name;

    let stop = run_capture(runner, "systemctl", &["stop", unit]).await?;
    if stop.success() {
        tracing::info!("  Stopped previous {} instance.", unit);
    }
    let _ = run_capture(runner, "systemctl", &["disable", unit]).await?;

    let rm = run_capture(runner, "docker", &["rm", "-f", &defaults.container_name]).await?;
    if rm.success() {
        tracing::info!("  Removed previous container {}.", defaults.container_name);
    }

    report_port_occupancy(runner, defaults.app_port).await?;
    Ok(())
}

/// Report (never kill) whatever is listening on the app port so the
/// operator can decide what to do about it.
pub async fn report_port_occupancy(
    runner: &dyn CommandRunner,
    port: u16,
) -> Result<(), Box<dyn Error>> {
    let snapshot = run_capture(runner, "ss", &["-ltnp"]).await?;
    if !snapshot.success() {
        return Ok(());
    }
    let needle = format!(":{} ", port);
    for line in snapshot.stdout.lines().filter(|l| l.contains(&needle)) {
        tracing::warn!("  Warning: port {} is already in use: {}", port, line.trim());
    }
    Ok(())
}

// ── Image pull ──

pub async fn pull_image(
    runner: &dyn CommandRunner,
    repo: &str,
    tag: &str,
) -> Result<(), Box<dyn Error>> {
    let image = format!("{}:{}", repo, tag);
    tracing::info!("  Pulling {}...", image);
    run_ok(runner, "docker", &["pull", &image])
        .await
        .map_err(|e| format!("image pull failed: {}", e))?;
    tracing::info!("  Image ready.");
    Ok(())
}

// ── Firewall ──

/// Opens SSH, plain HTTP for the redirect listener, and the internal HTTPS
/// port. A missing firewall front end is a warning, not a failure.
pub async fn configure_firewall(
    runner: &dyn CommandRunner,
    os: OsFamily,
    internal_port: u16,
) -> Result<(), Box<dyn Error>> {
    let ports = [22u16, 80, internal_port];
    match os {
        OsFamily::Debian => {
            if !command_exists(runner, "ufw").await {
                tracing::warn!("  Warning: ufw not installed — firewall left untouched.");
                return Ok(());
            }
            for port in ports {
                run_ok(runner, "ufw", &["allow", &format!("{}/tcp", port)]).await?;
            }
            tracing::info!("  Firewall (ufw): allowed {:?}.", ports);
        }
        OsFamily::Rhel => {
            if !command_exists(runner, "firewall-cmd").await {
                tracing::warn!("  Warning: firewall-cmd not installed — firewall left untouched.");
                return Ok(());
            }
            for port in ports {
                run_ok(
                    runner,
                    "firewall-cmd",
                    &["--permanent", &format!("--add-port={}/tcp", port)],
                )
                .await?;
            }
            run_ok(runner, "firewall-cmd", &["--reload"]).await?;
            tracing::info!("  Firewall (firewalld): opened {:?}.", ports);
        }
    }
    Ok(())
}

// ── Supervised start ──

pub struct ServiceSupervisor<'a> {
    runner: &'a dyn CommandRunner,
    defaults: &'a RuntimeDefaults,
}

impl<'a> ServiceSupervisor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, defaults: &'a RuntimeDefaults) -> Self {
        Self { runner, defaults }
    }

    /// Enable and start the unit, wait for it to settle, and verify it is
    /// active. One recovery attempt on failure (diagnostics, stale
    /// container removal, port report, daemon reload, restart) — never a
    /// third start.
    pub async fn start_with_recovery(&self) -> Result<(), Box<dyn Error>> {
        let unit = &self.defaults.unit_name;
        run_ok(self.runner, "systemctl", &["daemon-reload"]).await?;
        run_ok(self.runner, "systemctl", &["enable", unit]).await?;

        if self.start_and_settle().await? {
            tracing::info!("  {} is active.", unit);
            return Ok(());
        }

        tracing::warn!("  Warning: {} failed to start — attempting recovery.", unit);
        self.diagnostics().await?;

        let _ = run_capture(
            self.runner,
            "docker",
            &["rm", "-f", &self.defaults.container_name],
        )
        .await?;
        run_ok(self.runner, "systemctl", &["daemon-reload"]).await?;

        if self.start_and_settle().await? {
            tracing::info!("  {} recovered and is active.", unit);
            return Ok(());
        }

        self.diagnostics().await?;
        tracing::error!("  {} failed to start after one recovery attempt.", unit);
        tracing::error!("  Remediation checklist:");
        tracing::error!("    - journalctl -u {} for the full unit log", unit);
        tracing::error!(
            "    - docker logs {} for the application log",
            self.defaults.container_name
        );
        tracing::error!(
            "    - verify nothing else binds port {} (ss -ltnp)",
            self.defaults.app_port
        );
        tracing::error!(
            "    - check ownership and permissions of {}",
            self.defaults.data_dir.display()
        );
        tracing::error!("    - re-run this tool once the cause is fixed");
        Err(format!("service {} did not become active", unit).into())
    }

    async fn start_and_settle(&self) -> Result<bool, Box<dyn Error>> {
        let unit = &self.defaults.unit_name;
        let start = run_capture(self.runner, "systemctl", &["start", unit]).await?;
        if !start.success() {
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_secs(self.defaults.settle_secs)).await;
        let active = run_capture(self.runner, "systemctl", &["is-active", unit]).await?;
        Ok(active.success())
    }

    /// One pass of everything worth looking at when the unit is down.
    async fn diagnostics(&self) -> Result<(), Box<dyn Error>> {
        let unit = &self.defaults.unit_name;

        let journal =
            run_capture(self.runner, "journalctl", &["-u", unit, "-n", "50", "--no-pager"]).await?;
        if !journal.stdout.trim().is_empty() {
            tracing::info!("  Recent unit log:\n{}", journal.stdout.trim_end());
        }

        let logs = run_capture(
            self.runner,
            "docker",
            &["logs", "--tail", "50", &self.defaults.container_name],
        )
        .await?;
        if logs.success() && !logs.stdout.trim().is_empty() {
            tracing::info!("  Container log tail:\n{}", logs.stdout.trim_end());
        }

        let daemon = run_capture(self.runner, "systemctl", &["status", "docker", "--no-pager"])
            .await?;
        if !daemon.success() {
            tracing::warn!("  Warning: docker daemon is not healthy:\n{}", daemon.stdout.trim_end());
        }

        report_port_occupancy(self.runner, self.defaults.app_port).await?;

        let perms = run_capture(
            self.runner,
            "ls",
            &["-ld", &self.defaults.data_dir.display().to_string()],
        )
        .await?;
        if perms.success() {
            tracing::info!("  Data dir: {}", perms.stdout.trim_end());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::CmdOutput;
    use crate::error::CmdError;
    use async_trait::async_trait;
    use std::{path::PathBuf, sync::Mutex};

    /// Records every command line; `systemctl is-active` succeeds only
    /// from the Nth check onward.
    struct ScriptedRunner {
        calls: Mutex<Vec<String>>,
        active_after_checks: usize,
    }

    impl ScriptedRunner {
        fn new(active_after_checks: usize) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                active_after_checks,
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
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput, CmdError> {
            let cmdline = format!("{} {}", program, args.join(" "));
            self.calls.lock().unwrap().push(cmdline.clone());

            let status = if cmdline.starts_with("systemctl is-active") {
                let checks = self.count("systemctl is-active");
                if checks >= self.active_after_checks {
                    0
                } else {
                    3
                }
            } else {
                0
            };
            Ok(CmdOutput {
                status,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn test_defaults() -> RuntimeDefaults {
        RuntimeDefaults {
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
            letsencrypt_dir: PathBuf::from("/etc/letsencrypt"),
            log_path: PathBuf::from("/tmp/vaultship-setup.log"),
            probe_url: "https://hub.docker.com".into(),
            app_port: 8080,
            settle_secs: 0,
            poll_interval_secs: 0,
            wait_prompt: String::new(),
        }
    }

    #[tokio::test]
    async fn starts_cleanly_on_first_attempt() {
        let runner = ScriptedRunner::new(1);
        let defaults = test_defaults();
        let supervisor = ServiceSupervisor::new(&runner, &defaults);
        supervisor.start_with_recovery().await.unwrap();
        assert_eq!(runner.count("systemctl start"), 1);
    }

    #[tokio::test]
    async fn recovers_with_exactly_one_retry() {
        let runner = ScriptedRunner::new(2);
        let defaults = test_defaults();
        let supervisor = ServiceSupervisor::new(&runner, &defaults);
        supervisor.start_with_recovery().await.unwrap();
        assert_eq!(runner.count("systemctl start"), 2);
        // Recovery removed the stale container before the retry
        assert_eq!(runner.count("docker rm -f"), 1);
        // The diagnostic pass included the port-occupancy snapshot
        assert_eq!(runner.count("ss -ltnp"), 1);
    }

    #[tokio::test]
    async fn gives_up_after_second_failure_without_third_start() {
        let runner = ScriptedRunner::new(usize::MAX);
        let defaults = test_defaults();
        let supervisor = ServiceSupervisor::new(&runner, &defaults);
        assert!(supervisor.start_with_recovery().await.is_err());
        assert_eq!(runner.count("systemctl start"), 2);
        // Both diagnostic passes took a port-occupancy snapshot
        assert_eq!(runner.count("ss -ltnp"), 2);
    }
}

//! host preflight: privilege, distribution, systemd, connectivity, and
//! the base package set

use std::{error::Error, fs, time::Duration};

use crate::{
    cmd::{run_capture, run_ok, CommandRunner},
    config::RuntimeDefaults,
};

/// The two distribution families the tool supports. The family selects the
/// package manager and the firewall front end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OsFamily {
    Debian,
    Rhel,
}

impl OsFamily {
    pub fn package_manager(&self) -> &'static str {
        match self {
            OsFamily::Debian => "apt-get",
            OsFamily::Rhel => "dnf",
        }
    }
}

pub async fn require_root(runner: &dyn CommandRunner) -> Result<(), Box<dyn Error>> {
    let out = run_ok(runner, "id", &["-u"]).await?;
    if out.stdout.trim() != "0" {
        return Err("this tool must run as root (it installs packages, writes under /etc, and manages systemd units)".into());
    }
    Ok(())
}

pub fn detect_os() -> Result<OsFamily, Box<dyn Error>> {
    let contents = fs::read_to_string("/etc/os-release")
        .map_err(|e| format!("cannot read /etc/os-release: {}", e))?;
    parse_os_release(&contents)
        .ok_or_else(|| "unsupported distribution (need a Debian- or RHEL-family host)".into())
}

/// Classify from the ID field, falling back to ID_LIKE.
pub fn parse_os_release(contents: &str) -> Option<OsFamily> {
    let field = |key: &str| -> Option<String> {
        contents
            .lines()
            .find_map(|l| l.strip_prefix(key))
            .map(|v| v.trim_matches('"').to_lowercase())
    };

    let classify = |ids: &str| -> Option<OsFamily> {
        for id in ids.split_whitespace() {
            match id {
                "debian" | "ubuntu" => return Some(OsFamily::Debian),
                "rhel" | "fedora" | "centos" | "rocky" | "almalinux" => {
                    return Some(OsFamily::Rhel)
                }
                _ => {}
            }
        }
        None
    };

    field("ID=")
        .and_then(|id| classify(&id))
        .or_else(|| field("ID_LIKE=").and_then(|ids| classify(&ids)))
}

pub async fn require_systemd(runner: &dyn CommandRunner) -> Result<(), Box<dyn Error>> {
    run_ok(runner, "systemctl", &["--version"])
        .await
        .map_err(|e| format!("systemd is required: {}", e))?;
    Ok(())
}

/// One GET against the probe URL. No retries — a host that cannot reach
/// the registry cannot pull the image either.
pub async fn check_connectivity(defaults: &RuntimeDefaults) -> Result<(), Box<dyn Error>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()?;
    client
        .get(&defaults.probe_url)
        .send()
        .await
        .map_err(|e| format!("no outbound connectivity ({}): {}", defaults.probe_url, e))?;
    tracing::info!("  Connectivity OK ({})", defaults.probe_url);
    Ok(())
}

pub async fn install_base_packages(
    runner: &dyn CommandRunner,
    os: OsFamily,
) -> Result<(), Box<dyn Error>> {
    tracing::info!("  Installing base packages via {}...", os.package_manager());
    match os {
        OsFamily::Debian => {
            run_ok(runner, "apt-get", &["update", "-q"]).await?;
            run_ok(
                runner,
                "apt-get",
                &["install", "-y", "-q", "curl", "openssl", "nginx", "certbot", "cron"],
            )
            .await?;
        }
        OsFamily::Rhel => {
            run_ok(
                runner,
                "dnf",
                &["install", "-y", "-q", "curl", "openssl", "nginx", "certbot", "cronie"],
            )
            .await?;
        }
    }
    tracing::info!("  Base packages installed.");
    Ok(())
}

/// Install docker via the upstream convenience script when absent, then
/// make sure the daemon is enabled and running.
pub async fn ensure_docker(runner: &dyn CommandRunner) -> Result<(), Box<dyn Error>> {
    let probe = run_capture(runner, "docker", &["--version"]).await;
    let installed = matches!(probe, Ok(out) if out.success());

    if installed {
        tracing::info!("  Docker already installed.");
    } else {
        tracing::info!("  Installing docker...");
        run_ok(runner, "sh", &["-c", "curl -fsSL https://get.docker.com | sh"])
            .await
            .map_err(|e| format!("docker installation failed: {}", e))?;
    }

    run_ok(runner, "systemctl", &["enable", "--now", "docker"]).await?;
    run_ok(runner, "docker", &["info"])
        .await
        .map_err(|e| format!("docker daemon is not usable: {}", e))?;
    tracing::info!("  Docker daemon running.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_release_classification() {
        assert_eq!(
            parse_os_release("ID=ubuntu\nVERSION_ID=\"24.04\"\n"),
            Some(OsFamily::Debian)
        );
        assert_eq!(parse_os_release("ID=debian\n"), Some(OsFamily::Debian));
        assert_eq!(parse_os_release("ID=\"rocky\"\n"), Some(OsFamily::Rhel));
        assert_eq!(parse_os_release("ID=fedora\n"), Some(OsFamily::Rhel));
        // Derivative distro classified through ID_LIKE
        assert_eq!(
            parse_os_release("ID=linuxmint\nID_LIKE=\"ubuntu debian\"\n"),
            Some(OsFamily::Debian)
        );
        assert_eq!(parse_os_release("ID=alpine\n"), None);
        assert_eq!(parse_os_release(""), None);
    }
}

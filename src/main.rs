//! vaultship — interactive provisioner for a self-hosted vault server.
//!
//! Runs the full stage sequence top to bottom; every stage failure is
//! fatal and exits non-zero. `--refresh-scripts` re-runs only the backup
//! and dashboard installation from saved answers.

use std::{
    error::Error,
    fs::OpenOptions,
    io::{self, BufRead},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vaultship::{
    backup::{ensure_cron_entry, install_backup_script, install_dashboard, prune_old_archives},
    certs::obtain_certificate,
    cmd::HostRunner,
    config::{access_url, collect_config, load_answers, RuntimeDefaults},
    preflight,
    render::{
        render_admin_record, render_env_file, render_nginx_conf, render_unit_file,
        self_check_nginx_conf, write_with_mode,
    },
    service::{cleanup_previous, configure_firewall, pull_image, ServiceSupervisor},
};

#[tokio::main]
async fn main() {
    let defaults = RuntimeDefaults::load();
    init_logging(&defaults);

    let result = if std::env::args().any(|a| a == "--refresh-scripts") {
        refresh_scripts(&defaults).await
    } else {
        run(&defaults).await
    };

    if let Err(e) = result {
        tracing::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

/// Console output plus a persistent non-ANSI copy of everything in the
/// setup log, so a failed run can be reconstructed after the terminal is
/// gone.
fn init_logging(defaults: &RuntimeDefaults) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(false);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&defaults.log_path)
        .ok();

    match file {
        Some(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Arc::new(file));
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            tracing::warn!(
                "  Warning: could not open {} — logging to console only.",
                defaults.log_path.display()
            );
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

async fn run(defaults: &RuntimeDefaults) -> Result<(), Box<dyn Error>> {
    let runner = HostRunner;
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    tracing::info!("vaultship setup starting (log: {})", defaults.log_path.display());

    // Stage 1 — preflight
    tracing::info!("\n[1/11] Preflight checks");
    preflight::require_root(&runner).await?;
    let os = preflight::detect_os()?;
    tracing::info!("  Distribution family: {:?}", os);
    preflight::require_systemd(&runner).await?;
    preflight::check_connectivity(defaults).await?;
    preflight::install_base_packages(&runner, os).await?;
    preflight::ensure_docker(&runner).await?;

    // Stage 2 — clear out any previous deployment
    tracing::info!("\n[2/11] Cleaning up previous deployment");
    cleanup_previous(&runner, defaults).await?;

    // Stage 3 — interactive collection; the record is final from here on
    tracing::info!("\n[3/11] Configuration");
    let config = collect_config(&mut lines, defaults)?;

    // Stage 4 — certificate acquisition
    tracing::info!("\n[4/11] Certificate ({})", config.cert.mode.label());
    let cert = obtain_certificate(&runner, &config, defaults, &mut lines).await?;

    // Stage 5 — settings, unit, admin record
    tracing::info!("\n[5/11] Writing configuration artifacts");
    std::fs::create_dir_all(&defaults.data_dir)?;
    let env = render_env_file(&config, now_secs())?;
    write_with_mode(&defaults.env_file(), &env, 0o600)?;
    tracing::info!("  Settings written to {} (mode 600)", defaults.env_file().display());

    let unit = render_unit_file(&config, defaults)?;
    write_with_mode(&defaults.unit_path, &unit, 0o644)?;
    tracing::info!("  Unit written to {}", defaults.unit_path.display());

    let record = render_admin_record(&config, now_secs())?;
    write_with_mode(&defaults.admin_record_path(), &record, 0o600)?;
    tracing::info!(
        "  Admin token recorded at {} — read it, store it, delete it.",
        defaults.admin_record_path().display()
    );

    // Stage 6 — image pull
    tracing::info!("\n[6/11] Application image");
    pull_image(&runner, &defaults.image_repo, &config.image_tag).await?;

    // Stage 7 — reverse proxy
    tracing::info!("\n[7/11] Reverse proxy");
    let site = render_nginx_conf(&config, defaults, &cert)?;
    write_with_mode(&defaults.nginx_site_path, &site, 0o644)?;
    let on_disk = std::fs::read_to_string(&defaults.nginx_site_path)?;
    self_check_nginx_conf(&on_disk, &config, defaults, &cert)?;
    vaultship::cmd::run_ok(&runner, "nginx", &["-t"])
        .await
        .map_err(|e| format!("nginx rejected the rendered site: {}", e))?;
    vaultship::cmd::run_ok(&runner, "systemctl", &["restart", "nginx"]).await?;
    tracing::info!("  nginx site {} validated and loaded.", defaults.nginx_site_path.display());

    // Stage 8 — firewall
    tracing::info!("\n[8/11] Firewall");
    configure_firewall(&runner, os, config.internal_port).await?;

    // Stage 9 — optional dashboard
    tracing::info!("\n[9/11] Login dashboard");
    if config.install_dashboard {
        install_dashboard(&config.access_url, defaults)?;
    } else {
        tracing::info!("  Skipped.");
    }

    // Stage 10 — start the service
    tracing::info!("\n[10/11] Starting {}", defaults.unit_name);
    let supervisor = ServiceSupervisor::new(&runner, defaults);
    supervisor.start_with_recovery().await?;

    // Stage 11 — backups
    tracing::info!("\n[11/11] Backups");
    install_backup_script(defaults)?;
    let pruned = prune_old_archives(defaults)?;
    if pruned > 0 {
        tracing::info!("  Pruned {} stale archive(s).", pruned);
    }
    ensure_cron_entry(&runner, defaults).await?;

    tracing::info!("\nSetup complete.");
    tracing::info!("  Vault:       {}", config.access_url);
    tracing::info!("  Admin panel: {}/admin", config.access_url);
    tracing::info!("  Token record: {}", defaults.admin_record_path().display());
    tracing::info!("  Setup log:   {}", defaults.log_path.display());
    Ok(())
}

/// Re-materialize only the backup and dashboard scripts from the answers
/// saved by a previous full run.
async fn refresh_scripts(defaults: &RuntimeDefaults) -> Result<(), Box<dyn Error>> {
    let runner = HostRunner;
    let saved = load_answers()
        .filter(|s| !s.domain.is_empty())
        .ok_or("no saved answers found — run a full setup first")?;
    let external_port: u16 = saved.external_port.parse().unwrap_or(443);
    let url = access_url(&saved.domain, external_port);

    tracing::info!("Refreshing host scripts for {}", url);
    install_backup_script(defaults)?;
    ensure_cron_entry(&runner, defaults).await?;
    if saved.install_dashboard {
        install_dashboard(&url, defaults)?;
    }
    tracing::info!("Done.");
    Ok(())
}

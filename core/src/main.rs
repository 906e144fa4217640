use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use console::Term;
use diskscrub::config::EraseConfig;
use diskscrub::crypto::MonitoredSource;
use diskscrub::drives::{parse_device_list, DeviceInspector};
use diskscrub::orchestrator::{DiskReport, EngineFactory};
use diskscrub::provisioning::{parse_disk_list, DiskTools, SystemDiskTools};
use diskscrub::ui::{human_bytes, init_tracing, ProgressReporter};
use diskscrub::*;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "diskscrub")]
#[command(about = "Overwrite disks with random and zero passes, then repartition and format them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "DISKSCRUB_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for diskscrub.log
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached disks
    List,

    /// Erase, partition and format disks
    Erase(EraseArgs),
}

#[derive(Args)]
struct EraseArgs {
    /// Devices to erase, comma-separated (e.g. sda,sdb); prompted if omitted
    #[arg(short, long)]
    devices: Option<String>,

    /// Random passes before the zero pass
    #[arg(short, long)]
    passes: Option<u32>,

    /// Filesystem for the new partition (ntfs, ext4, vfat); prompted if omitted
    #[arg(short, long)]
    filesystem: Option<FilesystemKind>,

    /// Do not ask for per-disk confirmation
    #[arg(short, long)]
    yes: bool,

    /// Process disks one after another instead of concurrently
    #[arg(long)]
    sequential: bool,

    /// Overwrite solid-state disks instead of skipping them
    #[arg(long)]
    allow_solid_state: bool,

    /// Erase method: overwrite (random and zero passes) or crypto (LUKS under a discarded key)
    #[arg(short, long)]
    method: Option<EraseMethod>,

    /// Data written through the encrypted mapping with --method crypto (random, zero)
    #[arg(long)]
    crypto_fill: Option<CryptoFill>,

    /// Skip the read-back check after the zero pass
    #[arg(long)]
    no_verify: bool,

    /// Write a JSON session report to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cfg!(feature = "color-output") {
        colored::control::set_override(false);
    }

    if !is_root() {
        let err = EraseError::Privilege(
            "diskscrub must run as root; try again with sudo".to_string(),
        );
        eprintln!("{} {}", "Error:".red().bold(), err);
        std::process::exit(1);
    }

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Returns whether every selected disk finished successfully
async fn run(cli: Cli) -> Result<bool> {
    let mut config = EraseConfig::load(cli.config.as_deref())?;
    if cli.log_dir.is_some() {
        config.log_dir = cli.log_dir.clone();
    }

    let _guard = match init_tracing(cli.debug, config.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} file logging disabled: {:#}", "Warning:".yellow(), e);
            init_tracing(cli.debug, None)?
        }
    };

    let tools: Arc<dyn DiskTools> = Arc::new(SystemDiskTools::default());

    match cli.command {
        Commands::List => {
            list_disks(tools.as_ref())?;
            Ok(true)
        }
        Commands::Erase(args) => erase(args, config, tools).await,
    }
}

fn list_disks(tools: &dyn DiskTools) -> Result<()> {
    let listing = tools.list_disks()?;
    let entries = parse_disk_list(&listing);

    if entries.is_empty() {
        println!("No disks detected.");
        return Ok(());
    }

    println!("{:<12} {:>10} {:<6} {}", "NAME".bold(), "SIZE".bold(), "TYPE".bold(), "MODEL".bold());
    for entry in entries {
        println!(
            "{:<12} {:>10} {:<6} {}",
            entry.name, entry.size, entry.kind, entry.model
        );
    }
    Ok(())
}

async fn erase(args: EraseArgs, mut config: EraseConfig, tools: Arc<dyn DiskTools>) -> Result<bool> {
    if let Some(passes) = args.passes {
        config.passes = passes;
    }
    if args.sequential {
        config.sequential = true;
    }
    if args.allow_solid_state {
        config.allow_solid_state = true;
    }
    if args.no_verify {
        config.verify_samples = 0;
    }
    if let Some(method) = args.method {
        config.method = method;
    }
    if let Some(fill) = args.crypto_fill {
        config.crypto_fill = fill;
    }

    let term = Term::stdout();
    let inspector = DeviceInspector::default();

    let devices = match &args.devices {
        Some(list) => parse_device_list(list)?,
        None => {
            list_disks(tools.as_ref())?;
            let answer = prompt(&term, "Devices to erase (comma-separated, e.g. sda,sdb): ")?;
            parse_device_list(&answer)?
        }
    };

    for device in &devices {
        if inspector
            .is_system_disk(device)
            .context("cannot read the mount table")?
        {
            bail!("refusing to erase {}: it backs the running system", device);
        }
        let mounts = inspector.mount_points(device).unwrap_or_default();
        if !mounts.is_empty() {
            tracing::warn!(device = %device, mounts = ?mounts, "Disk has mounted partitions; exclusive open will fail");
        }
    }

    let filesystem = match args.filesystem.or(config.filesystem) {
        Some(kind) => kind,
        None => prompt_filesystem(&term)?,
    };

    let mut selected = Vec::new();
    for device in devices {
        if args.yes || confirm(&term, &device, tools.as_ref())? {
            selected.push(DiskInfo::new(device, filesystem));
        } else {
            println!("Skipping {}.", device);
        }
    }

    if selected.is_empty() {
        println!("Nothing to do.");
        return Ok(true);
    }

    let progress = ProgressReporter::terminal();
    let verify_samples = config.verify_samples;
    let engine_progress = progress.clone();
    let engines: EngineFactory = Arc::new(move |_disk: &DiskInfo| {
        EraseEngine::new(DeviceInspector::default())
            .with_entropy(Box::new(MonitoredSource::system()))
            .with_verification(verify_samples)
            .with_progress(engine_progress.clone())
    });

    let template = config.plan_for("");
    let schedule = if config.sequential {
        Schedule::Sequential
    } else {
        Schedule::Concurrent
    };

    let method = match config.method {
        EraseMethod::Overwrite => format!(
            "{} random pass(es){}",
            config.passes,
            if config.zero_pass { " and a zero pass" } else { "" }
        ),
        EraseMethod::Crypto => format!("crypto erase with {:?} fill", config.crypto_fill).to_lowercase(),
    };
    println!(
        "\nErasing {} disk(s): {}, then {} ({:?}).\n",
        selected.len(),
        method,
        filesystem,
        schedule
    );

    let orchestrator = DiskOrchestrator::new(engines, tools, template);
    let session = orchestrator.run(selected, schedule).await;

    print_summary(&session);

    if let Some(path) = &args.report {
        session
            .write_json(path)
            .with_context(|| format!("cannot write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(session.all_succeeded())
}

fn prompt(term: &Term, question: &str) -> Result<String> {
    term.write_str(question)?;
    Ok(term.read_line()?.trim().to_string())
}

fn prompt_filesystem(term: &Term) -> Result<FilesystemKind> {
    println!("Filesystem for the new partition:");
    for (i, kind) in FilesystemKind::ALL.iter().enumerate() {
        println!("  {}) {}", i + 1, kind.as_str().to_uppercase());
    }

    let answer = prompt(term, "Choice [1-3]: ")?;
    match answer.as_str() {
        "1" => Ok(FilesystemKind::Ntfs),
        "2" => Ok(FilesystemKind::Ext4),
        "3" => Ok(FilesystemKind::Vfat),
        other => Ok(other.parse::<FilesystemKind>()?),
    }
}

fn confirm(term: &Term, device: &str, tools: &dyn DiskTools) -> Result<bool> {
    let stable_id = tools.identify(device);
    let question = format!(
        "{} erase ALL data on /dev/{} ({})? [y/N] ",
        "WARNING:".red().bold(),
        device,
        stable_id
    );
    let answer = prompt(term, &question)?;
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

fn print_summary(session: &SessionReport) {
    println!("\n{}", "=".repeat(60));
    println!("SUMMARY  (session {})", session.session_id);
    println!("{}", "=".repeat(60));

    for disk in &session.disks {
        print_disk(disk);
    }

    let failed = session.failed_count();
    println!("{}", "=".repeat(60));
    println!(
        "Total: {}  Succeeded: {}  Failed: {}",
        session.disks.len(),
        (session.disks.len() - failed).to_string().green(),
        if failed > 0 {
            failed.to_string().red()
        } else {
            failed.to_string().normal()
        }
    );
}

fn print_disk(disk: &DiskReport) {
    let status = match disk.status {
        DiskStatus::Completed => "✓ completed".green(),
        DiskStatus::EraseSkipped => "! erase skipped".yellow(),
        DiskStatus::Failed => "✗ failed".red(),
    };

    let size = disk
        .erase
        .as_ref()
        .and_then(|e| e.size)
        .map(|s| human_bytes(s as f64))
        .unwrap_or_else(|| "?".to_string());

    println!(
        "{:<10} {:<16} {:>10}  {}  {}  in {}",
        disk.device,
        status,
        size,
        disk.filesystem,
        disk.stable_id,
        humantime::format_duration(std::time::Duration::from_secs(disk.duration().as_secs()))
    );

    if let Some(advisory) = &disk.advisory {
        println!("           {}", advisory.yellow());
    }
    if let Some(error) = &disk.error {
        println!("           {} ({:?})", error.red(), disk.stage);
    }
    if let (Some(old), Some(new)) = (&disk.previous_uuid, &disk.new_uuid) {
        println!("           UUID {} => {}", old, new);
    }
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

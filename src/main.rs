use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use build_provenance::cli::{Command, MappingsArgs, RootArgs, ScanBinariesArgs, ScanLogArgs};
use build_provenance::config::{config_stub, load_config, DiscoveryConfig};
use build_provenance::discovery::{analyze_log, relocate_records, DiscoveryContext, DiscoveryResult};
use build_provenance::dwarf::{analyze_binaries, ElfDwarfReader};
use build_provenance::fs_probe::{FileSystemProbe, LocalFileSystem};
use build_provenance::paths;
use build_provenance::relocation::{load_rules, MappingMode, RuleLoad};
use build_provenance::report::{write_report, RunReport};

/// Environment variable holding an `EnvFilter` directive.
const LOG_ENV: &str = "BPROV_LOG";

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::ScanLog(scan) => cmd_scan_log(config, scan),
        Command::ScanBinaries(scan) => cmd_scan_binaries(config, scan),
        Command::Mappings(mappings) => cmd_mappings(&config, mappings),
        Command::Config => {
            println!("{}", config_stub()?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_scan_log(mut config: DiscoveryConfig, args: ScanLogArgs) -> Result<()> {
    config.relocate |= args.relocate;
    let root = args.root.as_deref().map(absolute).transpose()?;
    let log = absolute(&args.log)?;

    let ctx = context(config, root.as_deref())?;
    let mut result = analyze_log(&log, &ctx)?;

    let mode = if ctx.config.relocate {
        let root = root
            .as_deref()
            .ok_or_else(|| anyhow!("relocation needs a project root (--root)"))?;
        Some(relocate(&ctx, root, &mut result)?)
    } else {
        None
    };

    let mut report = RunReport::new(log, &result, &ctx.store);
    if let Some(mode) = mode {
        report = report.with_mapping_mode(mode);
    }
    write_report(&report, args.out.as_deref())
}

fn cmd_scan_binaries(config: DiscoveryConfig, args: ScanBinariesArgs) -> Result<()> {
    let root = args.root.as_deref().map(absolute).transpose()?;
    let binaries = args
        .binaries
        .iter()
        .map(|binary| absolute(binary))
        .collect::<Result<Vec<_>>>()?;

    let ctx = context(config, root.as_deref())?;
    let mut result = analyze_binaries(&binaries, &ElfDwarfReader, &ctx);
    let mode = match root.as_deref() {
        Some(root) => Some(relocate(&ctx, root, &mut result)?),
        None => None,
    };

    let mut report = RunReport::new(format!("{} binaries", binaries.len()), &result, &ctx.store);
    if let Some(mode) = mode {
        report = report.with_mapping_mode(mode);
    }
    write_report(&report, args.out.as_deref())
}

fn cmd_mappings(config: &DiscoveryConfig, args: MappingsArgs) -> Result<()> {
    let rules_path = absolute(&args.root).map(|root| rules_path(&root, config))?;
    if args.reset {
        if rules_path.exists() {
            fs::remove_file(&rules_path)
                .with_context(|| format!("remove {}", rules_path.display()))?;
            println!("removed {}", rules_path.display());
        }
        return Ok(());
    }
    match load_rules(&rules_path)? {
        RuleLoad::Missing => println!("no path mappings at {}", rules_path.display()),
        RuleLoad::Stale => println!(
            "{} was edited outside bprov; its rules are ignored and will be rediscovered",
            rules_path.display()
        ),
        RuleLoad::Trusted(entries) => {
            for entry in entries {
                println!("{}={}", entry.from, entry.to);
            }
        }
    }
    Ok(())
}

fn context(config: DiscoveryConfig, root: Option<&str>) -> Result<DiscoveryContext> {
    let fs: Arc<dyn FileSystemProbe> = Arc::new(LocalFileSystem);
    let ctx = DiscoveryContext::new(config, fs)?;
    Ok(match root {
        Some(root) => ctx.with_root(root),
        None => ctx,
    })
}

/// Map recorded paths under `root`, saving rules learned in this run.
fn relocate(
    ctx: &DiscoveryContext,
    root: &str,
    result: &mut DiscoveryResult,
) -> Result<MappingMode> {
    let rules_path = rules_path(root, &ctx.config);
    let mapper = ctx.mapper().with_persisted_rules(&rules_path)?;
    relocate_records(result, &mapper, root, &ctx.interner);
    if mapper.has_new_rules() {
        mapper.persist(&rules_path)?;
        tracing::info!(path = %rules_path.display(), "path mappings saved");
    }
    Ok(mapper.mode())
}

fn rules_path(root: &str, config: &DiscoveryConfig) -> PathBuf {
    Path::new(root).join(&config.mappings_file)
}

fn absolute(path: &Path) -> Result<String> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("resolve current directory")?
            .join(path)
    };
    Ok(paths::normalize(&path.to_string_lossy()))
}

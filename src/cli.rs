//! Command-line arguments for `bprov`.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "bprov",
    version,
    about = "Reconstruct per-file compilation context from build evidence",
    after_help = "Examples:\n  bprov scan-log build.log --root /src/proj\n  bprov scan-log compile_commands.json --out report.json\n  bprov scan-log remote-build.log --root /src/proj --relocate\n  bprov scan-binaries out/app out/libcore.so --root /src/proj\n  bprov mappings --root /src/proj\n  bprov config > bprov.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// JSON config file (defaults to the user config, then built-in defaults)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log engine progress at debug level (BPROV_LOG overrides)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    ScanLog(ScanLogArgs),
    ScanBinaries(ScanBinariesArgs),
    Mappings(MappingsArgs),
    /// Print a config file with every default spelled out
    Config,
}

#[derive(Parser, Debug)]
#[command(about = "Replay a build log (make trace, exec trace or JSON database)")]
pub struct ScanLogArgs {
    /// Build log to analyze
    #[arg(value_name = "LOG")]
    pub log: PathBuf,

    /// Project root: initial make directory and relocation target
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Paths in the log come from another machine; map them under --root
    #[arg(long, requires = "root")]
    pub relocate: bool,

    /// Write the JSON report here instead of stdout
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Recover compilation units from DWARF debug info")]
pub struct ScanBinariesArgs {
    /// ELF binaries or shared objects built with -g
    #[arg(value_name = "BIN", required = true)]
    pub binaries: Vec<PathBuf>,

    /// Project root; enables relocation of recorded paths under it
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Write the JSON report here instead of stdout
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Show the persisted path-mapping rules of a project")]
pub struct MappingsArgs {
    /// Project root holding the mappings file
    #[arg(long, value_name = "DIR")]
    pub root: PathBuf,

    /// Delete the persisted rules
    #[arg(long)]
    pub reset: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn relocate_requires_a_root() {
        assert!(RootArgs::try_parse_from(["bprov", "scan-log", "b.log", "--relocate"]).is_err());
        let args = RootArgs::try_parse_from([
            "bprov",
            "scan-log",
            "b.log",
            "--root",
            "/p",
            "--relocate",
            "-v",
        ])
        .expect("parse");
        assert!(args.verbose);
        match args.command {
            Command::ScanLog(scan) => {
                assert!(scan.relocate);
                assert_eq!(scan.root, Some(PathBuf::from("/p")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn scan_binaries_needs_at_least_one_binary() {
        assert!(RootArgs::try_parse_from(["bprov", "scan-binaries"]).is_err());
        assert!(RootArgs::try_parse_from(["bprov", "scan-binaries", "a.out"]).is_ok());
    }
}

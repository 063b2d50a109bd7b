//! Build provenance mining.
//!
//! Reconstructs, for every source file of a native project, the directory it
//! was compiled in, its include search paths, macros and language standard.
//! Evidence comes from build transcripts ([`discovery`]) or from debug
//! information in built binaries ([`dwarf`]). Recorded paths from another
//! machine are mapped onto the local checkout by [`relocation`].
pub mod artifacts;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod dwarf;
pub mod fs_probe;
pub mod interner;
pub mod line_store;
pub mod paths;
pub mod record;
pub mod relocation;
pub mod report;
pub mod roots;
pub mod util;

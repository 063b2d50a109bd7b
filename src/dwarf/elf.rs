//! DWARF compilation units of ELF binaries.
use anyhow::{Context, Result};
use gimli::{AttributeValue, DwLang, Dwarf, EndianSlice, RunTimeEndian, SectionId, Unit};
use goblin::elf::Elf;

use crate::paths;
use crate::record::{Language, LanguageStandard};

use super::{compiler_from_producer, CompilationUnitInfo, DwarfReader};

type Slice<'data> = EndianSlice<'data, RunTimeEndian>;

const LANGUAGES: &[(DwLang, Language, LanguageStandard)] = &[
    (gimli::DW_LANG_C89, Language::C, LanguageStandard::C89),
    (gimli::DW_LANG_C, Language::C, LanguageStandard::Unknown),
    (gimli::DW_LANG_C99, Language::C, LanguageStandard::C99),
    (gimli::DW_LANG_C11, Language::C, LanguageStandard::C11),
    (gimli::DW_LANG_C_plus_plus, Language::Cpp, LanguageStandard::Unknown),
    (gimli::DW_LANG_C_plus_plus_03, Language::Cpp, LanguageStandard::Cpp98),
    (gimli::DW_LANG_C_plus_plus_11, Language::Cpp, LanguageStandard::Cpp11),
    (gimli::DW_LANG_C_plus_plus_14, Language::Cpp, LanguageStandard::Cpp14),
    (gimli::DW_LANG_Fortran77, Language::Fortran, LanguageStandard::F77),
    (gimli::DW_LANG_Fortran90, Language::Fortran, LanguageStandard::F90),
    (gimli::DW_LANG_Fortran95, Language::Fortran, LanguageStandard::F95),
    (gimli::DW_LANG_Fortran03, Language::Fortran, LanguageStandard::F2003),
    (gimli::DW_LANG_Fortran08, Language::Fortran, LanguageStandard::F2008),
];

/// Reader for ELF files with embedded (uncompressed) DWARF.
///
/// Macro tables are not decoded; macros come from switches recorded in
/// `DW_AT_producer` (`-grecord-gcc-switches`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ElfDwarfReader;

impl DwarfReader for ElfDwarfReader {
    fn compilation_units(&self, binary: &str, data: &[u8]) -> Result<Vec<CompilationUnitInfo>> {
        let elf = Elf::parse(data).with_context(|| format!("parse ELF {binary}"))?;
        let endian = if elf.little_endian {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let dwarf = Dwarf::load(|section| load_section(&elf, data, section, endian))
            .with_context(|| format!("load DWARF sections of {binary}"))?;

        let mut units = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers.next()? {
            let unit = dwarf.unit(header)?;
            if let Some(info) = unit_info(&dwarf, &unit)? {
                units.push(info);
            }
        }
        Ok(units)
    }
}

fn load_section<'data>(
    elf: &Elf<'_>,
    data: &'data [u8],
    section: SectionId,
    endian: RunTimeEndian,
) -> Result<Slice<'data>> {
    for shdr in &elf.section_headers {
        if elf.shdr_strtab.get_at(shdr.sh_name) == Some(section.name()) {
            if let Some(bytes) = shdr.file_range().and_then(|range| data.get(range)) {
                return Ok(EndianSlice::new(bytes, endian));
            }
        }
    }
    Ok(EndianSlice::new(&[], endian))
}

fn unit_info(
    dwarf: &Dwarf<Slice<'_>>,
    unit: &Unit<Slice<'_>>,
) -> Result<Option<CompilationUnitInfo>> {
    let mut entries = unit.entries();
    let Some((_, root)) = entries.next_dfs()? else {
        return Ok(None);
    };
    if root.tag() != gimli::DW_TAG_compile_unit {
        return Ok(None);
    }
    let Some(name) = unit.name.map(|name| name.to_string_lossy().into_owned()) else {
        return Ok(None);
    };
    let comp_dir = match unit.comp_dir {
        Some(dir) => dir.to_string_lossy().into_owned(),
        None => match paths::parent(&name) {
            Some(parent) if paths::is_absolute(&name) => parent.to_string(),
            _ => return Ok(None),
        },
    };

    let producer = match root.attr_value(gimli::DW_AT_producer)? {
        Some(value) => Some(dwarf.attr_string(unit, value)?.to_string_lossy().into_owned()),
        None => None,
    };
    let (mut language, mut language_standard) = match root.attr_value(gimli::DW_AT_language)? {
        Some(AttributeValue::Language(lang)) => language_of(lang),
        _ => (Language::Unknown, LanguageStandard::Unknown),
    };
    if language == Language::Unknown {
        language = Language::from_extension(paths::extension(&name).unwrap_or(""));
    }
    if language == Language::Unknown {
        tracing::trace!(unit = %name, "skipping unit in an unsupported language");
        return Ok(None);
    }
    let (compiler_id, switches) = split_producer(producer.as_deref().unwrap_or(""));
    if language_standard == LanguageStandard::Unknown {
        language_standard = standard_from_producer(compiler_id);
    }
    let command_line = switches.map(|switches| {
        let (tool, _) = compiler_from_producer(producer.as_deref(), language);
        format!("{tool} {switches}")
    });

    let mut include_dirs = Vec::new();
    let mut system_include_dirs = Vec::new();
    if let Some(program) = unit.line_program.as_ref() {
        for dir in program.header().include_directories() {
            let dir = dwarf.attr_string(unit, dir.clone())?.to_string_lossy().into_owned();
            let dir = paths::join(&comp_dir, &dir);
            if dir == paths::normalize(&comp_dir) {
                continue;
            }
            let list = if dir.starts_with("/usr/") {
                &mut system_include_dirs
            } else {
                &mut include_dirs
            };
            if !list.contains(&dir) {
                list.push(dir);
            }
        }
    }

    Ok(Some(CompilationUnitInfo {
        source_path: name,
        comp_dir,
        language,
        language_standard,
        include_dirs,
        system_include_dirs,
        macros: Vec::new(),
        producer,
        command_line,
    }))
}

fn language_of(lang: DwLang) -> (Language, LanguageStandard) {
    LANGUAGES
        .iter()
        .find(|(code, _, _)| *code == lang)
        .map(|(_, language, standard)| (*language, *standard))
        .unwrap_or((Language::Unknown, LanguageStandard::Unknown))
}

/// Split `GNU C17 12.2.0 -mtune=generic -O2` into the compiler identity
/// and its recorded switches.
fn split_producer(producer: &str) -> (&str, Option<&str>) {
    match producer.find(" -") {
        Some(idx) => (producer[..idx].trim(), Some(producer[idx + 1..].trim())),
        None => (producer.trim(), None),
    }
}

/// `GNU C17 ...` and `GNU C++14 ...` name the standard in the second word.
fn standard_from_producer(compiler_id: &str) -> LanguageStandard {
    compiler_id
        .split_whitespace()
        .nth(1)
        .map(|word| LanguageStandard::from_std_flag(&word.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_elf_input() {
        let err = ElfDwarfReader
            .compilation_units("notes.txt", b"plain text, not an object file")
            .expect_err("not ELF");
        assert!(format!("{err:#}").contains("parse ELF notes.txt"));
    }

    #[test]
    fn dwarf_language_codes() {
        assert_eq!(language_of(gimli::DW_LANG_C99), (Language::C, LanguageStandard::C99));
        assert_eq!(
            language_of(gimli::DW_LANG_C_plus_plus_14),
            (Language::Cpp, LanguageStandard::Cpp14)
        );
        assert_eq!(language_of(gimli::DW_LANG_Rust).0, Language::Unknown);
    }

    #[test]
    fn producer_strings() {
        let (id, switches) = split_producer("GNU C17 12.2.0 -mtune=generic -O2 -DNDEBUG");
        assert_eq!(id, "GNU C17 12.2.0");
        assert_eq!(switches, Some("-mtune=generic -O2 -DNDEBUG"));
        assert_eq!(standard_from_producer(id), LanguageStandard::C17);
        assert_eq!(standard_from_producer("GNU C++14 9.4.0"), LanguageStandard::Cpp14);
        assert_eq!(split_producer("clang version 17.0.6"), ("clang version 17.0.6", None));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reads_the_running_test_binary() {
        let exe = std::env::current_exe().expect("current exe");
        let data = std::fs::read(&exe).expect("read exe");
        ElfDwarfReader
            .compilation_units(&exe.to_string_lossy(), &data)
            .expect("test binary parses");
    }
}

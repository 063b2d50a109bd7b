use super::*;
use crate::config::DiscoveryConfig;
use crate::discovery::pkg_config::NoPackageConfig;
use crate::fs_probe::MemoryFileSystem;
use std::sync::Arc;

struct FixedPackages;

impl PackageConfig for FixedPackages {
    fn cflags(&self, package: &str) -> Option<Vec<String>> {
        (package == "gtk").then(|| vec!["-I/opt/gtk/include".to_string(), "-DGTK".to_string()])
    }
}

fn context() -> DiscoveryContext {
    let fs = MemoryFileSystem::new()
        .with_file("/proj/sub/main.c", "")
        .with_file("/proj/lib/util.c", "")
        .with_dir("/proj/sub/inc");
    DiscoveryContext::new(DiscoveryConfig::default(), Arc::new(fs)).expect("context")
}

fn lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

#[test]
fn entering_compile_leaving_yields_one_record() {
    let ctx = context();
    let mut builder = RecordBuilder::new(&ctx);
    let transcript = lines(
        "make[1]: Entering directory '/proj/sub'\n\
         gcc -Iinc -DDEBUG -c main.c\n\
         make[1]: Leaving directory '/proj/sub'\n",
    );
    parse_make_log(&transcript, &ctx, &mut builder, Some("/proj"));
    let result = builder.finish();

    assert_eq!(result.records.len(), 1);
    let record = &result.records[0];
    assert_eq!(&*record.compile_directory, "/proj/sub");
    assert_eq!(record.item_name, "main.c");
    assert_eq!(record.user_include_paths, vec![Arc::<str>::from("/proj/sub/inc")]);
    assert_eq!(record.user_macros.get("DEBUG"), Some(&None));
    assert_eq!(record.language, Language::C);
}

#[test]
fn cd_fragments_and_continuations_set_the_directory() {
    let ctx = context();
    let mut builder = RecordBuilder::new(&ctx);
    let transcript = lines("cd lib && gcc -O2 \\\n    -c util.c -o util.o\n");
    parse_make_log(&transcript, &ctx, &mut builder, Some("/proj"));
    let result = builder.finish();
    assert_eq!(result.records.len(), 1);
    assert_eq!(&*result.records[0].item_path, "/proj/lib/util.c");
}

#[test]
fn commands_without_a_directory_are_skipped() {
    let ctx = context();
    let mut builder = RecordBuilder::new(&ctx);
    parse_make_log(&lines("gcc -c main.c\n"), &ctx, &mut builder, None);
    assert!(builder.finish().records.is_empty());
}

#[test]
fn cancellation_stops_between_lines() {
    let ctx = context();
    ctx.cancel.cancel();
    let mut builder = RecordBuilder::new(&ctx);
    parse_make_log(&lines("gcc -c main.c\n"), &ctx, &mut builder, Some("/proj/sub"));
    let result = builder.finish();
    assert!(result.cancelled);
    assert!(result.records.is_empty());
}

#[test]
fn matcher_rejects_flags_and_partial_names() {
    let matcher = CompilerMatcher::new(&CompilerNames::default(), false);
    assert_eq!(matcher.find("foo -cc bar"), None);
    assert_eq!(matcher.find("ld -o app -lgcc main.o"), None);
    assert_eq!(matcher.find("cp x.cc y.cc"), None);
    assert_eq!(matcher.find("gcc.exe -c x.c"), None);

    let hit = matcher.find("/usr/bin/gcc -c x.c").expect("gcc");
    assert_eq!(hit.tool, "gcc");
    assert_eq!(hit.command, "/usr/bin/gcc -c x.c");

    let hit = matcher.find("ccache g++ -c a.cc").expect("g++");
    assert_eq!(hit.tool, "g++");
    assert_eq!(hit.language, Language::Cpp);
    assert_eq!(hit.command, "g++ -c a.cc");
}

#[test]
fn matcher_looks_past_compilers_named_inside_flags() {
    let matcher = CompilerMatcher::new(&CompilerNames::default(), false);
    let hit = matcher
        .find("ccache --dir=/opt/gcc gcc -c a.c")
        .expect("gcc after the flag");
    assert_eq!(hit.tool, "gcc");
    assert_eq!(hit.command, "gcc -c a.c");
}

#[test]
fn matcher_accepts_exe_suffix_for_windows_targets() {
    let matcher = CompilerMatcher::new(&CompilerNames::default(), true);
    let hit = matcher.find("C:\\mingw\\bin\\gcc.exe -c x.c").expect("gcc.exe");
    assert_eq!(hit.tool, "gcc");
}

#[test]
fn backticks_expand_known_subshells() {
    assert_eq!(
        expand_backticks("gcc `pkg-config --cflags gtk` -c ui.c", &FixedPackages),
        "gcc -I/opt/gtk/include -DGTK -c ui.c"
    );
    assert_eq!(
        expand_backticks("gcc `pkg-config --libs gtk` x.o", &FixedPackages),
        "gcc  x.o"
    );
    assert_eq!(
        expand_backticks("a `echo \"b c\" d` e `cygpath -w /tmp/x` f `date` g", &NoPackageConfig),
        "a b c e /tmp/x f  g"
    );
    assert_eq!(expand_backticks("say `unterminated", &NoPackageConfig), "say `unterminated");
}

#[test]
fn backtick_expansion_is_bounded() {
    let line = "`".repeat(100);
    let expanded = expand_backticks(&line, &NoPackageConfig);
    assert_eq!(expanded.len(), 100 - 2 * MAX_BACKTICK_EXPANSIONS);
}

#[test]
fn commands_split_outside_quotes() {
    assert_eq!(
        split_commands("cd sub && gcc -c a.c; echo 'x;y' || true"),
        vec!["cd sub", "gcc -c a.c", "echo 'x;y'", "true"]
    );
    assert_eq!(split_commands("a | b"), vec!["a | b"]);
}

#[test]
fn continuation_lines_fold() {
    let folded = fold_continuations(&lines("gcc \\\n  -c a.c\nnext\ntrailing \\"));
    assert_eq!(folded, vec!["gcc -c a.c", "next", "trailing"]);
}

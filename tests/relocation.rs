//! Relocating a transcript recorded on another machine onto a local checkout.

mod common;

use std::fs;

use common::ProjectFixture;

fn checkout() -> ProjectFixture {
    let fixture = ProjectFixture::new();
    fixture.file("proj/src/x.c", "int x;\n");
    fixture.dir("proj/include");
    fixture.file(
        "remote.log",
        "make[1]: Entering directory '/home/bob/proj/src'\n\
         gcc -I../include -c x.c\n\
         make[1]: Leaving directory '/home/bob/proj/src'\n",
    );
    fixture
}

#[test]
fn first_run_discovers_and_persists_rules() {
    let fixture = checkout();
    let proj = fixture.slash("proj");
    let report = fixture
        .run(&["scan-log", "remote.log", "--root", "proj", "--relocate"])
        .report();

    assert_eq!(report["mapping_mode"], "automatic");
    let record = &report["records"][0];
    assert_eq!(record["compile_directory"], format!("{proj}/src"));
    assert_eq!(record["item_path"], format!("{proj}/src/x.c"));
    assert_eq!(record["user_include_paths"][0], format!("{proj}/include"));

    let rules_path = fixture.path().join("proj/.bprov/path-mappings.txt");
    let rules = fs::read_to_string(rules_path).expect("rules saved");
    assert!(rules.starts_with("# checksum="));
    assert!(rules.contains(&format!("/home/bob/proj={proj}")));
}

#[test]
fn second_run_trusts_persisted_rules() {
    let fixture = checkout();
    let proj = fixture.slash("proj");
    fixture.run(&["scan-log", "remote.log", "--root", "proj", "--relocate"]).report();
    let report = fixture
        .run(&["scan-log", "remote.log", "--root", "proj", "--relocate"])
        .report();
    assert_eq!(report["mapping_mode"], "trusted");
    assert_eq!(report["records"][0]["item_path"], format!("{proj}/src/x.c"));

    let listed = fixture.run(&["mappings", "--root", "proj"]);
    assert!(listed.success, "{}", listed.stderr);
    assert_eq!(listed.stdout.trim(), format!("/home/bob/proj={proj}"));
}

#[test]
fn rules_learned_on_top_of_a_trusted_file_are_saved() {
    let fixture = checkout();
    let proj = fixture.slash("proj");
    fixture.run(&["scan-log", "remote.log", "--root", "proj", "--relocate"]).report();
    fixture.file(
        "ci.log",
        "make[1]: Entering directory '/builds/ci/proj/src'\n\
         gcc -c x.c\n\
         make[1]: Leaving directory '/builds/ci/proj/src'\n",
    );

    let report = fixture
        .run(&["scan-log", "ci.log", "--root", "proj", "--relocate"])
        .report();
    assert_eq!(report["mapping_mode"], "trusted");
    assert_eq!(report["records"][0]["item_path"], format!("{proj}/src/x.c"));

    let listed = fixture.run(&["mappings", "--root", "proj"]);
    assert!(listed.success, "{}", listed.stderr);
    let rules: Vec<&str> = listed.stdout.lines().collect();
    assert_eq!(rules.len(), 2, "{}", listed.stdout);
    assert!(rules.contains(&format!("/home/bob/proj={proj}").as_str()));
    assert!(rules.contains(&format!("/builds/ci/proj={proj}").as_str()));
}

#[test]
fn edited_rules_are_reported_stale_and_rediscovered() {
    let fixture = checkout();
    let proj = fixture.slash("proj");
    fixture.run(&["scan-log", "remote.log", "--root", "proj", "--relocate"]).report();
    let rules_path = fixture.path().join("proj/.bprov/path-mappings.txt");
    let edited = fs::read_to_string(&rules_path).expect("rules") + "/elsewhere=/nowhere\n";
    fs::write(&rules_path, edited).expect("edit rules");

    let listed = fixture.run(&["mappings", "--root", "proj"]);
    assert!(listed.stdout.contains("edited outside bprov"), "{}", listed.stdout);

    let report = fixture
        .run(&["scan-log", "remote.log", "--root", "proj", "--relocate"])
        .report();
    assert_eq!(report["mapping_mode"], "automatic");
    assert_eq!(report["records"][0]["item_path"], format!("{proj}/src/x.c"));

    let reset = fixture.run(&["mappings", "--root", "proj", "--reset"]);
    assert!(reset.success);
    assert!(!rules_path.exists());
}

#[test]
fn relocation_without_root_is_rejected() {
    let fixture = checkout();
    let output = fixture.run(&["scan-log", "remote.log", "--relocate"]);
    assert!(!output.success);
}

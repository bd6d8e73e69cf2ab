use assert_cmd::cargo::cargo_bin_cmd;

fn help_output(args: &[&str]) -> String {
    let assert = cargo_bin_cmd!("archivist").args(args).assert().success();
    String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 help")
}

#[test]
fn top_level_help_lists_commands() {
    let output = help_output(&["--help"]);
    for command in ["load", "snapshot", "export", "stats", "config"] {
        assert!(output.contains(command), "{command} missing: {output}");
    }
}

#[test]
fn export_help_shows_usage() {
    let output = help_output(&["export", "--help"]);
    assert!(
        output.contains("archivist export --dist CODE [--patch N] --out DIR"),
        "export usage missing: {output}"
    );
}

#[test]
fn load_help_mentions_backends() {
    let output = help_output(&["load", "--help"]);
    assert!(
        output.contains("embedded or external"),
        "backend help missing: {output}"
    );
}

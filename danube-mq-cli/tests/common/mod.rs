use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

pub fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("danube-mq-cli"))
}

/// Writes `yaml` to a temporary file that lives as long as the returned handle.
pub fn config_file(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(yaml.as_bytes()).expect("write config");
    file.flush().expect("flush config");
    file
}

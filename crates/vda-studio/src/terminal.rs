// SPDX-License-Identifier: Apache-2.0

//! Terminal sandbox: pseudo commands over the in-memory file list and a
//! tightly fenced exec mode.
//!
//! Exec safety is enforced before any process exists: forbidden shell
//! tokens, a program allowlist, and argument checks all reject up front.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use vda_model::FileArtifact;

const EXEC_TIMEOUT: Duration = Duration::from_secs(20);
const FORBIDDEN_TOKENS: [&str; 7] = ["|", ";", "&", ">", "<", "`", "$("];
const ALLOWED_PROGRAMS: [&str; 10] = [
    "pwd", "ls", "cat", "grep", "head", "tail", "wc", "find", "sed", "echo",
];

/// Validate an exec command line. Returns program + args, or the
/// rejection message to surface verbatim.
pub fn parse_exec_command(command: &str) -> Result<(String, Vec<String>), String> {
    for token in FORBIDDEN_TOKENS {
        if command.contains(token) {
            return Err(format!("exec_rejected: forbidden shell token {token:?}"));
        }
    }
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return Err("exec_rejected: empty command".to_string());
    };
    if !ALLOWED_PROGRAMS.contains(&program) {
        return Err(format!("exec_rejected: command {program:?} not allowlisted"));
    }
    let args: Vec<String> = parts.map(ToString::to_string).collect();
    for arg in &args {
        if arg.starts_with('/') {
            return Err("exec_rejected: absolute paths are blocked".to_string());
        }
        if arg.contains("..") {
            return Err("exec_rejected: parent traversal is blocked".to_string());
        }
    }
    Ok((program.to_string(), args))
}

/// Run one allowlisted program with the workspace as cwd, 20s bound,
/// combined stdout+stderr.
pub(crate) async fn run_exec_command(cwd: &Path, command: &str) -> Vec<String> {
    let command = command.trim();
    if command.is_empty() {
        return vec!["usage: exec <shell-command>".to_string()];
    }
    let (program, args) = match parse_exec_command(command) {
        Ok(parsed) => parsed,
        Err(rejection) => return vec![rejection],
    };

    let mut child = match tokio::process::Command::new(&program)
        .args(&args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => return vec![format!("command_error: {err}")],
    };

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let reader = async {
        let mut combined = Vec::new();
        if let Some(out) = stdout.as_mut() {
            let _ = out.read_to_end(&mut combined).await;
        }
        if let Some(err) = stderr.as_mut() {
            let _ = err.read_to_end(&mut combined).await;
        }
        combined
    };

    match tokio::time::timeout(EXEC_TIMEOUT, async { (reader.await, child.wait().await) }).await {
        Ok((combined, wait)) => {
            let mut lines = output_lines(&combined);
            if let Err(err) = wait {
                lines.push(format!("command_error: {err}"));
            }
            lines
        }
        Err(_) => {
            let _ = child.kill().await;
            vec!["command_timeout: exceeded 20s".to_string()]
        }
    }
}

fn output_lines(combined: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(combined);
    let trimmed = text.trim_end_matches('\n');
    if trimmed.is_empty() {
        return vec!["(no output)".to_string()];
    }
    trimmed.split('\n').map(ToString::to_string).collect()
}

/// Pseudo commands operate on the in-memory artifact list only; paths are
/// case-sensitive exact strings.
pub(crate) fn run_pseudo_command(command: &str, files: &[FileArtifact]) -> Vec<String> {
    let command = command.trim();
    if command.is_empty() {
        return vec!["no command provided".to_string()];
    }
    let parts: Vec<&str> = command.split_whitespace().collect();
    match parts[0] {
        "help" => vec![
            "supported: help, pwd, ls [prefix], tree, cat <path>, grep <term>, exec <shell-command>"
                .to_string(),
        ],
        "pwd" => vec!["/workspace".to_string()],
        "ls" => {
            let prefix = parts.get(1).map(|p| p.trim_matches('/')).unwrap_or("");
            list_paths(files, prefix)
        }
        "tree" => list_paths(files, ""),
        "cat" => {
            let Some(path) = parts.get(1).map(|p| p.trim_matches('/')) else {
                return vec!["usage: cat <path>".to_string()];
            };
            match files.iter().find(|f| f.path == path) {
                Some(file) => file.content.split('\n').map(ToString::to_string).collect(),
                None => vec![format!("file not found: {path}")],
            }
        }
        "grep" => {
            if parts.len() < 2 {
                return vec!["usage: grep <term>".to_string()];
            }
            let term = parts[1..].join(" ").to_lowercase();
            let mut matches = Vec::new();
            for file in files {
                for (idx, line) in file.content.split('\n').enumerate() {
                    if line.to_lowercase().contains(&term) {
                        matches.push(format!("{}:{}:{line}", file.path, idx + 1));
                    }
                }
            }
            if matches.is_empty() {
                vec!["no matches".to_string()]
            } else {
                matches
            }
        }
        other => vec![format!("unsupported command: {other}"), "try: help".to_string()],
    }
}

fn list_paths(files: &[FileArtifact], prefix: &str) -> Vec<String> {
    let mut out: Vec<String> = files
        .iter()
        .filter(|f| prefix.is_empty() || f.path.starts_with(prefix))
        .map(|f| f.path.clone())
        .collect();
    if out.is_empty() {
        return vec!["(empty)".to_string()];
    }
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::{parse_exec_command, run_pseudo_command};
    use vda_model::FileArtifact;

    fn files() -> Vec<FileArtifact> {
        vec![FileArtifact {
            path: "apps/demo/README.md".to_string(),
            language: "markdown".to_string(),
            content: "# Demo\nGenerated scaffold.".to_string(),
        }]
    }

    #[test]
    fn forbidden_tokens_are_rejected_before_spawn() {
        let err = parse_exec_command("rm -rf / | true").expect_err("must reject");
        assert_eq!(err, "exec_rejected: forbidden shell token \"|\"");

        let err = parse_exec_command("rm -rf /").expect_err("must reject");
        assert_eq!(err, "exec_rejected: command \"rm\" not allowlisted");

        let err = parse_exec_command("cat /etc/passwd").expect_err("must reject");
        assert_eq!(err, "exec_rejected: absolute paths are blocked");

        let err = parse_exec_command("cat ../secret").expect_err("must reject");
        assert_eq!(err, "exec_rejected: parent traversal is blocked");
    }

    #[test]
    fn allowlisted_commands_parse() {
        let (program, args) = parse_exec_command("grep -n demo README.md").expect("parse");
        assert_eq!(program, "grep");
        assert_eq!(args, vec!["-n", "demo", "README.md"]);
    }

    #[test]
    fn pseudo_commands_cover_file_list() {
        assert_eq!(run_pseudo_command("pwd", &files()), vec!["/workspace"]);
        assert_eq!(
            run_pseudo_command("ls apps", &files()),
            vec!["apps/demo/README.md"]
        );
        assert_eq!(
            run_pseudo_command("cat apps/demo/README.md", &files()),
            vec!["# Demo", "Generated scaffold."]
        );
        assert_eq!(
            run_pseudo_command("grep generated", &files()),
            vec!["apps/demo/README.md:2:Generated scaffold."]
        );
        let unknown = run_pseudo_command("nope", &files());
        assert_eq!(unknown[0], "unsupported command: nope");
    }
}

//! Transfer-tool probing.
//!
//! Small helpers the console surface needs: which remotes exist, which
//! version is installed, where its config lives, and directory suggestions
//! for path pickers.

use std::process::Stdio;

use tokio::process::Command;

use crate::error::{CoreError, CoreResult};

async fn run(tool: &str, args: &[&str]) -> CoreResult<String> {
    let output = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| CoreError::transient(format!("run {tool} {}: {e}", args.join(" "))))?;
    if !output.status.success() {
        let mut msg = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if msg.is_empty() {
            msg = format!("exit status {}", output.status);
        }
        return Err(CoreError::transient(format!("{tool} {}: {msg}", args[0])));
    }
    Ok(String::from_utf8_lossy(&output.stdout).replace("\r\n", "\n"))
}

/// Lists configured remote names, trailing `:` stripped.
pub async fn list_remotes(tool: &str, config_path: &str) -> CoreResult<Vec<String>> {
    let mut args = vec!["listremotes"];
    if !config_path.is_empty() {
        args.push("--config");
        args.push(config_path);
    }
    let out = run(tool, &args).await?;
    Ok(out
        .lines()
        .map(|line| line.trim().trim_end_matches(':').to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

/// First line of `<tool> version`.
pub async fn tool_version(tool: &str) -> CoreResult<String> {
    let out = run(tool, &["version"]).await?;
    Ok(out.lines().next().unwrap_or_default().trim().to_string())
}

/// Path printed by `<tool> config file` — the last non-header line.
pub async fn config_file_path(tool: &str) -> CoreResult<String> {
    let out = run(tool, &["config", "file"]).await?;
    Ok(out
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .next_back()
        .unwrap_or_default()
        .to_string())
}

/// Immediate subdirectories of a remote spec, for path suggestions.
pub async fn suggest_dirs(
    tool: &str,
    remote_spec: &str,
    config_path: &str,
) -> CoreResult<Vec<String>> {
    let mut args = vec!["lsf", remote_spec, "--dirs-only", "--max-depth", "1"];
    if !config_path.is_empty() {
        args.push("--config");
        args.push(config_path);
    }
    let out = run(tool, &args).await?;
    Ok(out
        .lines()
        .map(|line| line.trim().trim_end_matches('/').to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tool_is_transient() {
        let err = tool_version("driftsync-no-such-tool").await.unwrap_err();
        assert!(matches!(err, CoreError::Transient(_)));
    }

    #[tokio::test]
    async fn test_version_takes_first_line() {
        // `echo` stands in for the tool; it ignores the subcommand and
        // prints its arguments, exercising the first-line extraction.
        let out = run("echo", &["version"]).await.unwrap();
        assert_eq!(out.trim(), "version");
    }

    #[test]
    fn test_remote_name_trimming() {
        let lines = "remA:\nremB:\n\n";
        let remotes: Vec<String> = lines
            .lines()
            .map(|l| l.trim().trim_end_matches(':').to_string())
            .filter(|l| !l.is_empty())
            .collect();
        assert_eq!(remotes, vec!["remA", "remB"]);
    }
}

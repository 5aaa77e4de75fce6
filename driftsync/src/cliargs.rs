//! Extra-argument parsing and sanitization for the transfer tool.
//!
//! Rules may carry free-form extra arguments for the child process. They are
//! tokenized with POSIX-like quoting, then stripped of any flag that would
//! interfere with job control: the remote-control endpoint, stats output,
//! the log file, the files-from list, and config selection all belong to the
//! executor, not the operator.

use crate::error::{CoreError, CoreResult};

/// Tokenizes a command-line string into argv.
///
/// Single and double quotes delimit spans (no nesting); a backslash escapes
/// the next character except inside single quotes. An unterminated quote or
/// a trailing escape is a configuration error.
pub fn parse_extra_args(input: &str) -> CoreResult<Vec<String>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    let mut current = String::new();
    let mut has_token = false;
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;

    for c in input.chars() {
        if escaped {
            current.push(c);
            has_token = true;
            escaped = false;
            continue;
        }
        match c {
            '\\' if !in_single => escaped = true,
            '\'' if !in_double => {
                in_single = !in_single;
                has_token = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                has_token = true;
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if has_token && !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                current.clear();
                has_token = false;
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if escaped {
        return Err(CoreError::config("unterminated escape in extra arguments"));
    }
    if in_single || in_double {
        return Err(CoreError::config("unterminated quote in extra arguments"));
    }
    if has_token && !current.is_empty() {
        out.push(current);
    }
    Ok(out)
}

/// Result of a sanitization pass: the surviving arguments plus whatever was
/// removed, for logging.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SanitizedArgs {
    pub args: Vec<String>,
    pub blocked: Vec<String>,
}

/// Removes flags that would break job control.
///
/// Blocked: every `--rc*` and `--stats*` flag, `--log-file`, `--files-from`,
/// `--files-from-raw`, `--files-from-replace`, `--config`. When the blocked
/// flag is space-separated rather than `=`-separated and takes a value, the
/// following argument is consumed too.
pub fn sanitize_extra_args(args: &[String]) -> SanitizedArgs {
    let mut out = SanitizedArgs::default();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].trim();
        i += 1;
        if arg.is_empty() {
            continue;
        }
        let key = arg.split_once('=').map_or(arg, |(k, _)| k).to_ascii_lowercase();
        if is_control_flag(&key) {
            out.blocked.push(arg.to_string());
            if !arg.contains('=') && control_flag_takes_value(&key) && i < args.len() {
                i += 1;
            }
            continue;
        }
        out.args.push(arg.to_string());
    }
    out
}

/// Removes filter-family flags that would conflict with the files-from list.
///
/// Scheduled jobs enumerate their batch explicitly; operator-supplied
/// include/exclude filters on top of that make the completion reconciliation
/// ambiguous, so they are stripped from scheduled (not manual) jobs.
pub fn sanitize_filter_args(args: &[String]) -> SanitizedArgs {
    let mut out = SanitizedArgs::default();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].trim();
        i += 1;
        if arg.is_empty() {
            continue;
        }
        let has_eq = arg.contains('=');
        let key = arg.split_once('=').map_or(arg, |(k, _)| k).to_ascii_lowercase();
        if is_filter_flag(&key) {
            out.blocked.push(arg.to_string());
            if !has_eq && filter_flag_takes_value(&key) && i < args.len() {
                i += 1;
            }
            continue;
        }
        out.args.push(arg.to_string());
    }
    out
}

fn is_control_flag(key: &str) -> bool {
    key.starts_with("--rc")
        || key.starts_with("--stats")
        || matches!(
            key,
            "--log-file" | "--files-from" | "--files-from-raw" | "--files-from-replace" | "--config"
        )
}

fn control_flag_takes_value(key: &str) -> bool {
    matches!(
        key,
        "--log-file" | "--files-from" | "--files-from-raw" | "--files-from-replace" | "--config"
            | "--stats"
    ) || key.starts_with("--rc-")
        || key.starts_with("--stats-")
}

fn is_filter_flag(key: &str) -> bool {
    key.starts_with("--exclude")
        || key.starts_with("--include")
        || key.starts_with("--filter")
        || matches!(
            key,
            "--min-age" | "--max-age" | "--min-size" | "--max-size" | "--ignore-size"
                | "--delete-excluded"
        )
}

fn filter_flag_takes_value(key: &str) -> bool {
    matches!(
        key,
        "--exclude"
            | "--include"
            | "--filter"
            | "--exclude-from"
            | "--include-from"
            | "--filter-from"
            | "--exclude-if-present"
            | "--include-if-present"
            | "--min-age"
            | "--max-age"
            | "--min-size"
            | "--max-size"
    )
}

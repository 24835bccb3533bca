//! Parser for command-script files and command-line command entries.
//!
//! A command script holds one command per line: the quoted command text,
//! optionally followed by a quoted expected pattern.
//!
//! ```text
//! # comments and blank lines are ignored
//! "term len 0" ">"
//! "show version" "[>#]\s*$"   # inline comments too
//! "show clock"
//! ```
//!
//! The top-level entry points are [`parse_str`] and [`parse_file`].

use crate::profile::Command;
use anyhow::{Context as _, Result, anyhow};
use std::path::Path;
use std::time::Duration;

/// Parse a command script from a string slice.
///
/// Lines that are empty or start with `#` are ignored. Inline comments (` # …`)
/// are stripped while preserving `#` characters inside quoted strings.
///
/// # Errors
///
/// Returns an error if any line is not a quoted command, has an unclosed
/// quote, or carries an invalid pattern.
///
/// # Example
///
/// ```
/// use expectty::parser::parse_str;
///
/// let commands = parse_str("\"term len 0\" \">\"\n\"show version\"\n").unwrap();
/// assert_eq!(commands.len(), 2);
/// ```
pub fn parse_str(content: &str) -> Result<Vec<Command>> {
    let mut commands = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = strip_inline_comment(line);
        let cmd = parse_line(line)
            .with_context(|| format!("Failed to parse line {}: {}", line_num + 1, line))?;
        commands.push(cmd);
    }
    Ok(commands)
}

/// Parse a command script from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or if the script is malformed.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Command>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read command file: {}", path.display()))?;
    parse_str(&content)
}

/// Parse one `--cmd` argument.
///
/// A quoted entry uses the script syntax; anything else is taken verbatim
/// as the command text with no pattern of its own.
pub fn parse_entry(arg: &str) -> Result<Command> {
    if arg.trim_start().starts_with('"') {
        parse_line(arg)
    } else {
        Ok(Command::new(arg))
    }
}

/// Parse `"command"` or `"command" "pattern"`.
fn parse_line(line: &str) -> Result<Command> {
    let (text, rest) = take_quoted(line)?;
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(Command::new(text));
    }
    let (pattern, trailing) = take_quoted(rest)?;
    if !trailing.trim().is_empty() {
        return Err(anyhow!("Unexpected text after pattern: {}", trailing.trim()));
    }
    Ok(Command::expecting(text, &pattern)?)
}

/// Split a leading quoted string off `s`, returning its unescaped contents
/// and the remainder after the closing quote.
fn take_quoted(s: &str) -> Result<(String, &str)> {
    let s = s.trim();
    if !s.starts_with('"') {
        return Err(anyhow!("Expected a quoted string, got: {}", s));
    }

    // Locate the closing quote, respecting backslash escapes.
    let mut escaped = false;
    let mut end_idx = None;
    for (i, ch) in s.char_indices().skip(1) {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == '"' {
            end_idx = Some(i);
            break;
        }
    }

    let end_idx = end_idx.ok_or_else(|| anyhow!("Unclosed quote: {}", s))?;
    Ok((parse_quoted_string(&s[..=end_idx])?, &s[end_idx + 1..]))
}

/// Strip inline comments from a line, preserving `#` inside quoted strings.
fn strip_inline_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }
        if ch == '#' && !in_quotes {
            return line[..i].trim();
        }
    }
    line
}

/// Parse a duration string: `60`, `1.5`, `1s`, `500ms`. Bare numbers are seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if let Some(ms_str) = s.strip_suffix("ms") {
        let ms: u64 = ms_str
            .trim()
            .parse()
            .context("Invalid milliseconds value")?;
        return Ok(Duration::from_millis(ms));
    }
    let secs: f64 = match s.strip_suffix('s') {
        Some(s_str) => s_str.trim().parse().context("Invalid seconds value")?,
        None => s
            .parse()
            .map_err(|_| anyhow!("Duration must be seconds, or end with 's' or 'ms', got: {}", s))?,
    };
    Duration::try_from_secs_f64(secs).map_err(|_| anyhow!("Invalid duration: {}", s))
}

/// Unescape a double-quoted string, processing `\t`, `\"` and `\\`.
///
/// Other backslash sequences are kept as written so regex escapes such as
/// `\s` and `\d` survive.
fn parse_quoted_string(s: &str) -> Result<String> {
    let s = s.trim();
    if !s.starts_with('"') {
        return Err(anyhow!("Expected string to start with '\"'"));
    }
    if s.len() < 2 || !s.ends_with('"') {
        return Err(anyhow!("Expected string to end with '\"'"));
    }

    let mut out = String::new();
    let mut chars = s[1..s.len() - 1].chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Ok(out)
}

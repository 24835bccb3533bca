//! Rewrites literal escape sequences in captured shell output.

const ESCAPED_NEWLINE: &str = "\\n";
const ESCAPED_CARRIAGE_RETURN: &str = "\\r";

/// Replace every literal `\n` with a newline and drop every literal `\r`.
///
/// Removing a `\r` can splice a new escape together (`\\rr` becomes `\r`),
/// so the rewrite repeats until nothing is left to rewrite. Each pass
/// shortens the text, which bounds the loop and makes the function
/// idempotent.
pub fn normalize(text: &str) -> String {
    let mut out = text.to_string();
    while out.contains(ESCAPED_NEWLINE) || out.contains(ESCAPED_CARRIAGE_RETURN) {
        out = out
            .replace(ESCAPED_NEWLINE, "\n")
            .replace(ESCAPED_CARRIAGE_RETURN, "");
    }
    out
}

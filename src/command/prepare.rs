// src/command/prepare.rs

use crate::process::Arguments;

/// A user-supplied command specification, before platform preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// An explicit argument list, used verbatim as argv. No shell is
    /// involved, so shell metacharacters have no effect.
    Argv(Vec<String>),

    /// A free-form command line, run through the platform's default command
    /// interpreter so metacharacters are honored.
    Shell(String),
}

/// Turn a [`CommandSpec`] into a platform-appropriate argv.
///
/// The shell wrapper matches what the platform expects: `sh -c` on Unix,
/// `cmd /C` on Windows. Malformed input is not rejected here; the OS will
/// reject it at spawn time and the failure is reported as a normal terminal
/// result.
pub fn prepare_command(spec: CommandSpec) -> Arguments {
    match spec {
        CommandSpec::Argv(args) => args,
        CommandSpec::Shell(line) => {
            if cfg!(windows) {
                vec!["cmd".to_string(), "/C".to_string(), line]
            } else {
                vec!["sh".to_string(), "-c".to_string(), line]
            }
        }
    }
}

/// Escape a single argument for a `CreateProcess`-style command line.
///
/// Follows the documented MSVC argument parsing rules so the receiving
/// process reconstructs the argument unchanged: arguments without
/// whitespace or quotes pass through verbatim; otherwise the argument is
/// quote-wrapped, backslashes preceding a quote are doubled, and embedded
/// quotes are backslash-escaped.
pub fn escape_create_process_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '\x0b', '"']) {
        return arg.to_string();
    }

    let mut escaped = String::with_capacity(arg.len() + 2);
    escaped.push('"');

    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                escaped.push_str(&"\\".repeat(backslashes * 2 + 1));
                escaped.push('"');
                backslashes = 0;
            }
            _ => {
                escaped.push_str(&"\\".repeat(backslashes));
                escaped.push(c);
                backslashes = 0;
            }
        }
    }

    // Backslashes at the end of the argument would otherwise escape the
    // closing quote.
    escaped.push_str(&"\\".repeat(backslashes * 2));
    escaped.push('"');
    escaped
}

/// Render an argument list as a single-quoted, space-joined string.
///
/// Used only for logging; nothing parses this.
pub fn pretty_print_arguments(arguments: &[String]) -> String {
    format!("'{}'", arguments.join("' '"))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn argv_form_passes_through_verbatim() {
        let args = vec!["echo".to_string(), "hello world".to_string()];
        assert_eq!(prepare_command(CommandSpec::Argv(args.clone())), args);
    }

    #[cfg(unix)]
    #[test]
    fn shell_form_wraps_in_sh_dash_c() {
        let prepared = prepare_command(CommandSpec::Shell("echo a && echo b".to_string()));
        assert_eq!(prepared, vec!["sh", "-c", "echo a && echo b"]);
    }

    #[test]
    fn escape_leaves_plain_words_alone() {
        assert_eq!(escape_create_process_arg("hello"), "hello");
        assert_eq!(escape_create_process_arg("C:\\temp\\x"), "C:\\temp\\x");
    }

    #[test]
    fn escape_quotes_whitespace_and_empty() {
        assert_eq!(escape_create_process_arg("hello world"), "\"hello world\"");
        assert_eq!(escape_create_process_arg(""), "\"\"");
    }

    #[test]
    fn escape_handles_embedded_quotes() {
        assert_eq!(escape_create_process_arg("a\"b"), "\"a\\\"b\"");
        // A backslash before a quote doubles, plus the escape for the quote.
        assert_eq!(escape_create_process_arg("a\\\"b"), "\"a\\\\\\\"b\"");
    }

    #[test]
    fn escape_doubles_trailing_backslashes() {
        assert_eq!(escape_create_process_arg("dir with space\\"), "\"dir with space\\\\\"");
    }

    #[test]
    fn pretty_print_quotes_and_joins() {
        let args = vec!["sh".to_string(), "-c".to_string(), "echo hi".to_string()];
        assert_eq!(pretty_print_arguments(&args), "'sh' '-c' 'echo hi'");
        assert_eq!(pretty_print_arguments(&[]), "''");
    }

    /// Naive inverse of `pretty_print_arguments` for arguments that contain
    /// no single quotes: strip the outer quotes and split on `' '`.
    fn naive_unquote(rendered: &str) -> Option<Vec<String>> {
        let inner = rendered.strip_prefix('\'')?.strip_suffix('\'')?;
        Some(inner.split("' '").map(str::to_string).collect())
    }

    proptest! {
        #[test]
        fn pretty_print_round_trips(args in proptest::collection::vec("[A-Za-z0-9_./-]{1,12}", 1..8)) {
            let rendered = pretty_print_arguments(&args);
            prop_assert_eq!(naive_unquote(&rendered), Some(args));
        }
    }
}

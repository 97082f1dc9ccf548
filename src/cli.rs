//! Command-line interface.

use clap::Parser;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "

License: MIT
Exit status: 0 for a normal exit, 1 for environmental problems (file not
found, invalid flags, I/O errors, etc), 2 to indicate a corrupt or invalid
input file, 3 for an internal consistency error (e.g., bug)."
);

#[derive(Parser, Debug)]
#[command(name = "edx")]
#[command(about = "The standard line editor, in Rust")]
#[command(long_about = "edx is a line-oriented text editor. It is used to create, display,
modify and otherwise manipulate text files, both interactively and via
shell scripts. A restricted version, red, can only edit files in the
current directory and cannot execute shell commands.

Start the edit by reading in 'file' if given. If 'file' begins with a
'!', read the output of the shell command instead. A 'file' of '-'
selects scripted mode (suppress diagnostics, byte counts and the '!'
prompt).")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_version = LONG_VERSION)]
pub struct Cli {
    /// File to edit, '!command' to read a pipe, or '-' for scripted mode
    #[arg(value_name = "FILE")]
    pub file: Option<String>,

    /// Use extended regular expressions
    #[arg(short = 'E', long = "extended-regexp")]
    pub extended_regexp: bool,

    /// Run in compatibility mode
    #[arg(short = 'G', long = "traditional")]
    pub traditional: bool,

    /// Set the language for syntax highlighting
    #[arg(short = 'H', long = "highlight", value_name = "LANG")]
    pub highlight: Option<String>,

    /// Exit with 0 status even if a command fails
    #[arg(short = 'l', long = "loose-exit-status")]
    pub loose_exit_status: bool,

    /// Use STRING as an interactive prompt
    #[arg(short = 'p', long = "prompt", value_name = "STRING")]
    pub prompt: Option<String>,

    /// Run in restricted mode (no shell escapes, no paths outside '.')
    #[arg(short = 'r', long = "restricted")]
    pub restricted: bool,

    /// Suppress diagnostics, byte counts and the '!' prompt
    #[arg(short = 's', long = "quiet", visible_alias = "silent")]
    pub scripted: bool,

    /// Be verbose; equivalent to the 'H' command
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Strip carriage returns at end of text lines
    #[arg(long = "strip-trailing-cr")]
    pub strip_cr: bool,
}

/// Bad options exit 1 (environmental), not clap's default of 2, which is
/// reserved for corrupt input in script mode.
pub fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// The restricted editor can also be selected by invoking the binary as
/// `red`.
pub fn invoked_as_red() -> bool {
    std::env::args()
        .next()
        .map(|argv0| {
            std::path::Path::new(&argv0)
                .file_name()
                .map(|n| n == "red")
                .unwrap_or(false)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_parse() {
        let cli = Cli::try_parse_from(["edx", "-E", "-s", "-p", "> ", "file.txt"]).unwrap();
        assert!(cli.extended_regexp);
        assert!(cli.scripted);
        assert_eq!(cli.prompt.as_deref(), Some("> "));
        assert_eq!(cli.file.as_deref(), Some("file.txt"));
        assert!(!cli.restricted);
    }

    #[test]
    fn test_silent_alias() {
        let cli = Cli::try_parse_from(["edx", "--silent"]).unwrap();
        assert!(cli.scripted);
    }

    #[test]
    fn test_dash_file_is_accepted() {
        let cli = Cli::try_parse_from(["edx", "-"]).unwrap();
        assert_eq!(cli.file.as_deref(), Some("-"));
    }

    #[test]
    fn test_highlight_language() {
        let cli = Cli::try_parse_from(["edx", "-H", "cpp.lang"]).unwrap();
        assert_eq!(cli.highlight.as_deref(), Some("cpp.lang"));
    }
}

mod bre;
mod buffer;
mod cli;
mod error;
mod exec;
mod global_cmd;
mod highlight;
mod io;
mod logger;
mod marks;
mod parser;
mod regexp;
mod scratch;
mod signals;
mod undo;

use anyhow::Result;

use crate::error::EdError;
use crate::exec::{Config, Editor};
use crate::io::RawStdin;

/// True when the file descriptor is (or cannot be proven not to be) a
/// regular file; script-mode error handling applies then.
fn is_regular_file(fd: i32) -> bool {
    unsafe {
        let mut st: libc::stat = std::mem::zeroed();
        libc::fstat(fd, &mut st) != 0 || (st.st_mode & libc::S_IFMT) == libc::S_IFREG
    }
}

fn main() -> Result<()> {
    let args = cli::parse_args();
    if let Some(path) = logger::init_debug_logging()? {
        tracing::debug!(log = %path.display(), "session started");
    }

    let mut cfg = Config {
        extended_regexp: args.extended_regexp,
        traditional: args.traditional,
        restricted: args.restricted || cli::invoked_as_red(),
        scripted: args.scripted,
        strip_cr: args.strip_cr,
        loose_exit_status: args.loose_exit_status,
        stdin_is_regular: is_regular_file(0),
        lang: args.highlight,
    };

    let mut file = args.file;
    if file.as_deref() == Some("-") {
        cfg.scripted = true;
        file = None;
    }

    let mut editor = match Editor::new(cfg.clone(), Box::new(RawStdin), Box::new(std::io::stdout()))
    {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("edx: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(prompt) = args.prompt.as_deref() {
        editor.set_prompt(prompt);
    }
    if args.verbose {
        editor.set_verbose();
    }
    signals::set_signals();

    let mut initial_error = false;
    if let Some(name) = file.as_deref() {
        if let Err(e) = editor.read_initial_file(name) {
            if cfg.stdin_is_regular {
                std::process::exit(2);
            }
            // a merely missing file leaves a fresh buffer behind; anything
            // else starts the session in an error state
            if e != EdError::Io("Cannot open input file") {
                initial_error = true;
            }
        }
    }

    if initial_error {
        println!("?");
    }
    let status = editor.main_loop(initial_error);
    tracing::debug!(status, "session ended");
    std::process::exit(status);
}

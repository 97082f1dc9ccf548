//! The editor context, command dispatcher and main loop.
//!
//! One `Editor` value owns every piece of session state: the line buffer
//! (with its undo stack, marks and active list), the regex cache, the
//! command input, the output stream and the invocation flags. The
//! dispatcher decodes one verb per call; the global engine re-enters it
//! over the active list with the command buffer swapped for the saved
//! command list.

use std::io::{Read, Write};
use std::process::Command;

use crate::buffer::LineBuffer;
use crate::error::{EdError, Result};
use crate::io::{self, Input, PF_L, PF_N, PF_P};
use crate::parser::{self, AddrRange};
use crate::regexp::{self, RegexPool};
use crate::signals;

/// Maximum accepted filename length.
const PATH_MAX: usize = 1024;

/// Invocation flags (the editor's whole configuration surface).
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub extended_regexp: bool,
    pub traditional: bool,
    pub restricted: bool,
    pub scripted: bool,
    pub strip_cr: bool,
    pub loose_exit_status: bool,
    /// stdin is a regular file: errors terminate with script semantics.
    pub stdin_is_regular: bool,
    /// Highlight language for the print path.
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Quit,
}

// repeat-substitution suffix flags
const SF_G: u8 = 0x01;
const SF_P: u8 = 0x02;
const SF_R: u8 = 0x04;
const SF_NONE: u8 = 0x08;

pub struct Editor {
    pub buffer: LineBuffer,
    pub pool: RegexPool,
    pub input: Input,
    out: Box<dyn Write>,
    cfg: Config,
    def_filename: String,
    prompt_str: String,
    prompt_on: bool,
    verbose: bool,
    errmsg: String,
    /// Last shell command, with its `!` prefix.
    last_shell_cmd: Vec<u8>,
    // remembered state of the last substitution, for the repeat forms
    s_pflags: u8,
    s_pmask: u8,
    s_snum: i64,
}

impl Editor {
    pub fn new(cfg: Config, src: Box<dyn Read>, out: Box<dyn Write>) -> Result<Editor> {
        let scripted = cfg.scripted;
        Ok(Editor {
            buffer: LineBuffer::new()?,
            pool: RegexPool::default(),
            input: Input::new(src, scripted),
            out,
            cfg,
            def_filename: String::new(),
            prompt_str: "*".to_string(),
            prompt_on: false,
            verbose: false,
            errmsg: String::new(),
            last_shell_cmd: Vec::new(),
            s_pflags: 0,
            s_pmask: PF_P,
            s_snum: 1,
        })
    }

    pub fn set_prompt(&mut self, s: &str) {
        self.prompt_str = s.to_string();
        self.prompt_on = true;
    }

    pub fn set_verbose(&mut self) {
        self.verbose = true;
    }

    pub fn last_error(&self) -> &str {
        &self.errmsg
    }

    fn record_error(&mut self, e: &EdError) {
        self.errmsg = e.to_string();
        tracing::debug!(error = %self.errmsg, "command failed");
    }

    fn may_access_filename(&self, name: &str) -> Result<()> {
        if self.cfg.restricted {
            if name.starts_with('!') {
                return Err(EdError::ShellAccessRestricted);
            }
            if name == ".." || name.contains('/') {
                return Err(EdError::DirectoryAccessRestricted);
            }
        }
        Ok(())
    }

    /// Load the file named on the command line. The default filename is
    /// set even when the read fails, so `w` still has a target.
    pub fn read_initial_file(&mut self, name: &str) -> Result<()> {
        if let Err(e) = self.may_access_filename(name) {
            self.record_error(&e);
            return Err(e);
        }
        let res = io::read_file(
            name,
            0,
            &mut self.buffer,
            self.out.as_mut(),
            self.cfg.strip_cr,
            self.cfg.scripted,
        );
        if !name.starts_with('!') {
            self.def_filename = name.to_string();
        }
        match res {
            Ok(_) => Ok(()),
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    fn print_range(&mut self, from: usize, to: usize, pflags: u8) -> Result<()> {
        io::print_lines(
            &mut self.buffer,
            self.out.as_mut(),
            from,
            to,
            pflags,
            self.cfg.lang.as_deref(),
            self.cfg.traditional,
        )
    }

    /// Set the default range and validate `1 <= first <= second <= last`.
    fn check_addr_range(&self, r: &mut AddrRange, n: usize, m: usize) -> Result<()> {
        if r.count == 0 {
            r.first = n;
            r.second = m;
        }
        if r.first < 1 || r.first > r.second || r.second > self.buffer.last_addr() {
            return Err(EdError::InvalidAddress);
        }
        Ok(())
    }

    /// Default both addresses to `current`.
    fn check_addr_range2(&self, r: &mut AddrRange) -> Result<()> {
        let cur = self.buffer.current_addr();
        self.check_addr_range(r, cur, cur)
    }

    /// Default the second address and validate it alone.
    fn check_second_addr(&self, r: &mut AddrRange, addr: usize) -> Result<()> {
        if r.count == 0 {
            r.second = addr;
        }
        if r.second < 1 || r.second > self.buffer.last_addr() {
            return Err(EdError::InvalidAddress);
        }
        Ok(())
    }

    fn unexpected_address(r: &AddrRange) -> Result<()> {
        if r.count > 0 {
            return Err(EdError::UnexpectedAddress);
        }
        Ok(())
    }

    fn unexpected_command_suffix(&self) -> Result<()> {
        if !self.input.peek().is_ascii_whitespace() {
            return Err(EdError::UnexpectedCommandSuffix);
        }
        Ok(())
    }

    /// Collect `l`, `n`, `p` suffixes (each at most once) up to the
    /// command's terminating newline.
    fn get_command_suffix(&mut self, pflags: &mut u8) -> Result<()> {
        loop {
            let flag = match self.input.peek() {
                b'l' => PF_L,
                b'n' => PF_N,
                b'p' => PF_P,
                _ => break,
            };
            if *pflags & flag != 0 {
                break;
            }
            *pflags |= flag;
            self.input.advance(1);
        }
        if self.input.next_byte() != b'\n' {
            return Err(EdError::InvalidCommandSuffix);
        }
        Ok(())
    }

    /// Suffixes of a fresh `s` command: print flags plus `g`, a count and
    /// `i`/`I`.
    fn get_command_s_suffix(&mut self, ignore_case: &mut bool) -> Result<()> {
        let mut rep = false;
        loop {
            let ch = self.input.peek();
            if ch.is_ascii_digit() && ch != b'0' {
                if rep {
                    return Err(EdError::InvalidCommandSuffix);
                }
                let n = parser::parse_int(&mut self.input)?;
                if n <= 0 {
                    return Err(EdError::InvalidCommandSuffix);
                }
                rep = true;
                self.s_snum = n;
                continue;
            }
            match ch {
                b'g' => {
                    if rep {
                        break;
                    }
                    rep = true;
                    self.s_snum = 0;
                }
                b'i' | b'I' => {
                    if *ignore_case {
                        break;
                    }
                    *ignore_case = true;
                }
                b'l' => {
                    if self.s_pflags & PF_L != 0 {
                        break;
                    }
                    self.s_pflags |= PF_L;
                }
                b'n' => {
                    if self.s_pflags & PF_N != 0 {
                        break;
                    }
                    self.s_pflags |= PF_N;
                }
                b'p' => {
                    if self.s_pflags & PF_P != 0 {
                        break;
                    }
                    self.s_pflags |= PF_P;
                }
                _ => break,
            }
            self.input.advance(1);
        }
        if self.input.next_byte() != b'\n' {
            return Err(EdError::InvalidCommandSuffix);
        }
        Ok(())
    }

    /// Copy the shell command at the cursor, expanding `!` (previous
    /// command) and `%` (default filename). Returns it with a `!` prefix.
    fn get_shell_command(&mut self) -> Result<String> {
        if self.cfg.restricted {
            return Err(EdError::ShellAccessRestricted);
        }
        self.input.get_extended_line(&mut self.buffer.binary, true)?;
        let mut buf: Vec<u8> = Vec::new();
        let mut replacement = false; // a '!' or '%' was expanded

        if self.input.peek() != b'!' {
            buf.push(b'!');
        } else {
            if self.last_shell_cmd.is_empty()
                || (self.cfg.traditional && self.last_shell_cmd.len() < 2)
            {
                return Err(EdError::NoPreviousCommand);
            }
            buf.extend_from_slice(&self.last_shell_cmd);
            self.input.advance(1);
            replacement = true;
        }
        while self.input.peek() != b'\n' && !self.input.at_end() {
            if self.input.peek() == b'%' {
                if self.def_filename.is_empty() {
                    return Err(EdError::NoCurrentFilename);
                }
                buf.extend_from_slice(io::strip_escapes(&self.def_filename).as_bytes());
                self.input.advance(1);
                replacement = true;
            } else {
                let ch = self.input.next_byte();
                if ch != b'\\' {
                    buf.push(ch);
                    continue;
                }
                let ch = self.input.next_byte();
                if ch != b'%' {
                    buf.push(b'\\');
                }
                buf.push(ch);
            }
        }
        self.input.skip_newlines();
        self.last_shell_cmd = buf.clone();
        let cmd = String::from_utf8_lossy(&buf).into_owned();
        if replacement {
            let _ = writeln!(self.out, "{}", &cmd[1..]);
            let _ = self.out.flush();
        }
        Ok(cmd)
    }

    /// Copy the filename at the cursor; a `!` prefix hands off to the
    /// shell-command reader.
    fn get_filename(&mut self, traditional_f_command: bool) -> Result<String> {
        self.input.skip_blanks();
        if self.input.peek() != b'\n' {
            let size = self.input.get_extended_line(&mut self.buffer.binary, true)?;
            if self.input.peek() == b'!' {
                self.input.advance(1);
                return self.get_shell_command();
            } else if size > PATH_MAX {
                return Err(EdError::FilenameTooLong);
            }
        } else if !traditional_f_command && self.def_filename.is_empty() {
            return Err(EdError::NoCurrentFilename);
        }
        let mut name = Vec::new();
        while self.input.peek() != b'\n' && !self.input.at_end() {
            name.push(self.input.next_byte());
        }
        self.input.skip_newlines();
        let name = String::from_utf8_lossy(&name).into_owned();
        self.may_access_filename(&name)?;
        Ok(name)
    }

    /// The `s` command: either a fresh pattern/replacement pair or one of
    /// the repeat forms (`s`, `sg`, `sp`, `sr`, `sN`) that re-run the last
    /// substitution with toggled state.
    fn command_s(&mut self, mut r: AddrRange, pflags: &mut u8, isglobal: bool) -> Result<()> {
        self.check_addr_range2(&mut r)?;

        let mut sflags: u8 = 0;
        loop {
            let ch = self.input.peek();
            if ch.is_ascii_digit() && ch != b'0' {
                if sflags & SF_G != 0 {
                    return Err(EdError::InvalidCommandSuffix);
                }
                let n = parser::parse_int(&mut self.input)
                    .map_err(|_| EdError::InvalidCommandSuffix)?;
                if n <= 0 {
                    return Err(EdError::InvalidCommandSuffix);
                }
                sflags |= SF_G;
                self.s_snum = n;
            } else {
                match ch {
                    b'\n' => sflags |= SF_NONE,
                    b'g' => {
                        if sflags & SF_G != 0 {
                            return Err(EdError::InvalidCommandSuffix);
                        }
                        sflags |= SF_G;
                        self.s_snum = if self.s_snum != 0 { 0 } else { 1 };
                        self.input.advance(1);
                    }
                    b'p' => {
                        if sflags & SF_P != 0 {
                            return Err(EdError::InvalidCommandSuffix);
                        }
                        sflags |= SF_P;
                        self.input.advance(1);
                    }
                    b'r' => {
                        if sflags & SF_R != 0 {
                            return Err(EdError::InvalidCommandSuffix);
                        }
                        sflags |= SF_R;
                        self.input.advance(1);
                    }
                    _ => {
                        if sflags != 0 {
                            return Err(EdError::InvalidCommandSuffix);
                        }
                    }
                }
            }
            if sflags == 0 || self.input.peek() == b'\n' {
                break;
            }
        }
        if sflags != 0 {
            // repeat the last substitution
            if !self.pool.subst_regex() {
                return Err(EdError::NoPreviousSubstitution);
            }
            if sflags & SF_R != 0 {
                self.pool.replace_subst_re_by_search_re()?;
            }
            if sflags & SF_P != 0 {
                self.s_pflags ^= self.s_pmask;
            }
        } else {
            // don't compile the RE until the 'I' suffix is parsed
            let pat = regexp::get_pattern_for_s(&mut self.input, &self.pool)?;
            let delimiter = self.input.peek();
            regexp::extract_replacement(
                &mut self.input,
                &mut self.pool,
                isglobal,
                &mut self.buffer.binary,
            )?;
            self.s_pflags = 0;
            self.s_snum = 1;
            let mut ignore_case = false;
            if self.input.peek() == b'\n' {
                // omitted last delimiter means print
                self.s_pflags = PF_P;
            } else {
                if self.input.peek() == delimiter {
                    self.input.advance(1);
                }
                self.get_command_s_suffix(&mut ignore_case)?;
            }
            self.s_pmask = self.s_pflags & (PF_L | PF_N | PF_P);
            if self.s_pmask == 0 {
                self.s_pmask = PF_P;
            }
            regexp::set_subst_regex(&mut self.pool, &pat, ignore_case, self.cfg.extended_regexp)?;
        }
        *pflags = self.s_pflags;
        if !isglobal {
            self.buffer.clear_undo_stack();
        }
        regexp::search_and_replace(
            &mut self.buffer,
            &mut self.pool,
            r.first,
            r.second,
            self.s_snum,
            isglobal,
        )?;
        Ok(())
    }

    /// Execute the next command in the command buffer.
    fn exec_command(&mut self, prev_emod: bool, isglobal: bool) -> Result<Status> {
        signals::check_interrupt()?;
        let range = parser::extract_addresses(
            &mut self.input,
            &mut self.buffer,
            &mut self.pool,
            self.cfg.extended_regexp,
        )?;
        self.input.skip_blanks();
        let mut pflags: u8 = 0;
        let c = self.input.next_byte();
        match c {
            b'a' => {
                self.get_command_suffix(&mut pflags)?;
                if !isglobal {
                    self.buffer.clear_undo_stack();
                }
                self.buffer.append_lines(&mut self.input, range.second, false, isglobal)?;
            }
            b'i' => {
                self.get_command_suffix(&mut pflags)?;
                if !isglobal {
                    self.buffer.clear_undo_stack();
                }
                self.buffer.append_lines(&mut self.input, range.second, true, isglobal)?;
            }
            b'c' => {
                let mut r = range;
                self.check_addr_range2(&mut r)?;
                self.get_command_suffix(&mut pflags)?;
                if !isglobal {
                    self.buffer.clear_undo_stack();
                }
                self.buffer.delete_lines(r.first, r.second, isglobal)?;
                let cur = self.buffer.current_addr();
                self.buffer.append_lines(&mut self.input, cur, cur >= r.first, isglobal)?;
            }
            b'd' => {
                let mut r = range;
                self.check_addr_range2(&mut r)?;
                self.get_command_suffix(&mut pflags)?;
                if !isglobal {
                    self.buffer.clear_undo_stack();
                }
                self.buffer.delete_lines(r.first, r.second, isglobal)?;
            }
            b'e' | b'E' => {
                if c == b'e' && self.buffer.is_modified() && !prev_emod {
                    return Err(EdError::BufferModified);
                }
                Self::unexpected_address(&range)?;
                self.unexpected_command_suffix()?;
                let fnp = self.get_filename(false)?;
                let last = self.buffer.last_addr();
                self.buffer.delete_lines(1, last, isglobal)?;
                self.buffer.close_scratch();
                self.buffer
                    .open_scratch()
                    .map_err(|_| EdError::Fatal("Cannot open temp file"))?;
                if !fnp.is_empty() && !fnp.starts_with('!') {
                    self.def_filename = fnp.clone();
                }
                let name = if fnp.is_empty() { self.def_filename.clone() } else { fnp };
                io::read_file(
                    &name,
                    0,
                    &mut self.buffer,
                    self.out.as_mut(),
                    self.cfg.strip_cr,
                    self.cfg.scripted,
                )?;
                self.buffer.reset_undo_state();
                self.buffer.set_modified(false);
            }
            b'f' => {
                Self::unexpected_address(&range)?;
                self.unexpected_command_suffix()?;
                let fnp = self.get_filename(self.cfg.traditional)?;
                if fnp.starts_with('!') {
                    return Err(EdError::InvalidRedirection);
                }
                if !fnp.is_empty() {
                    self.def_filename = fnp;
                }
                let stripped = io::strip_escapes(&self.def_filename);
                writeln!(self.out, "{}", stripped).map_err(|_| EdError::Io("Cannot write file"))?;
            }
            b'g' | b'v' | b'G' | b'V' => {
                if isglobal {
                    return Err(EdError::CannotNestGlobal);
                }
                let match_sense = c == b'g' || c == b'G';
                let mut r = range;
                let last = self.buffer.last_addr();
                self.check_addr_range(&mut r, 1, last)?;
                regexp::build_active_list(
                    &mut self.input,
                    &mut self.buffer,
                    &mut self.pool,
                    r.first,
                    r.second,
                    match_sense,
                    self.cfg.extended_regexp,
                )?;
                let interactive = c == b'G' || c == b'V';
                if interactive {
                    self.get_command_suffix(&mut pflags)?;
                }
                if self.exec_global(pflags, interactive)? == Status::Quit {
                    return Ok(Status::Quit);
                }
            }
            b'h' | b'H' => {
                Self::unexpected_address(&range)?;
                self.get_command_suffix(&mut pflags)?;
                if c == b'H' {
                    self.verbose = !self.verbose;
                }
                if (c == b'h' || self.verbose) && !self.errmsg.is_empty() {
                    writeln!(self.out, "{}", self.errmsg)
                        .map_err(|_| EdError::Io("Cannot write file"))?;
                }
            }
            b'j' => {
                let mut r = range;
                let cur = self.buffer.current_addr();
                self.check_addr_range(&mut r, cur, cur + 1)?;
                self.get_command_suffix(&mut pflags)?;
                if !isglobal {
                    self.buffer.clear_undo_stack();
                }
                if r.first < r.second {
                    self.buffer.join_lines(r.first, r.second, isglobal)?;
                }
            }
            b'k' => {
                let mark = self.input.next_byte();
                if range.second == 0 {
                    return Err(EdError::InvalidAddress);
                }
                self.get_command_suffix(&mut pflags)?;
                let lp = self.buffer.search_line_node(range.second);
                self.buffer.mark_line_node(lp, mark)?;
            }
            b'l' | b'n' | b'p' => {
                let flag = match c {
                    b'l' => PF_L,
                    b'n' => PF_N,
                    _ => PF_P,
                };
                let mut r = range;
                self.check_addr_range2(&mut r)?;
                self.get_command_suffix(&mut pflags)?;
                self.print_range(r.first, r.second, pflags | flag)?;
                pflags = 0;
            }
            b'm' => {
                let mut r = range;
                self.check_addr_range2(&mut r)?;
                let addr = parser::get_third_addr(
                    &mut self.input,
                    &mut self.buffer,
                    &mut self.pool,
                    self.cfg.extended_regexp,
                    self.cfg.traditional,
                )?;
                if addr >= r.first && addr < r.second {
                    return Err(EdError::InvalidDestination);
                }
                self.get_command_suffix(&mut pflags)?;
                if !isglobal {
                    self.buffer.clear_undo_stack();
                }
                self.buffer.move_lines(r.first, r.second, addr, isglobal)?;
            }
            b'P' | b'q' | b'Q' => {
                Self::unexpected_address(&range)?;
                self.get_command_suffix(&mut pflags)?;
                if c == b'P' {
                    self.prompt_on = !self.prompt_on;
                } else if c == b'q' && self.buffer.is_modified() && !prev_emod {
                    return Err(EdError::BufferModified);
                } else {
                    return Ok(Status::Quit);
                }
            }
            b'r' => {
                self.unexpected_command_suffix()?;
                let addr = if range.count == 0 { self.buffer.last_addr() } else { range.second };
                let fnp = self.get_filename(false)?;
                if self.def_filename.is_empty() && !fnp.starts_with('!') {
                    self.def_filename = fnp.clone();
                }
                if !isglobal {
                    self.buffer.clear_undo_stack();
                }
                let name = if fnp.is_empty() { self.def_filename.clone() } else { fnp };
                let lines = io::read_file(
                    &name,
                    addr,
                    &mut self.buffer,
                    self.out.as_mut(),
                    self.cfg.strip_cr,
                    self.cfg.scripted,
                )?;
                if lines > 0 {
                    self.buffer.set_modified(true);
                }
            }
            b's' => self.command_s(range, &mut pflags, isglobal)?,
            b't' => {
                let mut r = range;
                self.check_addr_range2(&mut r)?;
                let addr = parser::get_third_addr(
                    &mut self.input,
                    &mut self.buffer,
                    &mut self.pool,
                    self.cfg.extended_regexp,
                    self.cfg.traditional,
                )?;
                self.get_command_suffix(&mut pflags)?;
                if !isglobal {
                    self.buffer.clear_undo_stack();
                }
                self.buffer.copy_lines(r.first, r.second, addr)?;
            }
            b'u' => {
                Self::unexpected_address(&range)?;
                self.get_command_suffix(&mut pflags)?;
                self.buffer.undo(isglobal)?;
            }
            b'w' | b'W' => {
                let n = self.input.peek();
                if n == b'q' || n == b'Q' {
                    self.input.advance(1);
                }
                self.unexpected_command_suffix()?;
                let fnp = self.get_filename(false)?;
                let mut r = range;
                if r.count == 0 && self.buffer.last_addr() == 0 {
                    r.first = 0;
                    r.second = 0;
                } else {
                    let last = self.buffer.last_addr();
                    self.check_addr_range(&mut r, 1, last)?;
                }
                if self.def_filename.is_empty() && !fnp.starts_with('!') {
                    self.def_filename = fnp.clone();
                }
                let name = if fnp.is_empty() { self.def_filename.clone() } else { fnp.clone() };
                let lines = io::write_file(
                    &name,
                    c == b'W',
                    r.first,
                    r.second,
                    &mut self.buffer,
                    self.out.as_mut(),
                    self.cfg.scripted,
                )?;
                if lines == self.buffer.last_addr() && !fnp.starts_with('!') {
                    self.buffer.set_modified(false);
                } else if n == b'q' && self.buffer.is_modified() && !prev_emod {
                    return Err(EdError::BufferModified);
                }
                if n == b'q' || n == b'Q' {
                    return Ok(Status::Quit);
                }
            }
            b'x' => {
                if range.second > self.buffer.last_addr() {
                    return Err(EdError::InvalidAddress);
                }
                self.get_command_suffix(&mut pflags)?;
                if !isglobal {
                    self.buffer.clear_undo_stack();
                }
                self.buffer.put_lines(range.second)?;
            }
            b'y' => {
                let mut r = range;
                self.check_addr_range2(&mut r)?;
                self.get_command_suffix(&mut pflags)?;
                self.buffer.yank_lines(r.first, r.second)?;
            }
            b'z' => {
                let mut r = range;
                let base = self.buffer.current_addr() + usize::from(!isglobal);
                self.check_second_addr(&mut r, base)?;
                if self.input.peek().is_ascii_digit() && self.input.peek() != b'0' {
                    let n = parser::parse_int(&mut self.input)?;
                    signals::set_window_lines(n as usize);
                }
                self.get_command_suffix(&mut pflags)?;
                let to = self
                    .buffer
                    .last_addr()
                    .min(r.second + signals::window_lines() - 1);
                self.print_range(r.second, to, pflags)?;
                pflags = 0;
            }
            b'=' => {
                self.get_command_suffix(&mut pflags)?;
                let addr = if range.count > 0 { range.second } else { self.buffer.last_addr() };
                writeln!(self.out, "{}", addr).map_err(|_| EdError::Io("Cannot write file"))?;
            }
            b'!' => {
                Self::unexpected_address(&range)?;
                let cmd = self.get_shell_command()?;
                Command::new("sh")
                    .arg("-c")
                    .arg(&cmd[1..])
                    .status()
                    .map_err(|_| EdError::CannotCreateShell)?;
                if !self.cfg.scripted {
                    writeln!(self.out, "!").map_err(|_| EdError::Io("Cannot write file"))?;
                }
            }
            b'\n' => {
                let mut r = range;
                let base = self.buffer.current_addr()
                    + usize::from(self.cfg.traditional || !isglobal);
                self.check_second_addr(&mut r, base)?;
                self.print_range(r.second, r.second, 0)?;
            }
            b'#' => {
                while self.input.next_byte() != b'\n' {
                    if self.input.at_end() {
                        break;
                    }
                }
            }
            _ => return Err(EdError::UnknownCommand),
        }
        if pflags != 0 {
            let cur = self.buffer.current_addr();
            self.print_range(cur, cur, pflags)?;
        }
        Ok(Status::Ok)
    }

    /// Apply the command list to every line of the active set. For the
    /// interactive forms each iteration prints the line and reads a
    /// command; `&` repeats the previous one, an empty line skips.
    fn exec_global(&mut self, pflags: u8, interactive: bool) -> Result<Status> {
        let mut cmd: Option<Vec<u8>> = None;

        if !interactive {
            if self.cfg.traditional && self.input.rest() == b"\n" {
                cmd = Some(b"p\n".to_vec()); // null command list defaults to print
            } else {
                self.input.get_extended_line(&mut self.buffer.binary, false)?;
                cmd = Some(self.input.rest().to_vec());
            }
        }
        self.buffer.clear_undo_stack();
        while let Some(lp) = self.buffer.next_active_node() {
            let addr = self.buffer.get_line_node_addr(lp)?;
            self.buffer.set_current_addr(addr);
            if interactive {
                let cur = self.buffer.current_addr();
                self.print_range(cur, cur, pflags)?;
                let len = self.input.get_stdin_line(&mut self.buffer.binary)?;
                if len == 0 {
                    return Err(EdError::UnexpectedEof);
                }
                if len == 1 && self.input.rest() == b"\n" {
                    continue;
                }
                if len == 2 && self.input.rest() == b"&\n" {
                    if cmd.is_none() {
                        return Err(EdError::NoPreviousCommand);
                    }
                } else {
                    self.input.get_extended_line(&mut self.buffer.binary, false)?;
                    cmd = Some(self.input.rest().to_vec());
                }
            }
            self.input.set_line(cmd.clone().expect("command list present"));
            while !self.input.at_end() {
                let status = self.exec_command(false, true)?;
                if status != Status::Ok {
                    return Ok(status);
                }
            }
        }
        Ok(Status::Ok)
    }

    /// Save the buffer to `ed.hup` (cwd, else `$HOME`) after a hang-up.
    /// Never returns.
    fn handle_hangup(&mut self) -> ! {
        if self.buffer.last_addr() == 0 || !self.buffer.is_modified() {
            std::process::exit(0);
        }
        let last = self.buffer.last_addr();
        if io::write_file(
            "ed.hup",
            false,
            1,
            last,
            &mut self.buffer,
            self.out.as_mut(),
            true,
        )
        .is_ok()
        {
            std::process::exit(0);
        }
        let Some(home) = dirs::home_dir() else {
            std::process::exit(1);
        };
        let hup = home.join("ed.hup");
        let ok = io::write_file(
            &hup.to_string_lossy(),
            false,
            1,
            last,
            &mut self.buffer,
            self.out.as_mut(),
            true,
        )
        .is_ok();
        std::process::exit(if ok { 0 } else { 1 });
    }

    fn script_error(&mut self) {
        if self.verbose {
            eprintln!("script, line {}: {}", self.input.linenum(), self.errmsg);
        }
    }

    /// Read and execute commands until quit or end of input. Returns the
    /// process exit status.
    pub fn main_loop(&mut self, initial_error: bool) -> i32 {
        let mut err_status: i32 = if initial_error { 1 } else { 0 };
        let mut was_error = initial_error;
        let mut prev_emod = false;

        loop {
            if signals::take_hangup() {
                self.handle_hangup();
            }
            signals::update_window_size();
            let _ = self.out.flush();
            if was_error && self.verbose {
                let _ = writeln!(self.out, "{}", self.errmsg);
                let _ = self.out.flush();
            }
            if self.prompt_on {
                let _ = write!(self.out, "{}", self.prompt_str);
                let _ = self.out.flush();
            }
            let len = match self.input.get_stdin_line(&mut self.buffer.binary) {
                Ok(len) => len,
                Err(EdError::Interrupt) => {
                    let _ = write!(self.out, "\n?\n");
                    self.errmsg = EdError::Interrupt.to_string();
                    was_error = true;
                    prev_emod = false;
                    continue;
                }
                Err(_) => return 2,
            };
            if signals::take_hangup() {
                self.handle_hangup();
            }
            let status: Result<Status> = if len == 0 {
                // EOF on stdin behaves as 'q'
                if !self.buffer.is_modified() || prev_emod {
                    Ok(Status::Quit)
                } else {
                    if !self.cfg.loose_exit_status {
                        err_status = 2;
                    }
                    Err(EdError::BufferModified)
                }
            } else {
                self.exec_command(prev_emod, false)
            };
            match status {
                Ok(Status::Ok) => {
                    was_error = false;
                    prev_emod = false;
                }
                Ok(Status::Quit) => return err_status,
                Err(EdError::Interrupt) => {
                    let _ = write!(self.out, "\n?\n");
                    self.errmsg = EdError::Interrupt.to_string();
                    was_error = true;
                    prev_emod = false;
                }
                Err(e) => {
                    was_error = true;
                    self.record_error(&e);
                    prev_emod = e == EdError::BufferModified;
                    let _ = write!(self.out, "?\n"); // give warning
                    if !self.cfg.loose_exit_status && err_status == 0 {
                        err_status = 1;
                    }
                    if self.cfg.stdin_is_regular {
                        self.script_error();
                        return if e.is_fatal() { 1 } else { err_status };
                    }
                    if e.is_fatal() {
                        if self.verbose {
                            let _ = writeln!(self.out, "{}", self.errmsg);
                        }
                        return 1;
                    }
                }
            }
        }
    }
}

//! I/O: command input, file and pipe streams, and line printing.
//!
//! `Input` owns the command buffer and its cursor. Commands, patterns and
//! filenames are parsed by advancing the cursor; reading a fresh stdin line
//! replaces the buffer, which is exactly what the global engine exploits to
//! re-enter the dispatcher over a saved command list.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::process::{Child, Command, Stdio};

use crate::buffer::LineBuffer;
use crate::error::{EdError, Result};
use crate::highlight;
use crate::signals::{self, InterruptGuard};

/// Print suffix flags.
pub const PF_L: u8 = 0x01; // list after command
pub const PF_N: u8 = 0x02; // enumerate after command
pub const PF_P: u8 = 0x04; // print after command

/// Reads file descriptor 0 one byte at a time, bypassing libstd's stdin
/// buffering: shell escapes spawned mid-session share the descriptor and
/// must see every byte the editor has not consumed.
pub struct RawStdin;

impl Read for RawStdin {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = unsafe { libc::read(0, buf.as_mut_ptr() as *mut libc::c_void, 1) };
        if n < 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }
}

pub struct Input {
    src: Box<dyn Read>,
    line: Vec<u8>,
    pos: usize,
    linenum: usize,
    scripted: bool,
}

impl Input {
    pub fn new(src: Box<dyn Read>, scripted: bool) -> Self {
        Input { src, line: Vec::new(), pos: 0, linenum: 0, scripted }
    }

    /// Script line number of the last line read.
    pub fn linenum(&self) -> usize {
        self.linenum
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.line.len()
    }

    /// Byte at the cursor; 0 past the end of the buffer.
    pub fn peek(&self) -> u8 {
        self.peek_at(0)
    }

    pub fn peek_at(&self, off: usize) -> u8 {
        *self.line.get(self.pos + off).unwrap_or(&0)
    }

    /// Consume and return the byte at the cursor; 0 past the end.
    pub fn next_byte(&mut self) -> u8 {
        let c = self.peek();
        if !self.at_end() {
            self.pos += 1;
        }
        c
    }

    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.line.len());
    }

    /// Unparsed remainder of the command buffer.
    pub fn rest(&self) -> &[u8] {
        &self.line[self.pos.min(self.line.len())..]
    }

    /// Length of the current line through its newline, from the cursor.
    pub fn current_line_len(&self) -> usize {
        match self.rest().iter().position(|&c| c == b'\n') {
            Some(p) => p + 1,
            None => self.rest().len(),
        }
    }

    pub fn skip_blanks(&mut self) {
        while self.peek().is_ascii_whitespace() && self.peek() != b'\n' {
            self.pos += 1;
        }
    }

    pub fn skip_newlines(&mut self) {
        while self.peek() == b'\n' {
            self.pos += 1;
        }
    }

    /// Replace the command buffer (the global engine re-runs saved lists).
    pub fn set_line(&mut self, line: Vec<u8>) {
        self.line = line;
        self.pos = 0;
    }

    /// Read one line from the input source into the command buffer.
    ///
    /// Returns the size including the trailing newline, or 0 at end of
    /// input (an incomplete final line is discarded but counted). NUL bytes
    /// mark the buffer binary.
    pub fn get_stdin_line(&mut self, binary: &mut bool) -> Result<usize> {
        let mut i = 0;
        self.line.clear();
        self.pos = 0;
        loop {
            let mut byte = [0u8; 1];
            match self.src.read(&mut byte) {
                Ok(0) => {
                    if i > 0 {
                        self.linenum += 1; // discard incomplete line
                    }
                    self.line.clear();
                    return Ok(0);
                }
                Ok(_) => {
                    let c = byte[0];
                    signals::ensure_buffer(&mut self.line, i + 2)?;
                    self.line.push(c);
                    if c == 0 {
                        *binary = true;
                    }
                    if c == b'\n' {
                        self.linenum += 1;
                        return Ok(i + 1);
                    }
                    i += 1;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    signals::check_interrupt()?;
                    if signals::take_hangup() {
                        // treated as end of input; the command loop saves
                        // the buffer and exits
                        self.line.clear();
                        return Ok(0);
                    }
                }
                Err(e) => {
                    show_strerror(Some("stdin"), &e, self.scripted);
                    self.line.clear();
                    return Err(EdError::Io("Cannot read stdin"));
                }
            }
        }
    }

    /// If the remainder of the buffer ends in an escaped newline, keep
    /// reading lines and joining them (the escaping backslashes are
    /// stripped; the newlines too when `strip_escaped_newlines`).
    pub fn get_extended_line(
        &mut self,
        binary: &mut bool,
        strip_escaped_newlines: bool,
    ) -> Result<usize> {
        let mut len = self.current_line_len();
        if len < 2 || !trailing_escape(&self.rest()[..len - 1]) {
            return Ok(len);
        }
        let mut buf: Vec<u8> = self.rest()[..len].to_vec();
        len -= 1;
        buf[len - 1] = b'\n'; // strip trailing escape
        buf.truncate(len);
        if strip_escaped_newlines {
            len -= 1;
            buf.truncate(len);
        }
        loop {
            let len2 = self.get_stdin_line(binary)?;
            if len2 == 0 {
                return Err(EdError::UnexpectedEof);
            }
            buf.extend_from_slice(&self.line[..len2]);
            len += len2;
            if len2 < 2 || !trailing_escape(&buf[..len - 1]) {
                break;
            }
            len -= 1;
            buf[len - 1] = b'\n';
            buf.truncate(len);
            if strip_escaped_newlines {
                len -= 1;
                buf.truncate(len);
            }
        }
        self.line = buf;
        self.pos = 0;
        Ok(len)
    }
}

/// Parity of the backslashes ending a string.
fn trailing_escape(s: &[u8]) -> bool {
    let mut odd = false;
    for &c in s.iter().rev() {
        if c != b'\\' {
            break;
        }
        odd = !odd;
    }
    odd
}

/// Report the OS-level cause of an I/O failure on stderr.
pub fn show_strerror(filename: Option<&str>, err: &std::io::Error, scripted: bool) {
    if !scripted {
        match filename {
            Some(name) if !name.is_empty() => eprintln!("{}: {}", name, err),
            _ => eprintln!("{}", err),
        }
    }
}

/// Strip escapes: each backslash is dropped and the following character
/// kept literally.
pub fn strip_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(d) = chars.next() {
                out.push(d);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn write_out(out: &mut dyn Write, bytes: &[u8]) -> Result<()> {
    out.write_all(bytes).map_err(|_| EdError::Io("Cannot write file"))
}

/// Render one line to `out` honoring the print flags.
fn print_line(
    text: &[u8],
    addr: usize,
    pflags: u8,
    out: &mut dyn Write,
    lang: Option<&str>,
    traditional: bool,
) -> Result<()> {
    const ESCAPES: &[u8] = b"\x07\x08\x0c\n\r\t\x0b";
    const ESCCHARS: &[u8] = b"abfnrtv";

    let styled = highlight::highlight(text, lang);
    let mut col = 0usize;

    if pflags & PF_N != 0 {
        write_out(out, format!("{}\t", addr).as_bytes())?;
        col = 8;
    }
    for &ch in styled.as_ref() {
        if pflags & PF_L == 0 {
            write_out(out, &[ch])?;
            continue;
        }
        col += 1;
        if col > signals::window_columns() {
            col = 1;
            write_out(out, b"\\\n")?;
        }
        if (32..=126).contains(&ch) {
            if ch == b'$' || ch == b'\\' {
                col += 1;
                write_out(out, b"\\")?;
            }
            write_out(out, &[ch])?;
        } else {
            col += 1;
            write_out(out, b"\\")?;
            match ESCAPES.iter().position(|&e| e == ch) {
                Some(i) if ch != 0 => write_out(out, &[ESCCHARS[i]])?,
                _ => {
                    col += 2;
                    let octal = [
                        ((ch >> 6) & 7) + b'0',
                        ((ch >> 3) & 7) + b'0',
                        (ch & 7) + b'0',
                    ];
                    write_out(out, &octal)?;
                }
            }
        }
    }
    if !traditional && pflags & PF_L != 0 {
        write_out(out, b"$")?;
    }
    write_out(out, b"\n")
}

/// Print a range of lines, leaving `current` on the last one printed.
pub fn print_lines(
    buf: &mut LineBuffer,
    out: &mut dyn Write,
    mut from: usize,
    to: usize,
    pflags: u8,
    lang: Option<&str>,
    traditional: bool,
) -> Result<()> {
    if from == 0 {
        return Err(EdError::InvalidAddress);
    }
    let ep = buf.search_line_node(buf.inc_addr(to));
    let mut bp = buf.search_line_node(from);
    while bp != ep {
        let s = buf.get_sbuf_line(bp)?;
        buf.set_current_addr(from);
        print_line(&s, from, pflags, out, lang, traditional)?;
        from += 1;
        bp = buf.next_of(bp);
    }
    Ok(())
}

struct StreamLine {
    size: usize,
    nl_index: usize,
}

/// Read one line from a stream into `line`, stripping a CR before the
/// newline when asked, marking the buffer binary on NUL bytes, and
/// synthesizing a newline at end of stream.
///
/// Returns `None` at end of stream with nothing read. Mirrors the size
/// accounting of the byte counter: a synthesized newline counts except on
/// a binary read.
fn read_stream_line(
    r: &mut dyn BufRead,
    line: &mut Vec<u8>,
    buf: &mut LineBuffer,
    filename: &str,
    strip_cr: bool,
    scripted: bool,
    newline_added: &mut bool,
) -> Result<Option<StreamLine>> {
    line.clear();
    let n = match r.read_until(b'\n', line) {
        Ok(n) => n,
        Err(e) => {
            show_strerror(Some(filename), &e, scripted);
            return Err(EdError::Io("Cannot read input file"));
        }
    };
    if n == 0 {
        return Ok(None);
    }
    if line.contains(&0) {
        buf.set_binary();
    }
    let mut size = line.len();
    if line.last() == Some(&b'\n') {
        // remove CR only from CR/LF pairs
        if strip_cr && size > 1 && line[size - 2] == b'\r' {
            line.truncate(size - 2);
            line.push(b'\n');
            size -= 1;
        }
    } else {
        *newline_added = true;
        line.push(b'\n');
        if buf.is_binary() {
            size = line.len() - 1;
        } else {
            size = line.len();
        }
    }
    let nl_index = line.iter().position(|&c| c == b'\n').expect("line is newline terminated");
    Ok(Some(StreamLine { size, nl_index }))
}

/// Read a stream into the buffer after `addr`; returns the byte count.
fn read_stream(
    r: &mut dyn BufRead,
    addr: usize,
    buf: &mut LineBuffer,
    out: &mut dyn Write,
    filename: &str,
    strip_cr: bool,
    scripted: bool,
) -> Result<u64> {
    let mut up: Option<usize> = None;
    let mut total_size: u64 = 0;
    let o_isbinary = buf.is_binary();
    let appended = addr == buf.last_addr();
    let o_unterminated = buf.unterminated_last_line();
    let mut newline_added = false;
    let mut line: Vec<u8> = Vec::new();

    buf.set_current_addr(addr);
    loop {
        let sl = match read_stream_line(
            r,
            &mut line,
            buf,
            filename,
            strip_cr,
            scripted,
            &mut newline_added,
        )? {
            Some(sl) => sl,
            None => break,
        };
        total_size += sl.size as u64;
        let _guard = InterruptGuard::new();
        buf.put_sbuf_line(&line[..sl.nl_index])?;
        match up {
            Some(i) => {
                let tail = buf.search_line_node(buf.current_addr());
                buf.set_undo_tail(i, tail);
            }
            None => {
                let cur = buf.current_addr();
                up = Some(buf.push_undo_atom(crate::undo::UndoTag::Add, cur, cur)?);
            }
        }
    }
    if addr > 0 && appended && total_size > 0 && o_unterminated {
        write_out(out, b"Newline inserted\n")?; // before stream
    } else if newline_added && (!appended || !buf.is_binary()) {
        write_out(out, b"Newline appended\n")?; // after stream
    }
    if !appended && buf.is_binary() && !o_isbinary && newline_added {
        total_size += 1;
    }
    if appended && buf.is_binary() && (newline_added || total_size == 0) {
        buf.remember_unterminated_last_line();
    }
    Ok(total_size)
}

fn spawn_shell(cmd: &str, stdin: Stdio, stdout: Stdio) -> std::io::Result<Child> {
    Command::new("sh").arg("-c").arg(cmd).stdin(stdin).stdout(stdout).spawn()
}

/// Read a named file, or the stdout of a `!command`, into the buffer after
/// `addr`. Returns the number of lines read.
pub fn read_file(
    filename: &str,
    addr: usize,
    buf: &mut LineBuffer,
    out: &mut dyn Write,
    strip_cr: bool,
    scripted: bool,
) -> Result<usize> {
    let size;
    if let Some(cmd) = filename.strip_prefix('!') {
        let mut child = spawn_shell(cmd, Stdio::inherit(), Stdio::piped()).map_err(|e| {
            show_strerror(Some(filename), &e, scripted);
            EdError::Io("Cannot open input file")
        })?;
        let stdout = child.stdout.take().expect("stdout is piped");
        let mut r = BufReader::new(stdout);
        size = read_stream(&mut r, addr, buf, out, filename, strip_cr, scripted)?;
        drop(r);
        let status = child.wait().map_err(|e| {
            show_strerror(Some(filename), &e, scripted);
            EdError::Io("Cannot close input file")
        })?;
        if !status.success() {
            return Err(EdError::Io("Cannot close input file"));
        }
    } else {
        let stripped = strip_escapes(filename);
        let f = File::open(&stripped).map_err(|e| {
            show_strerror(Some(filename), &e, scripted);
            EdError::Io("Cannot open input file")
        })?;
        let mut r = BufReader::new(f);
        size = read_stream(&mut r, addr, buf, out, filename, strip_cr, scripted)?;
    }
    if !scripted {
        write_out(out, format!("{}\n", size).as_bytes())?;
    }
    Ok(buf.current_addr() - addr)
}

/// Write the range to a stream. The unterminated last line of a binary
/// buffer is written without a trailing newline.
fn write_stream(
    w: &mut dyn Write,
    mut from: usize,
    to: usize,
    buf: &mut LineBuffer,
    filename: &str,
    scripted: bool,
) -> Result<u64> {
    let mut lp = buf.search_line_node(from);
    let mut size: u64 = 0;

    while from != 0 && from <= to {
        let mut p = buf.get_sbuf_line(lp)?;
        if from != buf.last_addr() || !buf.is_binary() || !buf.unterminated_last_line() {
            p.push(b'\n');
        }
        size += p.len() as u64;
        if let Err(e) = w.write_all(&p) {
            show_strerror(Some(filename), &e, scripted);
            return Err(EdError::Io("Cannot write file"));
        }
        from += 1;
        lp = buf.next_of(lp);
    }
    Ok(size)
}

/// Write a range to a named file (truncating or appending), or to the
/// stdin of a `!command`. Returns the number of lines written.
pub fn write_file(
    filename: &str,
    append: bool,
    from: usize,
    to: usize,
    buf: &mut LineBuffer,
    out: &mut dyn Write,
    scripted: bool,
) -> Result<usize> {
    let size;
    if let Some(cmd) = filename.strip_prefix('!') {
        let mut child = spawn_shell(cmd, Stdio::piped(), Stdio::inherit()).map_err(|e| {
            show_strerror(Some(filename), &e, scripted);
            EdError::Io("Cannot open output file")
        })?;
        {
            let mut stdin = child.stdin.take().expect("stdin is piped");
            size = write_stream(&mut stdin, from, to, buf, filename, scripted)?;
        }
        let status = child.wait().map_err(|e| {
            show_strerror(Some(filename), &e, scripted);
            EdError::Io("Cannot close output file")
        })?;
        if !status.success() {
            return Err(EdError::Io("Cannot close output file"));
        }
    } else {
        let stripped = strip_escapes(filename);
        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create(true);
        if append {
            opts.append(true);
        } else {
            opts.truncate(true);
        }
        let mut f = opts.open(&stripped).map_err(|e| {
            show_strerror(Some(filename), &e, scripted);
            EdError::Io("Cannot open output file")
        })?;
        size = write_stream(&mut f, from, to, buf, filename, scripted)?;
        if let Err(e) = f.flush() {
            show_strerror(Some(filename), &e, scripted);
            return Err(EdError::Io("Cannot close output file"));
        }
    }
    if !scripted {
        write_out(out, format!("{}\n", size).as_bytes())?;
    }
    Ok(if from > 0 && from <= to { to - from + 1 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::test_support::{buffer_with_lines, contents};
    use std::io::Cursor;

    fn input_from(s: &str) -> Input {
        let mut input = Input::new(Box::new(Cursor::new(s.as_bytes().to_vec())), true);
        let mut binary = false;
        input.get_stdin_line(&mut binary).unwrap();
        input
    }

    #[test]
    fn test_get_stdin_line_sizes_and_linenum() {
        let mut input = Input::new(Box::new(Cursor::new(b"ab\nc\n".to_vec())), true);
        let mut binary = false;
        assert_eq!(input.get_stdin_line(&mut binary).unwrap(), 3);
        assert_eq!(input.rest(), b"ab\n");
        assert_eq!(input.get_stdin_line(&mut binary).unwrap(), 2);
        assert_eq!(input.get_stdin_line(&mut binary).unwrap(), 0);
        assert_eq!(input.linenum(), 2);
        assert!(!binary);
    }

    #[test]
    fn test_incomplete_last_line_is_discarded_but_counted() {
        let mut input = Input::new(Box::new(Cursor::new(b"partial".to_vec())), true);
        let mut binary = false;
        assert_eq!(input.get_stdin_line(&mut binary).unwrap(), 0);
        assert_eq!(input.linenum(), 1);
    }

    #[test]
    fn test_nul_marks_binary() {
        let mut input = Input::new(Box::new(Cursor::new(b"a\0b\n".to_vec())), true);
        let mut binary = false;
        input.get_stdin_line(&mut binary).unwrap();
        assert!(binary);
    }

    #[test]
    fn test_extended_line_joins_escaped_newlines() {
        let mut input = Input::new(Box::new(Cursor::new(b"w fi\\\nle\n".to_vec())), true);
        let mut binary = false;
        input.get_stdin_line(&mut binary).unwrap();
        input.advance(2); // past "w "
        let len = input.get_extended_line(&mut binary, true).unwrap();
        assert_eq!(&input.rest()[..len], b"file\n");
    }

    #[test]
    fn test_extended_line_keeps_newline_when_not_stripping() {
        let mut input = Input::new(Box::new(Cursor::new(b"s/a/b\\\nc/\n".to_vec())), true);
        let mut binary = false;
        input.get_stdin_line(&mut binary).unwrap();
        let len = input.get_extended_line(&mut binary, false).unwrap();
        assert_eq!(&input.rest()[..len], b"s/a/b\nc/\n");
    }

    #[test]
    fn test_double_backslash_is_not_a_line_escape() {
        let mut input = input_from("w a\\\\\n");
        let mut binary = false;
        input.advance(2);
        let len = input.get_extended_line(&mut binary, true).unwrap();
        assert_eq!(&input.rest()[..len], b"a\\\\\n");
    }

    #[test]
    fn test_strip_escapes() {
        assert_eq!(strip_escapes(r"a\%b"), "a%b");
        assert_eq!(strip_escapes(r"plain"), "plain");
        assert_eq!(strip_escapes(r"\\x"), r"\x");
    }

    #[test]
    fn test_print_lines_plain_and_numbered() {
        let mut buf = buffer_with_lines(&["one", "two"]);
        let mut out: Vec<u8> = Vec::new();
        print_lines(&mut buf, &mut out, 1, 2, 0, None, false).unwrap();
        assert_eq!(out, b"one\ntwo\n");
        assert_eq!(buf.current_addr(), 2);

        let mut out: Vec<u8> = Vec::new();
        print_lines(&mut buf, &mut out, 1, 2, PF_N, None, false).unwrap();
        assert_eq!(out, b"1\tone\n2\ttwo\n");
    }

    #[test]
    fn test_print_list_escapes() {
        let mut buf = buffer_with_lines(&["a\t$\\"]);
        let mut out: Vec<u8> = Vec::new();
        print_lines(&mut buf, &mut out, 1, 1, PF_L, None, false).unwrap();
        assert_eq!(out, b"a\\t\\$\\\\$\n");
    }

    #[test]
    fn test_print_list_octal_for_control_bytes() {
        let mut buf = crate::buffer::LineBuffer::new().unwrap();
        buf.put_sbuf_line(&[1u8, b'x']).unwrap();
        let mut out: Vec<u8> = Vec::new();
        print_lines(&mut buf, &mut out, 1, 1, PF_L, None, false).unwrap();
        assert_eq!(out, b"\\001x$\n");
    }

    #[test]
    fn test_print_address_zero_fails() {
        let mut buf = buffer_with_lines(&["x"]);
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(
            print_lines(&mut buf, &mut out, 0, 1, 0, None, false),
            Err(EdError::InvalidAddress)
        );
    }

    #[test]
    fn test_read_stream_appends_newline_with_notice() {
        let mut buf = buffer_with_lines(&[]);
        let mut out: Vec<u8> = Vec::new();
        let mut r = BufReader::new(Cursor::new(b"one\ntwo".to_vec()));
        let size = read_stream(&mut r, 0, &mut buf, &mut out, "x", false, true).unwrap();
        assert_eq!(size, 8); // synthesized newline counted for text
        assert_eq!(contents(&mut buf), ["one", "two"]);
        assert_eq!(out, b"Newline appended\n");
    }

    #[test]
    fn test_read_stream_strips_cr() {
        let mut buf = buffer_with_lines(&[]);
        let mut out: Vec<u8> = Vec::new();
        let mut r = BufReader::new(Cursor::new(b"a\r\nb\r\n".to_vec()));
        read_stream(&mut r, 0, &mut buf, &mut out, "x", true, true).unwrap();
        assert_eq!(contents(&mut buf), ["a", "b"]);
    }

    #[test]
    fn test_binary_unterminated_round_trip() {
        // binary file without trailing newline: write must not add one
        let mut buf = buffer_with_lines(&[]);
        let mut out: Vec<u8> = Vec::new();
        let data = b"a\0b\nlast".to_vec();
        let mut r = BufReader::new(Cursor::new(data.clone()));
        read_stream(&mut r, 0, &mut buf, &mut out, "x", false, true).unwrap();
        assert!(buf.is_binary());
        let mut written: Vec<u8> = Vec::new();
        write_stream(&mut written, 1, buf.last_addr(), &mut buf, "x", true).unwrap();
        assert_eq!(written, data);
    }

    #[test]
    fn test_write_stream_appends_newlines_for_text() {
        let mut buf = buffer_with_lines(&["one", "two"]);
        let mut written: Vec<u8> = Vec::new();
        let size = write_stream(&mut written, 1, 2, &mut buf, "x", true).unwrap();
        assert_eq!(written, b"one\ntwo\n");
        assert_eq!(size, 8);
    }
}

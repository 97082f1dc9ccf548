//! Regular expression facade: pattern extraction, the cached matcher
//! slots, and the substitution pipeline.
//!
//! Two owning slots are cached: the last search RE (addresses, globals)
//! and the last substitution RE. Compilation always builds a fresh matcher
//! and swaps it in on success, so a failed compile can never tear either
//! cached slot. Empty patterns reuse the search slot.
//!
//! The replacement template is expanded by hand (`&`, `\1`..`\9`, and
//! backslash-dropping for everything else) so that an escaped newline in
//! the template splits the substituted line, exactly as the command
//! language promises.

use std::rc::Rc;

use regex::bytes::{Captures, Regex, RegexBuilder};

use crate::bre;
use crate::buffer::LineBuffer;
use crate::error::{EdError, Result};
use crate::io::Input;
use crate::signals::InterruptGuard;
use crate::undo::UndoTag;

#[derive(Default)]
pub struct RegexPool {
    last_search: Option<Rc<Regex>>,
    last_subst: Option<Rc<Regex>>,
    /// Replacement template of the last substitution (`rbuf`).
    replacement: Option<Vec<u8>>,
}

impl RegexPool {
    /// A substitution RE has been set at some point.
    pub fn subst_regex(&self) -> bool {
        self.last_subst.is_some()
    }

    /// `sr` suffix: reuse the last search RE for substitution.
    pub fn replace_subst_re_by_search_re(&mut self) -> Result<()> {
        let re = self.last_search.clone().ok_or(EdError::NoPreviousPattern)?;
        let _guard = InterruptGuard::new();
        self.last_subst = Some(re);
        Ok(())
    }
}

/// Compile a pattern and make it the last search RE.
fn compile_regex(
    pool: &mut RegexPool,
    pat: &[u8],
    ignore_case: bool,
    extended: bool,
) -> Result<Rc<Regex>> {
    let pat_str = String::from_utf8_lossy(pat);
    let translated = bre::translate(&pat_str, extended)?;
    let re = RegexBuilder::new(&translated)
        .unicode(false)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|e| EdError::Regex(e.to_string()))?;
    let re = Rc::new(re);
    pool.last_search = Some(re.clone());
    Ok(re)
}

/// Expand a POSIX character class while extracting a pattern. The cursor
/// is on the byte after `[`.
fn parse_char_class(input: &mut Input, mut off: usize) -> Result<usize> {
    if input.peek_at(off) == b'^' {
        off += 1;
    }
    if input.peek_at(off) == b']' {
        off += 1;
    }
    while input.peek_at(off) != b']' && input.peek_at(off) != b'\n' && input.peek_at(off) != 0 {
        if input.peek_at(off) == b'[' {
            let d = input.peek_at(off + 1);
            if d == b'.' || d == b':' || d == b'=' {
                off += 2;
                let mut c = input.peek_at(off);
                loop {
                    let b = input.peek_at(off);
                    if b == b'\n' || b == 0 {
                        return Err(EdError::UnbalancedBrackets);
                    }
                    if b == b']' && c == d {
                        break;
                    }
                    c = b;
                    off += 1;
                }
            }
        }
        off += 1;
    }
    if input.peek_at(off) == b']' {
        Ok(off)
    } else {
        Err(EdError::UnbalancedBrackets)
    }
}

/// Copy a pattern from the command buffer, leaving the cursor on the
/// closing delimiter or the newline.
fn extract_pattern(input: &mut Input, delimiter: u8) -> Result<Vec<u8>> {
    let mut off = 0usize;
    loop {
        let c = input.peek_at(off);
        if c == delimiter || c == b'\n' || c == 0 {
            break;
        }
        match c {
            b'[' => {
                off = parse_char_class(input, off + 1)?;
            }
            b'\\' => {
                off += 1;
                if input.peek_at(off) == b'\n' {
                    return Err(EdError::TrailingBackslash);
                }
            }
            _ => {}
        }
        off += 1;
    }
    let pat = input.rest()[..off].to_vec();
    input.advance(off);
    Ok(pat)
}

/// Compiled RE from the command buffer, or the previous search RE when the
/// pattern is empty.
pub fn get_compiled_regex(
    input: &mut Input,
    pool: &mut RegexPool,
    extended: bool,
) -> Result<Rc<Regex>> {
    let delimiter = input.peek();
    if delimiter == b' ' || delimiter == b'\n' {
        return Err(EdError::InvalidPatternDelimiter);
    }
    input.advance(1);
    if input.peek() == delimiter || input.peek() == b'\n' {
        // empty RE
        let re = pool.last_search.clone().ok_or(EdError::NoPreviousPattern)?;
        if input.peek() == delimiter {
            input.advance(1);
            if input.peek() == b'I' {
                return Err(EdError::CaseSuffixOnEmptyRegexp);
            }
        }
        Ok(re)
    } else {
        let pat = extract_pattern(input, delimiter)?;
        let mut ignore_case = false;
        if input.peek() == delimiter {
            input.advance(1);
            if input.peek() == b'I' {
                ignore_case = true;
                input.advance(1);
            }
        }
        compile_regex(pool, &pat, ignore_case, extended)
    }
}

/// Extract the pattern of an `s` command (possibly empty), leaving the
/// cursor on the closing delimiter.
pub fn get_pattern_for_s(input: &mut Input, pool: &RegexPool) -> Result<Vec<u8>> {
    let delimiter = input.peek();
    if delimiter == b' ' || delimiter == b'\n' {
        return Err(EdError::InvalidPatternDelimiter);
    }
    input.advance(1);
    if input.peek() == delimiter {
        // empty RE reuses the last search RE
        if pool.last_search.is_none() {
            return Err(EdError::NoPreviousPattern);
        }
        return Ok(Vec::new());
    }
    let pat = extract_pattern(input, delimiter)?;
    if input.peek() != delimiter {
        return Err(EdError::MissingPatternDelimiter);
    }
    Ok(pat)
}

/// Set the substitution RE from an extracted pattern (empty = reuse the
/// search RE).
pub fn set_subst_regex(
    pool: &mut RegexPool,
    pat: &[u8],
    ignore_case: bool,
    extended: bool,
) -> Result<()> {
    if pat.is_empty() && ignore_case {
        return Err(EdError::CaseSuffixOnEmptyRegexp);
    }
    let _guard = InterruptGuard::new();
    let re = if pat.is_empty() {
        pool.last_search.clone().ok_or(EdError::NoPreviousPattern)?
    } else {
        compile_regex(pool, pat, ignore_case, extended)?
    };
    pool.last_subst = Some(re);
    Ok(())
}

/// Address of the next line matching `/pat/` (forward) or `?pat?`
/// (backward), wrapping around the buffer.
pub fn next_matching_node_addr(
    input: &mut Input,
    buffer: &mut LineBuffer,
    pool: &mut RegexPool,
    extended: bool,
) -> Result<usize> {
    let forward = input.peek() == b'/';
    let re = get_compiled_regex(input, pool, extended)?;
    let start = buffer.current_addr();
    let mut addr = start;
    loop {
        addr = if forward { buffer.inc_addr(addr) } else { buffer.dec_addr(addr) };
        if addr != 0 {
            let lp = buffer.search_line_node(addr);
            let s = buffer.get_sbuf_line(lp)?;
            if re.is_match(&s) {
                return Ok(addr);
            }
        }
        if addr == start {
            return Err(EdError::NoMatch);
        }
    }
}

/// Select the lines of `[first, second]` whose text matches (`match_sense`)
/// or does not match the pattern at the cursor.
pub fn build_active_list(
    input: &mut Input,
    buffer: &mut LineBuffer,
    pool: &mut RegexPool,
    first_addr: usize,
    second_addr: usize,
    match_sense: bool,
    extended: bool,
) -> Result<()> {
    let re = get_compiled_regex(input, pool, extended)?;
    buffer.clear_active_list();
    let mut lp = buffer.search_line_node(first_addr);
    for _addr in first_addr..=second_addr {
        let s = buffer.get_sbuf_line(lp)?;
        if re.is_match(&s) == match_sense {
            buffer.set_active_node(lp)?;
        }
        lp = buffer.next_of(lp);
    }
    Ok(())
}

/// Extract the substitution replacement from the command buffer. A lone
/// `%` reuses the previous replacement. Outside global mode, an escaped
/// newline continues the template on the next stdin line.
pub fn extract_replacement(
    input: &mut Input,
    pool: &mut RegexPool,
    isglobal: bool,
    binary: &mut bool,
) -> Result<()> {
    let delimiter = input.peek();
    if delimiter == b'\n' {
        return Err(EdError::MissingPatternDelimiter);
    }
    input.advance(1);
    if input.peek() == b'%'
        && (input.peek_at(1) == delimiter
            || (input.peek_at(1) == b'\n' && (!isglobal || input.peek_at(2) == 0)))
    {
        input.advance(1);
        if pool.replacement.is_none() {
            return Err(EdError::NoPreviousSubstitution);
        }
        return Ok(());
    }
    let mut buf: Vec<u8> = Vec::new();
    while input.peek() != delimiter && !input.at_end() {
        if input.peek() == b'\n' && (!isglobal || input.peek_at(1) == 0) {
            break;
        }
        let c = input.next_byte();
        buf.push(c);
        if c == b'\\' {
            let c2 = input.next_byte();
            buf.push(c2);
            if c2 == b'\n' && !isglobal {
                // the template continues on the next input line
                let size = input.get_stdin_line(binary)?;
                if size == 0 {
                    return Err(EdError::UnexpectedEof);
                }
            }
        }
    }
    let _guard = InterruptGuard::new();
    pool.replacement = Some(buf);
    Ok(())
}

/// Expand the replacement template against one match.
fn expand_template(rbuf: &[u8], txt: &[u8], caps: &Captures, groups: usize, out: &mut Vec<u8>) {
    let m0 = caps.get(0).expect("whole match");
    let mut i = 0;
    while i < rbuf.len() {
        let c = rbuf[i];
        if c == b'&' {
            out.extend_from_slice(&txt[m0.start()..m0.end()]);
        } else if c == b'\\' {
            i += 1;
            match rbuf.get(i) {
                Some(&d @ b'1'..=b'9') if ((d - b'0') as usize) <= groups => {
                    if let Some(g) = caps.get((d - b'0') as usize) {
                        out.extend_from_slice(&txt[g.start()..g.end()]);
                    }
                }
                // the backslash is dropped; the escaped byte stands for
                // itself (this is what lets \<newline> split lines)
                Some(&d) => out.push(d),
                None => out.push(b'\\'),
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
}

/// Produce the new text of one line, all template expansions applied and
/// newline terminated; `None` when nothing matched.
fn line_replace(pool: &RegexPool, txt: &[u8], snum: i64) -> Result<Option<Vec<u8>>> {
    let re = pool.last_subst.as_ref().ok_or(EdError::NoPreviousSubstitution)?;
    let rbuf = pool.replacement.as_deref().unwrap_or(b"");
    let groups = re.captures_len() - 1;
    let global = snum <= 0;

    let Some(mut caps) = re.captures(txt) else {
        return Ok(None);
    };
    let mut out: Vec<u8> = Vec::new();
    let mut cur = 0usize;
    let mut matchno = 0i64;
    let mut changed = false;
    let mut infloop = false;
    loop {
        let m0 = caps.get(0).expect("whole match");
        matchno += 1;
        if global || snum == matchno {
            changed = true;
            out.extend_from_slice(&txt[cur..m0.start()]);
            expand_template(rbuf, txt, &caps, groups, &mut out);
        } else {
            out.extend_from_slice(&txt[cur..m0.end()]);
        }
        let advanced = m0.end() > cur;
        cur = m0.end();
        if global && !advanced {
            // a zero-length match that does not advance is tolerated once
            // ('s/^/#/g' is valid)
            if !infloop {
                infloop = true;
            } else {
                return Err(EdError::InfiniteSubstitutionLoop);
            }
        }
        if cur >= txt.len() || (changed && !global) {
            break;
        }
        match re.captures_at(txt, cur) {
            Some(c) => caps = c,
            None => break,
        }
    }
    if !changed {
        return Ok(None);
    }
    out.extend_from_slice(&txt[cur..]);
    out.push(b'\n');
    Ok(Some(out))
}

/// For each line of the range, replace text matching the substitution RE
/// according to the template. Changed lines are deleted and re-inserted
/// piece by piece so embedded newlines split them.
pub fn search_and_replace(
    buffer: &mut LineBuffer,
    pool: &mut RegexPool,
    first_addr: usize,
    second_addr: usize,
    snum: i64,
    isglobal: bool,
) -> Result<()> {
    let mut addr = first_addr;
    let mut match_found = false;

    for _ in 0..=(second_addr - first_addr) {
        let lp = buffer.search_line_node(addr);
        let txt = buffer.get_sbuf_line(lp)?;
        if let Some(newtext) = line_replace(pool, &txt, snum)? {
            let _guard = InterruptGuard::new();
            buffer.delete_lines(addr, addr, isglobal)?;
            buffer.set_current_addr(addr - 1);
            let mut up: Option<usize> = None;
            for piece in newtext.split_inclusive(|&c| c == b'\n') {
                let text = &piece[..piece.len() - 1]; // drop the newline
                buffer.put_sbuf_line(text)?;
                match up {
                    Some(i) => {
                        let tail = buffer.search_line_node(buffer.current_addr());
                        buffer.set_undo_tail(i, tail);
                    }
                    None => {
                        let cur = buffer.current_addr();
                        up = Some(buffer.push_undo_atom(UndoTag::Add, cur, cur)?);
                    }
                }
            }
            addr = buffer.current_addr();
            match_found = true;
        }
        addr += 1;
    }
    if !match_found && !isglobal {
        return Err(EdError::NoMatch);
    }
    Ok(())
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

    fn subst(pool: &mut RegexPool, pat: &str, rep: &str) {
        set_subst_regex(pool, pat.as_bytes(), false, false).unwrap();
        pool.replacement = Some(rep.as_bytes().to_vec());
    }

    #[test]
    fn test_extract_pattern_stops_at_delimiter() {
        let mut input = input_from("foo/rest\n");
        let pat = extract_pattern(&mut input, b'/').unwrap();
        assert_eq!(pat, b"foo");
        assert_eq!(input.peek(), b'/');
    }

    #[test]
    fn test_extract_pattern_delimiter_inside_class() {
        let mut input = input_from("[/]x/tail\n");
        let pat = extract_pattern(&mut input, b'/').unwrap();
        assert_eq!(pat, b"[/]x");
    }

    #[test]
    fn test_extract_pattern_trailing_backslash() {
        let mut input = input_from("foo\\\n");
        assert_eq!(extract_pattern(&mut input, b'/'), Err(EdError::TrailingBackslash));
    }

    #[test]
    fn test_get_compiled_regex_caches_last_search() {
        let mut pool = RegexPool::default();
        let mut input = input_from("/abc/\n");
        get_compiled_regex(&mut input, &mut pool, false).unwrap();
        // empty pattern reuses the cached RE
        let mut input = input_from("//\n");
        let re = get_compiled_regex(&mut input, &mut pool, false).unwrap();
        assert!(re.is_match(b"xxabcxx"));
    }

    #[test]
    fn test_empty_pattern_without_previous_fails() {
        let mut pool = RegexPool::default();
        let mut input = input_from("//\n");
        assert_eq!(
            get_compiled_regex(&mut input, &mut pool, false).unwrap_err(),
            EdError::NoPreviousPattern
        );
    }

    #[test]
    fn test_bad_delimiters() {
        let mut pool = RegexPool::default();
        let mut input = input_from(" /x/\n");
        assert_eq!(
            get_compiled_regex(&mut input, &mut pool, false).unwrap_err(),
            EdError::InvalidPatternDelimiter
        );
        let mut input = input_from("/a\n");
        // address search accepts a newline terminator; the s command does not
        assert!(get_compiled_regex(&mut input, &mut pool, false).is_ok());
        let mut input = input_from("/a\n");
        assert_eq!(
            get_pattern_for_s(&mut input, &pool).unwrap_err(),
            EdError::MissingPatternDelimiter
        );
    }

    #[test]
    fn test_case_insensitive_suffix() {
        let mut pool = RegexPool::default();
        let mut input = input_from("/abc/I\n");
        let re = get_compiled_regex(&mut input, &mut pool, false).unwrap();
        assert!(re.is_match(b"ABC"));
    }

    #[test]
    fn test_next_matching_wraps_backward() {
        let mut buf = buffer_with_lines(&["alpha", "beta", "gamma"]);
        buf.set_current_addr(1);
        let mut pool = RegexPool::default();
        let mut input = input_from("?beta?\n");
        let addr = next_matching_node_addr(&mut input, &mut buf, &mut pool, false).unwrap();
        assert_eq!(addr, 2);
    }

    #[test]
    fn test_next_matching_no_match() {
        let mut buf = buffer_with_lines(&["alpha"]);
        buf.set_current_addr(1);
        let mut pool = RegexPool::default();
        let mut input = input_from("/zzz/\n");
        assert_eq!(
            next_matching_node_addr(&mut input, &mut buf, &mut pool, false).unwrap_err(),
            EdError::NoMatch
        );
    }

    #[test]
    fn test_substitute_with_backrefs() {
        let mut buf = buffer_with_lines(&["foo bar foo"]);
        buf.clear_undo_stack();
        let mut pool = RegexPool::default();
        subst(&mut pool, r"\(foo\)", r"<\1>");
        search_and_replace(&mut buf, &mut pool, 1, 1, 0, false).unwrap();
        assert_eq!(contents(&mut buf), ["<foo> bar <foo>"]);
        assert!(buf.is_modified());
    }

    #[test]
    fn test_substitute_nth_match() {
        let mut buf = buffer_with_lines(&["x x x"]);
        buf.clear_undo_stack();
        let mut pool = RegexPool::default();
        subst(&mut pool, "x", "y");
        search_and_replace(&mut buf, &mut pool, 1, 1, 2, false).unwrap();
        assert_eq!(contents(&mut buf), ["x y x"]);
    }

    #[test]
    fn test_substitute_ampersand_and_literal_escape() {
        let mut buf = buffer_with_lines(&["ab"]);
        buf.clear_undo_stack();
        let mut pool = RegexPool::default();
        subst(&mut pool, "ab", r"[&]\&");
        search_and_replace(&mut buf, &mut pool, 1, 1, 1, false).unwrap();
        assert_eq!(contents(&mut buf), ["[ab]&"]);
    }

    #[test]
    fn test_substitute_newline_in_template_splits_line() {
        let mut buf = buffer_with_lines(&["one two"]);
        buf.clear_undo_stack();
        let mut pool = RegexPool::default();
        subst(&mut pool, " ", "\\\n");
        search_and_replace(&mut buf, &mut pool, 1, 1, 1, false).unwrap();
        assert_eq!(contents(&mut buf), ["one", "two"]);
        assert_eq!(buf.last_addr(), 2);
    }

    #[test]
    fn test_substitute_no_match_errors() {
        let mut buf = buffer_with_lines(&["abc"]);
        buf.clear_undo_stack();
        let mut pool = RegexPool::default();
        subst(&mut pool, "zzz", "y");
        assert_eq!(
            search_and_replace(&mut buf, &mut pool, 1, 1, 1, false).unwrap_err(),
            EdError::NoMatch
        );
        // inside a global the miss is silent
        search_and_replace(&mut buf, &mut pool, 1, 1, 1, true).unwrap();
    }

    #[test]
    fn test_empty_match_at_start_is_tolerated_once() {
        let mut buf = buffer_with_lines(&["abc"]);
        buf.clear_undo_stack();
        let mut pool = RegexPool::default();
        subst(&mut pool, "^", "# ");
        search_and_replace(&mut buf, &mut pool, 1, 1, 0, false).unwrap();
        assert_eq!(contents(&mut buf), ["# abc"]);
    }

    #[test]
    fn test_repeated_empty_match_is_an_infinite_loop() {
        let mut buf = buffer_with_lines(&["abc"]);
        buf.clear_undo_stack();
        let mut pool = RegexPool::default();
        subst(&mut pool, "x*", "-");
        assert_eq!(
            search_and_replace(&mut buf, &mut pool, 1, 1, 0, false).unwrap_err(),
            EdError::InfiniteSubstitutionLoop
        );
    }

    #[test]
    fn test_extract_replacement_reuse_previous() {
        let mut pool = RegexPool::default();
        let mut binary = false;
        let mut input = input_from("/new/\n");
        extract_replacement(&mut input, &mut pool, false, &mut binary).unwrap();
        assert_eq!(pool.replacement.as_deref(), Some(&b"new"[..]));

        let mut input = input_from("/%/\n");
        extract_replacement(&mut input, &mut pool, false, &mut binary).unwrap();
        assert_eq!(pool.replacement.as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn test_extract_replacement_percent_without_previous() {
        let mut pool = RegexPool::default();
        let mut binary = false;
        let mut input = input_from("/%/\n");
        assert_eq!(
            extract_replacement(&mut input, &mut pool, false, &mut binary).unwrap_err(),
            EdError::NoPreviousSubstitution
        );
    }

    #[test]
    fn test_build_active_list_match_and_inverse() {
        let mut buf = buffer_with_lines(&["cat", "dog", "cow"]);
        let mut pool = RegexPool::default();
        let mut input = input_from("/^c/\n");
        build_active_list(&mut input, &mut buf, &mut pool, 1, 3, true, false).unwrap();
        let mut picked = Vec::new();
        while let Some(lp) = buf.next_active_node() {
            picked.push(buf.get_line_node_addr(lp).unwrap());
        }
        assert_eq!(picked, [1, 3]);

        let mut input = input_from("/^c/\n");
        build_active_list(&mut input, &mut buf, &mut pool, 1, 3, false, false).unwrap();
        let mut picked = Vec::new();
        while let Some(lp) = buf.next_active_node() {
            picked.push(buf.get_line_node_addr(lp).unwrap());
        }
        assert_eq!(picked, [2]);
    }
}

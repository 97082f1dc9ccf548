//! The editor buffer: line records in an arena, linked into two rings.
//!
//! Every line of text lives in the scratch file; a line record is just
//! `(pos, len)` plus its ring links. Records are arena-allocated and
//! addressed by stable `NodeId` handles: the buffer ring (sentinel `BUF_HEAD`)
//! holds the addressable lines 1..=last, the yank ring (sentinel `YANK_HEAD`)
//! holds the most recently cut or copied lines. The yank ring and the undo
//! stack hold duplicated records that share scratch offsets with the
//! originals, so text is never copied by structural commands.
//!
//! A cached `(address, record)` locator makes address lookup cost
//! O(min(Δ, N−Δ)). It is kept valid the same way the structural edits keep
//! `current` valid: each edit finishes its lookups on a record that survives
//! the edit at an unchanged address.

use crate::error::{EdError, Result};
use crate::global_cmd::ActiveList;
use crate::io::Input;
use crate::scratch::ScratchFile;
use crate::signals::{self, InterruptGuard};
use crate::undo::{UndoAtom, UndoSnapshot, UndoTag};

/// Stable handle to a line record.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct NodeId(pub(crate) u32);

/// Sentinel of the buffer ring; also the record "before line 1".
pub(crate) const BUF_HEAD: NodeId = NodeId(0);
/// Sentinel of the yank ring.
pub(crate) const YANK_HEAD: NodeId = NodeId(1);

#[derive(Clone, Copy, Debug)]
struct Node {
    prev: NodeId,
    next: NodeId,
    pos: u64,
    len: usize,
}

pub struct LineBuffer {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    scratch: ScratchFile,
    pub(crate) current: usize,
    pub(crate) last: usize,
    pub(crate) modified: bool,
    pub(crate) binary: bool,
    cache_addr: usize,
    cache_node: NodeId,

    // undo state, operated on in undo.rs
    pub(crate) ustack: Vec<UndoAtom>,
    pub(crate) undo_snapshot: Option<UndoSnapshot>,

    // mark table, operated on in marks.rs
    pub(crate) marks: [Option<NodeId>; 26],
    pub(crate) mark_count: usize,

    // global-command active list, operated on in global_cmd.rs
    pub(crate) active: ActiveList,

    /// Last line of a binary read that arrived without a trailing newline;
    /// writes must not append one to it.
    pub(crate) unterminated: Option<NodeId>,
}

impl LineBuffer {
    pub fn new() -> Result<Self> {
        let scratch = ScratchFile::open()?;
        let sentinel = |id: NodeId| Node { prev: id, next: id, pos: 0, len: 0 };
        Ok(LineBuffer {
            nodes: vec![sentinel(BUF_HEAD), sentinel(YANK_HEAD)],
            free: Vec::new(),
            scratch,
            current: 0,
            last: 0,
            modified: false,
            binary: false,
            cache_addr: 0,
            cache_node: BUF_HEAD,
            ustack: Vec::new(),
            undo_snapshot: None,
            marks: [None; 26],
            mark_count: 0,
            active: ActiveList::default(),
            unterminated: None,
        })
    }

    pub fn current_addr(&self) -> usize {
        self.current
    }

    pub fn set_current_addr(&mut self, addr: usize) {
        self.current = addr;
    }

    pub fn last_addr(&self) -> usize {
        self.last
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn set_binary(&mut self) {
        self.binary = true;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, m: bool) {
        self.modified = m;
    }

    /// Successor address, wrapping past `last` to 0 (the sentinel).
    pub fn inc_addr(&self, addr: usize) -> usize {
        if addr >= self.last {
            0
        } else {
            addr + 1
        }
    }

    /// Predecessor address, wrapping below 0 to `last`.
    pub fn dec_addr(&self, addr: usize) -> usize {
        if addr == 0 {
            self.last
        } else {
            addr - 1
        }
    }

    fn n(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn n_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub(crate) fn next_of(&self, id: NodeId) -> NodeId {
        self.n(id).next
    }

    pub(crate) fn prev_of(&self, id: NodeId) -> NodeId {
        self.n(id).prev
    }

    /// Link `next` directly after `prev`.
    pub(crate) fn link_nodes(&mut self, prev: NodeId, next: NodeId) {
        self.n_mut(prev).next = next;
        self.n_mut(next).prev = prev;
    }

    /// Insert `lp` into a ring after `prev`.
    fn insert_node(&mut self, lp: NodeId, prev: NodeId) {
        let next = self.next_of(prev);
        self.link_nodes(lp, next);
        self.link_nodes(prev, lp);
    }

    fn alloc_node(&mut self, pos: u64, len: usize) -> NodeId {
        let node = Node { prev: BUF_HEAD, next: BUF_HEAD, pos, len };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.0 as usize] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId((self.nodes.len() - 1) as u32)
            }
        }
    }

    pub(crate) fn free_node(&mut self, id: NodeId) {
        self.free.push(id);
    }

    /// To be called before a node is added to the buffer ring.
    fn check_line_limit(&self) -> Result<()> {
        if self.last < i32::MAX as usize - 1 {
            Ok(())
        } else {
            Err(EdError::TooManyLines)
        }
    }

    /// Add a freshly allocated record to the buffer ring after `current`.
    fn add_line_node(&mut self, lp: NodeId) {
        let prev = self.search_line_node(self.current);
        self.insert_node(lp, prev);
        self.current += 1;
        self.last += 1;
    }

    /// Return the record at `addr` using the cached locator.
    pub fn search_line_node(&mut self, addr: usize) -> NodeId {
        let _guard = InterruptGuard::new();
        let mut o_addr = self.cache_addr;
        let mut lp = self.cache_node;
        if o_addr < addr {
            if o_addr + self.last >= 2 * addr {
                while o_addr < addr {
                    o_addr += 1;
                    lp = self.next_of(lp);
                }
            } else {
                lp = self.prev_of(BUF_HEAD);
                o_addr = self.last;
                while o_addr > addr {
                    o_addr -= 1;
                    lp = self.prev_of(lp);
                }
            }
        } else if o_addr <= 2 * addr {
            while o_addr > addr {
                o_addr -= 1;
                lp = self.prev_of(lp);
            }
        } else {
            lp = BUF_HEAD;
            o_addr = 0;
            while o_addr < addr {
                o_addr += 1;
                lp = self.next_of(lp);
            }
        }
        self.cache_addr = o_addr;
        self.cache_node = lp;
        lp
    }

    /// Address of a record in the buffer ring: O(N) forward walk.
    pub fn get_line_node_addr(&self, lp: NodeId) -> Result<usize> {
        let mut p = BUF_HEAD;
        let mut addr = 0;
        while p != lp {
            p = self.next_of(p);
            if p == BUF_HEAD {
                return Err(EdError::InvalidAddress);
            }
            addr += 1;
        }
        Ok(addr)
    }

    /// Text of a line (newline not included).
    pub fn get_sbuf_line(&mut self, lp: NodeId) -> Result<Vec<u8>> {
        let (pos, len) = {
            let nd = self.n(lp);
            (nd.pos, nd.len)
        };
        let mut buf = Vec::new();
        self.scratch.read(pos, len, &mut buf)?;
        Ok(buf)
    }

    /// Write one line of text (no newline) to the scratch file and link a
    /// new record after `current`.
    pub fn put_sbuf_line(&mut self, text: &[u8]) -> Result<()> {
        self.check_line_limit()?;
        let pos = self.scratch.append(text)?;
        let lp = self.alloc_node(pos, text.len());
        self.add_line_node(lp);
        Ok(())
    }

    /// Insert lines read from `input` after `addr`; stop at a single `.` or
    /// end of input. In global mode the lines come from the remainder of the
    /// command list instead of stdin. `insert` shifts the target back one
    /// line so the text lands before `addr`.
    pub fn append_lines(
        &mut self,
        input: &mut Input,
        addr: usize,
        mut insert: bool,
        isglobal: bool,
    ) -> Result<()> {
        let mut up: Option<usize> = None;
        self.current = addr;
        loop {
            let size;
            if !isglobal {
                size = input.get_stdin_line(&mut self.binary)?;
                if size == 0 {
                    return Ok(()); // EOF ends input mode
                }
            } else {
                if input.at_end() {
                    return Ok(());
                }
                size = input.current_line_len();
            }
            if size == 2 && input.rest()[..2] == *b".\n" {
                input.advance(size);
                return Ok(());
            }
            let _guard = InterruptGuard::new();
            if insert {
                insert = false;
                if self.current > 0 {
                    self.current -= 1;
                }
            }
            let text: Vec<u8> = input.rest()[..size - 1].to_vec();
            self.put_sbuf_line(&text)?;
            match up {
                Some(i) => {
                    let tail = self.search_line_node(self.current);
                    self.set_undo_tail(i, tail);
                }
                None => {
                    up = Some(self.push_undo_atom(UndoTag::Add, self.current, self.current)?);
                }
            }
            input.advance(size);
            self.modified = true;
        }
    }

    fn clear_yank_buffer(&mut self) {
        let _guard = InterruptGuard::new();
        let mut lp = self.next_of(YANK_HEAD);
        while lp != YANK_HEAD {
            let p = self.next_of(lp);
            let (prev, next) = (self.prev_of(lp), self.next_of(lp));
            self.link_nodes(prev, next);
            self.free_node(lp);
            lp = p;
        }
    }

    /// Copy a range of lines into the yank ring (text is shared, records
    /// are duplicated).
    pub fn yank_lines(&mut self, from: usize, to: usize) -> Result<()> {
        let ep = self.search_line_node(self.inc_addr(to));
        let mut bp = self.search_line_node(from);
        self.clear_yank_buffer();
        let mut lp = YANK_HEAD;
        while bp != ep {
            let _guard = InterruptGuard::new();
            let (pos, len) = {
                let nd = self.n(bp);
                (nd.pos, nd.len)
            };
            let p = self.alloc_node(pos, len);
            self.insert_node(p, lp);
            bp = self.next_of(bp);
            lp = p;
        }
        Ok(())
    }

    /// Append duplicates of the yank ring after `addr`.
    pub fn put_lines(&mut self, addr: usize) -> Result<()> {
        let mut up: Option<usize> = None;
        let mut lp = self.next_of(YANK_HEAD);
        if lp == YANK_HEAD {
            return Err(EdError::NothingToPut);
        }
        self.current = addr;
        while lp != YANK_HEAD {
            self.check_line_limit()?;
            let _guard = InterruptGuard::new();
            let (pos, len) = {
                let nd = self.n(lp);
                (nd.pos, nd.len)
            };
            let p = self.alloc_node(pos, len);
            self.add_line_node(p);
            match up {
                Some(i) => self.set_undo_tail(i, p),
                None => {
                    up = Some(self.push_undo_atom(UndoTag::Add, self.current, self.current)?);
                }
            }
            self.modified = true;
            lp = self.next_of(lp);
        }
        Ok(())
    }

    /// Delete a range of lines. The records are yanked first and retained
    /// unlinked; the undo stack owns them until the next frame opens.
    pub fn delete_lines(&mut self, from: usize, to: usize, isglobal: bool) -> Result<()> {
        self.yank_lines(from, to)?;
        let _guard = InterruptGuard::new();
        self.push_undo_atom(UndoTag::Del, from, to)?;
        let n = self.search_line_node(self.inc_addr(to));
        let p = self.search_line_node(from - 1); // this lookup last: the locator must end on a surviving record
        if isglobal {
            let bp = self.next_of(p);
            self.unset_active_nodes(bp, n);
        }
        self.link_nodes(p, n);
        self.last -= to + 1 - from; // zero for the degenerate (1, 0) range of an empty buffer
        self.current = from.min(self.last);
        self.modified = true;
        Ok(())
    }

    /// Duplicate a range after `addr`. When the destination lies inside the
    /// source range the copy runs in two passes so the fresh duplicates are
    /// not themselves copied.
    pub fn copy_lines(&mut self, first_addr: usize, second_addr: usize, addr: usize) -> Result<()> {
        let mut np = self.search_line_node(first_addr);
        let mut up: Option<usize> = None;
        let mut n = second_addr - first_addr + 1;
        let mut m = 0;

        self.current = addr;
        if addr >= first_addr && addr < second_addr {
            n = addr - first_addr + 1;
            m = second_addr - addr;
        }
        while n > 0 {
            for _ in 0..n {
                self.check_line_limit()?;
                let _guard = InterruptGuard::new();
                let (pos, len) = {
                    let nd = self.n(np);
                    (nd.pos, nd.len)
                };
                let lp = self.alloc_node(pos, len);
                self.add_line_node(lp);
                match up {
                    Some(i) => self.set_undo_tail(i, lp),
                    None => {
                        up = Some(self.push_undo_atom(UndoTag::Add, self.current, self.current)?);
                    }
                }
                self.modified = true;
                np = self.next_of(np);
            }
            n = m;
            m = 0;
            if n > 0 {
                np = self.search_line_node(self.current + 1);
            }
        }
        Ok(())
    }

    /// Move a range to after `addr`. Moving to `first−1` or `second` leaves
    /// the ring untouched but still repositions `current`.
    pub fn move_lines(
        &mut self,
        first_addr: usize,
        second_addr: usize,
        addr: usize,
        isglobal: bool,
    ) -> Result<()> {
        let n_addr = self.inc_addr(second_addr);
        let p_addr = first_addr - 1;

        let _guard = InterruptGuard::new();
        let b2;
        let a2;
        if addr == first_addr - 1 || addr == second_addr {
            a2 = self.search_line_node(n_addr);
            b2 = self.search_line_node(p_addr);
            self.current = second_addr;
        } else {
            self.push_undo_atom(UndoTag::Mov, p_addr, n_addr)?;
            let addr_next = self.inc_addr(addr);
            self.push_undo_atom(UndoTag::Mov, addr, addr_next)?;
            let a1 = self.search_line_node(n_addr);
            let b1;
            if addr < first_addr {
                b1 = self.search_line_node(p_addr);
                b2 = self.search_line_node(addr); // this lookup last
            } else {
                b2 = self.search_line_node(addr);
                b1 = self.search_line_node(p_addr); // this lookup last
            }
            a2 = self.next_of(b2);
            let t = self.next_of(b1);
            self.link_nodes(b2, t);
            let t = self.prev_of(a1);
            self.link_nodes(t, a2);
            self.link_nodes(b1, a1);
            self.current = addr
                + if addr < first_addr {
                    second_addr - first_addr + 1
                } else {
                    0
                };
        }
        if isglobal {
            let bp = self.next_of(b2);
            self.unset_active_nodes(bp, a2);
        }
        self.modified = true;
        Ok(())
    }

    /// Replace a range of lines with their concatenated text.
    pub fn join_lines(&mut self, from: usize, to: usize, isglobal: bool) -> Result<()> {
        let ep = self.search_line_node(self.inc_addr(to));
        let mut bp = self.search_line_node(from);
        let mut buf: Vec<u8> = Vec::new();

        while bp != ep {
            let s = self.get_sbuf_line(bp)?;
            let new_len = buf.len() + s.len();
            signals::ensure_buffer(&mut buf, new_len)?;
            buf.extend_from_slice(&s);
            bp = self.next_of(bp);
        }
        self.delete_lines(from, to, isglobal)?;
        self.current = from - 1;
        let _guard = InterruptGuard::new();
        self.put_sbuf_line(&buf)?;
        self.push_undo_atom(UndoTag::Add, self.current, self.current)?;
        self.modified = true;
        Ok(())
    }

    pub(crate) fn unmark_unterminated_line(&mut self, lp: NodeId) {
        if self.unterminated == Some(lp) {
            self.unterminated = None;
        }
    }

    pub(crate) fn reset_unterminated_line(&mut self) {
        self.unterminated = None;
    }

    /// True when the remembered unterminated record is still the last line.
    pub(crate) fn unterminated_last_line(&mut self) -> bool {
        match self.unterminated {
            Some(lp) => {
                let last = self.last;
                lp == self.search_line_node(last)
            }
            None => false,
        }
    }

    pub(crate) fn remember_unterminated_last_line(&mut self) {
        let last = self.last;
        self.unterminated = Some(self.search_line_node(last));
    }

    /// Discard every session resource tied to the scratch file: the yank
    /// ring, the undo stack (freeing the records it owns), and the file
    /// itself is replaced by `open_scratch`.
    pub fn close_scratch(&mut self) {
        self.clear_yank_buffer();
        self.clear_undo_stack();
    }

    /// Open a fresh scratch file (the `e` command starts a new session).
    pub fn open_scratch(&mut self) -> Result<()> {
        self.binary = false;
        self.reset_unterminated_line();
        self.scratch.reopen()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a buffer preloaded with the given lines.
    pub fn buffer_with_lines(lines: &[&str]) -> LineBuffer {
        let mut buf = LineBuffer::new().unwrap();
        for line in lines {
            buf.put_sbuf_line(line.as_bytes()).unwrap();
        }
        buf.set_modified(false);
        buf
    }

    /// Collect the buffer contents as strings, in address order.
    pub fn contents(buf: &mut LineBuffer) -> Vec<String> {
        let mut out = Vec::new();
        for addr in 1..=buf.last_addr() {
            let lp = buf.search_line_node(addr);
            out.push(String::from_utf8(buf.get_sbuf_line(lp).unwrap()).unwrap());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{buffer_with_lines, contents};
    use super::*;

    #[test]
    fn test_put_sbuf_line_links_in_order() {
        let mut buf = buffer_with_lines(&["alpha", "beta", "gamma"]);
        assert_eq!(buf.last_addr(), 3);
        assert_eq!(buf.current_addr(), 3);
        assert_eq!(contents(&mut buf), ["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_locator_is_stable_across_queries() {
        let mut buf = buffer_with_lines(&["a", "b", "c", "d", "e"]);
        let n3 = buf.search_line_node(3);
        let _ = buf.search_line_node(1);
        let _ = buf.search_line_node(5);
        assert_eq!(buf.search_line_node(3), n3);
        assert_eq!(buf.get_line_node_addr(n3).unwrap(), 3);
    }

    #[test]
    fn test_addr_arithmetic_wraps() {
        let buf = buffer_with_lines(&["a", "b", "c"]);
        assert_eq!(buf.inc_addr(3), 0);
        assert_eq!(buf.inc_addr(2), 3);
        assert_eq!(buf.dec_addr(0), 3);
        assert_eq!(buf.dec_addr(1), 0);
    }

    #[test]
    fn test_delete_relinks_and_tracks_current() {
        let mut buf = buffer_with_lines(&["a", "b", "c", "d", "e"]);
        buf.clear_undo_stack();
        buf.delete_lines(2, 4, false).unwrap();
        assert_eq!(contents(&mut buf), ["a", "e"]);
        assert_eq!(buf.last_addr(), 2);
        assert_eq!(buf.current_addr(), 2);
        assert!(buf.is_modified());
    }

    #[test]
    fn test_delete_whole_buffer() {
        let mut buf = buffer_with_lines(&["only"]);
        buf.clear_undo_stack();
        buf.delete_lines(1, 1, false).unwrap();
        assert_eq!(buf.last_addr(), 0);
        assert_eq!(buf.current_addr(), 0);
    }

    #[test]
    fn test_copy_simple() {
        let mut buf = buffer_with_lines(&["a", "b", "c"]);
        buf.clear_undo_stack();
        buf.copy_lines(1, 2, 3).unwrap();
        assert_eq!(contents(&mut buf), ["a", "b", "c", "a", "b"]);
        assert_eq!(buf.current_addr(), 5);
    }

    #[test]
    fn test_copy_destination_inside_range_splits() {
        // t with dest inside [first, second) must not duplicate the fresh
        // copies
        let mut buf = buffer_with_lines(&["a", "b", "c", "d"]);
        buf.clear_undo_stack();
        buf.copy_lines(1, 3, 2).unwrap();
        assert_eq!(contents(&mut buf), ["a", "b", "a", "b", "c", "c", "d"]);
    }

    #[test]
    fn test_copy_to_address_zero() {
        let mut buf = buffer_with_lines(&["a", "b"]);
        buf.clear_undo_stack();
        buf.copy_lines(2, 2, 0).unwrap();
        assert_eq!(contents(&mut buf), ["b", "a", "b"]);
    }

    #[test]
    fn test_move_forward_and_backward() {
        let mut buf = buffer_with_lines(&["a", "b", "c", "d", "e"]);
        buf.clear_undo_stack();
        buf.move_lines(1, 2, 4, false).unwrap();
        assert_eq!(contents(&mut buf), ["c", "d", "a", "b", "e"]);
        assert_eq!(buf.current_addr(), 4);

        let mut buf = buffer_with_lines(&["a", "b", "c", "d", "e"]);
        buf.clear_undo_stack();
        buf.move_lines(4, 5, 1, false).unwrap();
        assert_eq!(contents(&mut buf), ["a", "d", "e", "b", "c"]);
        assert_eq!(buf.current_addr(), 3);
    }

    #[test]
    fn test_move_noop_sets_current_to_second() {
        let mut buf = buffer_with_lines(&["a", "b", "c"]);
        buf.clear_undo_stack();
        buf.move_lines(2, 3, 3, false).unwrap();
        assert_eq!(contents(&mut buf), ["a", "b", "c"]);
        assert_eq!(buf.current_addr(), 3);
        buf.move_lines(2, 3, 1, false).unwrap();
        assert_eq!(contents(&mut buf), ["a", "b", "c"]);
        assert_eq!(buf.current_addr(), 3);
    }

    #[test]
    fn test_join_concatenates() {
        let mut buf = buffer_with_lines(&["foo", "bar", "baz"]);
        buf.clear_undo_stack();
        buf.join_lines(1, 2, false).unwrap();
        assert_eq!(contents(&mut buf), ["foobar", "baz"]);
        assert_eq!(buf.current_addr(), 1);
    }

    #[test]
    fn test_yank_and_put() {
        let mut buf = buffer_with_lines(&["a", "b", "c"]);
        buf.clear_undo_stack();
        buf.yank_lines(1, 2).unwrap();
        buf.put_lines(3).unwrap();
        assert_eq!(contents(&mut buf), ["a", "b", "c", "a", "b"]);
        assert_eq!(buf.current_addr(), 5);
    }

    #[test]
    fn test_put_empty_yank_fails() {
        let mut buf = buffer_with_lines(&["a"]);
        buf.clear_undo_stack();
        assert_eq!(buf.put_lines(1), Err(EdError::NothingToPut));
    }

    #[test]
    fn test_delete_then_put_restores_text() {
        let mut buf = buffer_with_lines(&["a", "b", "c"]);
        buf.clear_undo_stack();
        buf.delete_lines(2, 2, false).unwrap();
        assert_eq!(contents(&mut buf), ["a", "c"]);
        buf.put_lines(2).unwrap();
        assert_eq!(contents(&mut buf), ["a", "c", "b"]);
    }

    #[test]
    fn test_get_line_node_addr_of_unlinked_record_fails() {
        let mut buf = buffer_with_lines(&["a", "b"]);
        buf.clear_undo_stack();
        let n2 = buf.search_line_node(2);
        buf.delete_lines(2, 2, false).unwrap();
        assert_eq!(buf.get_line_node_addr(n2), Err(EdError::InvalidAddress));
        assert_eq!(buf.get_line_node_addr(BUF_HEAD).unwrap(), 0);
    }
}

//! Property-based tests for the editor core.
//!
//! These drive the buffer engine and the scripted editor with generated
//! inputs to verify the invariants that hold for every edit sequence:
//! undo is an involution, files round-trip byte for byte, and the cached
//! locator always agrees with a plain walk.

use std::cell::RefCell;
use std::io::{Cursor, Write};
use std::rc::Rc;

use proptest::prelude::*;
use tempfile::TempDir;

use edx::{Config, Editor, LineBuffer};

#[derive(Clone, Default)]
struct SharedOut(Rc<RefCell<Vec<u8>>>);

impl Write for SharedOut {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn buffer_with(lines: &[String]) -> LineBuffer {
    let mut buf = LineBuffer::new().unwrap();
    for line in lines {
        buf.put_sbuf_line(line.as_bytes()).unwrap();
    }
    buf.set_modified(false);
    buf
}

fn snapshot(buf: &mut LineBuffer) -> (Vec<String>, usize, usize, bool) {
    let mut lines = Vec::new();
    for addr in 1..=buf.last_addr() {
        let lp = buf.search_line_node(addr);
        lines.push(String::from_utf8(buf.get_sbuf_line(lp).unwrap()).unwrap());
    }
    (lines, buf.current_addr(), buf.last_addr(), buf.is_modified())
}

proptest! {
    /// Deleting any range and undoing restores text, cursor and the
    /// modified flag.
    #[test]
    fn prop_delete_undo_round_trips(
        lines in prop::collection::vec("[ -~]{0,20}", 1..30),
        a in 0usize..30,
        b in 0usize..30,
    ) {
        let mut buf = buffer_with(&lines);
        let last = buf.last_addr();
        let from = a % last + 1;
        let to = from + b % (last - from + 1);

        buf.clear_undo_stack();
        let before = snapshot(&mut buf);
        buf.delete_lines(from, to, false).unwrap();
        buf.undo(false).unwrap();
        prop_assert_eq!(snapshot(&mut buf), before);
    }

    /// Undo twice reapplies the edit exactly (undo is an involution).
    #[test]
    fn prop_undo_is_involution_for_moves(
        lines in prop::collection::vec("[a-z]{1,8}", 2..20),
        a in 0usize..20,
        b in 0usize..20,
        dest in 0usize..20,
    ) {
        let mut buf = buffer_with(&lines);
        let last = buf.last_addr();
        let from = a % last + 1;
        let to = from + b % (last - from + 1);
        // destinations that actually relink: outside [from-1, to]
        let candidates: Vec<usize> = (0..=last).filter(|&x| x + 1 < from || x > to).collect();
        prop_assume!(!candidates.is_empty());
        let addr = candidates[dest % candidates.len()];

        buf.clear_undo_stack();
        buf.move_lines(from, to, addr, false).unwrap();
        let after = snapshot(&mut buf);
        buf.undo(false).unwrap();
        buf.undo(false).unwrap();
        prop_assert_eq!(snapshot(&mut buf), after);
    }

    /// Appending a range copy and deleting it restores the original.
    #[test]
    fn prop_copy_then_delete_restores(
        lines in prop::collection::vec("[a-z]{1,8}", 1..15),
        a in 0usize..15,
    ) {
        let mut buf = buffer_with(&lines);
        let last = buf.last_addr();
        let from = a % last + 1;

        buf.clear_undo_stack();
        let before = snapshot(&mut buf).0;
        buf.copy_lines(from, last, last).unwrap();
        buf.delete_lines(last + 1, buf.last_addr(), false).unwrap();
        prop_assert_eq!(snapshot(&mut buf).0, before);
    }

    /// The cached locator agrees with a plain forward walk whatever the
    /// query order.
    #[test]
    fn prop_locator_matches_walk(
        lines in prop::collection::vec("[a-z]{1,8}", 1..25),
        queries in prop::collection::vec(0usize..25, 1..20),
    ) {
        let mut buf = buffer_with(&lines);
        let last = buf.last_addr();
        for q in queries {
            let addr = q % (last + 1);
            let lp = buf.search_line_node(addr);
            prop_assert_eq!(buf.get_line_node_addr(lp).unwrap(), addr);
        }
    }

    /// Reading a text file and writing it elsewhere reproduces the bytes.
    #[test]
    fn prop_file_write_read_identity(
        lines in prop::collection::vec("[ -~]{0,30}", 1..20),
    ) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        let mut data = lines.join("\n");
        data.push('\n');
        std::fs::write(&src, &data).unwrap();

        let script = format!("e {}\nw {}\nq\n", src.display(), dst.display());
        let out = SharedOut::default();
        let cfg = Config { scripted: true, ..Default::default() };
        let mut ed = Editor::new(
            cfg,
            Box::new(Cursor::new(script.into_bytes())),
            Box::new(out.clone()),
        )
        .unwrap();
        let status = ed.main_loop(false);
        prop_assert_eq!(status, 0);
        prop_assert_eq!(std::fs::read(&dst).unwrap(), data.into_bytes());
    }

    /// `a` then `d` over the appended range leaves the buffer unchanged.
    #[test]
    fn prop_append_then_delete_is_identity(
        base in prop::collection::vec("[a-z]{1,10}", 1..10),
        extra in prop::collection::vec("[a-z]{1,10}", 1..10),
    ) {
        let script = format!(
            "a\n{}\n.\n$a\n{}\n.\n{},{}d\n",
            base.join("\n"),
            extra.join("\n"),
            base.len() + 1,
            base.len() + extra.len(),
        );
        let out = SharedOut::default();
        let cfg = Config { scripted: true, ..Default::default() };
        let mut ed = Editor::new(
            cfg,
            Box::new(Cursor::new(script.into_bytes())),
            Box::new(out.clone()),
        )
        .unwrap();
        ed.main_loop(false);
        let mut lines = Vec::new();
        for addr in 1..=ed.buffer.last_addr() {
            let lp = ed.buffer.search_line_node(addr);
            lines.push(String::from_utf8(ed.buffer.get_sbuf_line(lp).unwrap()).unwrap());
        }
        prop_assert_eq!(lines, base);
    }
}

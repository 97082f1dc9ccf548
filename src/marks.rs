//! Line marks `a`..`z`.
//!
//! A mark references a record, not an address, so it follows the line
//! through moves. Marks are dropped when the record they reference is
//! freed (see `clear_undo_stack`).

use crate::buffer::{LineBuffer, NodeId};
use crate::error::{EdError, Result};

fn mark_slot(c: u8) -> Result<usize> {
    if c.is_ascii_lowercase() {
        Ok((c - b'a') as usize)
    } else {
        Err(EdError::InvalidMarkCharacter)
    }
}

impl LineBuffer {
    /// `k` command: mark a line.
    pub fn mark_line_node(&mut self, lp: NodeId, c: u8) -> Result<()> {
        let slot = mark_slot(c)?;
        if self.marks[slot].is_none() {
            self.mark_count += 1;
        }
        self.marks[slot] = Some(lp);
        Ok(())
    }

    /// Clear every mark referencing `lp`.
    pub(crate) fn unmark_line_node(&mut self, lp: NodeId) {
        if self.mark_count == 0 {
            return;
        }
        for slot in self.marks.iter_mut() {
            if *slot == Some(lp) {
                *slot = None;
                self.mark_count -= 1;
            }
        }
    }

    /// `'x` address: current address of the marked line.
    pub fn marked_node_addr(&mut self, c: u8) -> Result<usize> {
        let slot = mark_slot(c)?;
        match self.marks[slot] {
            Some(lp) => self.get_line_node_addr(lp),
            None => Err(EdError::InvalidAddress),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::buffer::test_support::buffer_with_lines;
    use crate::error::EdError;

    #[test]
    fn test_mark_follows_line_through_move() {
        let mut buf = buffer_with_lines(&["a", "b", "c", "d"]);
        buf.clear_undo_stack();
        let n2 = buf.search_line_node(2);
        buf.mark_line_node(n2, b'b').unwrap();
        assert_eq!(buf.marked_node_addr(b'b').unwrap(), 2);
        buf.move_lines(2, 2, 4, false).unwrap();
        assert_eq!(buf.marked_node_addr(b'b').unwrap(), 4);
    }

    #[test]
    fn test_invalid_mark_character() {
        let mut buf = buffer_with_lines(&["a"]);
        let n1 = buf.search_line_node(1);
        assert_eq!(buf.mark_line_node(n1, b'A'), Err(EdError::InvalidMarkCharacter));
        assert_eq!(buf.mark_line_node(n1, b'\n'), Err(EdError::InvalidMarkCharacter));
        assert_eq!(buf.marked_node_addr(b'0'), Err(EdError::InvalidMarkCharacter));
    }

    #[test]
    fn test_unset_mark_is_invalid_address() {
        let mut buf = buffer_with_lines(&["a"]);
        assert_eq!(buf.marked_node_addr(b'z'), Err(EdError::InvalidAddress));
    }

    #[test]
    fn test_remark_replaces() {
        let mut buf = buffer_with_lines(&["a", "b"]);
        let n1 = buf.search_line_node(1);
        let n2 = buf.search_line_node(2);
        buf.mark_line_node(n1, b'm').unwrap();
        buf.mark_line_node(n2, b'm').unwrap();
        assert_eq!(buf.marked_node_addr(b'm').unwrap(), 2);
    }
}

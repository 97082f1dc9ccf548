//! The undo stack.
//!
//! Each structural edit pushes atoms describing the affected range by
//! record handle. A frame is the group of atoms accumulated by one
//! top-level command; `clear_undo_stack` opens a new frame, snapshotting
//! `(current, last, modified)` and freeing the unlinked records the old
//! frame's `Del` atoms owned.
//!
//! `undo` reverses the atoms in LIFO order (unlink for `Add`, relink for
//! `Del`, a three-seam link swap for a `Mov` pair), flips each tag, then
//! reverses the atom order in place. Together with swapping the snapshot,
//! this makes undo an involution: a second `u` redoes.

use crate::buffer::{LineBuffer, NodeId};
use crate::error::{EdError, Result};
use crate::signals::InterruptGuard;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UndoTag {
    /// The range was newly linked; undo unlinks it.
    Add,
    /// The range was unlinked but retained; undo relinks it.
    Del,
    /// One half of a move; always processed as a pair.
    Mov,
    /// Second half of a reversed move.
    Vmov,
}

impl UndoTag {
    fn flip(self) -> UndoTag {
        match self {
            UndoTag::Add => UndoTag::Del,
            UndoTag::Del => UndoTag::Add,
            UndoTag::Mov => UndoTag::Vmov,
            UndoTag::Vmov => UndoTag::Mov,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct UndoAtom {
    pub tag: UndoTag,
    pub head: NodeId,
    pub tail: NodeId,
}

#[derive(Clone, Copy, Debug)]
pub struct UndoSnapshot {
    pub current: usize,
    pub last: usize,
    pub modified: bool,
}

impl LineBuffer {
    /// Push an atom covering `from..=to`; returns its stack index so the
    /// caller can extend the tail as an insertion grows.
    pub(crate) fn push_undo_atom(&mut self, tag: UndoTag, from: usize, to: usize) -> Result<usize> {
        let _guard = InterruptGuard::new();
        if (self.ustack.len() + 1).saturating_mul(std::mem::size_of::<UndoAtom>())
            >= i32::MAX as usize
        {
            self.reset_undo_state();
            return Err(EdError::UndoStackTooLong);
        }
        let tail = self.search_line_node(to);
        let head = self.search_line_node(from);
        self.ustack.push(UndoAtom { tag, head, tail });
        Ok(self.ustack.len() - 1)
    }

    pub(crate) fn set_undo_tail(&mut self, idx: usize, tail: NodeId) {
        self.ustack[idx].tail = tail;
    }

    /// Open a fresh undo frame: drop the recorded atoms, freeing the
    /// records owned by `Del` atoms (they are unreachable from the buffer
    /// ring), and snapshot the cursor state.
    pub fn clear_undo_stack(&mut self) {
        while let Some(atom) = self.ustack.pop() {
            if atom.tag == UndoTag::Del {
                let ep = self.next_of(atom.tail);
                let mut bp = atom.head;
                while bp != ep {
                    let next = self.next_of(bp);
                    self.unmark_line_node(bp);
                    self.unmark_unterminated_line(bp);
                    self.free_node(bp);
                    bp = next;
                }
            }
        }
        self.undo_snapshot = Some(UndoSnapshot {
            current: self.current_addr(),
            last: self.last_addr(),
            modified: self.is_modified(),
        });
    }

    /// Clear the stack and disable undo entirely (a fresh buffer load has
    /// nothing to return to).
    pub fn reset_undo_state(&mut self) {
        self.clear_undo_stack();
        self.undo_snapshot = None;
    }

    /// Reverse the current frame. A second call with no intervening command
    /// reapplies it.
    pub fn undo(&mut self, isglobal: bool) -> Result<()> {
        if self.ustack.is_empty() || self.undo_snapshot.is_none() {
            return Err(EdError::NothingToUndo);
        }
        self.search_line_node(0); // park the locator on the sentinel
        let _guard = InterruptGuard::new();
        let o_snapshot = UndoSnapshot {
            current: self.current_addr(),
            last: self.last_addr(),
            modified: self.is_modified(),
        };

        let mut n = self.ustack.len() as isize - 1;
        while n >= 0 {
            let i = n as usize;
            let atom = self.ustack[i];
            match atom.tag {
                UndoTag::Add => {
                    let prev = self.prev_of(atom.head);
                    let next = self.next_of(atom.tail);
                    self.link_nodes(prev, next);
                }
                UndoTag::Del => {
                    // the unlinked range still points at its old neighbors
                    let prev = self.prev_of(atom.head);
                    self.link_nodes(prev, atom.head);
                    let next = self.next_of(atom.tail);
                    self.link_nodes(atom.tail, next);
                }
                UndoTag::Mov | UndoTag::Vmov => {
                    let lower = self.ustack[i - 1];
                    let t = self.next_of(atom.head);
                    self.link_nodes(lower.head, t);
                    let t = self.prev_of(atom.tail);
                    self.link_nodes(t, lower.tail);
                    self.link_nodes(atom.head, atom.tail);
                    n -= 1;
                }
            }
            let i = n as usize;
            self.ustack[i].tag = self.ustack[i].tag.flip();
            n -= 1;
        }
        // reverse the atom order so the next undo replays forward
        self.ustack.reverse();

        if isglobal {
            self.clear_active_list();
        }
        let snap = self.undo_snapshot.take().expect("undo enabled");
        self.current = snap.current;
        self.last = snap.last;
        self.modified = snap.modified;
        self.undo_snapshot = Some(o_snapshot);
        Ok(())
    }
}

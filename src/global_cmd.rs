//! The global-command active list.
//!
//! `g`/`v`/`G`/`V` first collect the records whose text matches (or does
//! not match) the pattern, then iterate that list executing commands.
//! Commands executed for one line may delete or move lines selected for a
//! later iteration; those entries are nulled out and skipped. The main
//! cursor is non-decreasing; the unset scan resumes where it last stopped
//! (modulo the list length) because deletions arrive in clusters.

use crate::buffer::{LineBuffer, NodeId};
use crate::error::{EdError, Result};
use crate::signals::InterruptGuard;

#[derive(Default)]
pub struct ActiveList {
    list: Vec<Option<NodeId>>,
    idx: usize,
    idxm: usize,
}

impl LineBuffer {
    pub fn clear_active_list(&mut self) {
        let _guard = InterruptGuard::new();
        self.active = ActiveList::default();
    }

    /// Next surviving entry, advancing past nulled-out ones.
    pub fn next_active_node(&mut self) -> Option<NodeId> {
        while self.active.idx < self.active.list.len() && self.active.list[self.active.idx].is_none()
        {
            self.active.idx += 1;
        }
        if self.active.idx < self.active.list.len() {
            let lp = self.active.list[self.active.idx];
            self.active.idx += 1;
            lp
        } else {
            None
        }
    }

    pub fn set_active_node(&mut self, lp: NodeId) -> Result<()> {
        if (self.active.list.len() + 1).saturating_mul(std::mem::size_of::<Option<NodeId>>())
            >= i32::MAX as usize
        {
            return Err(EdError::TooManyMatchingLines);
        }
        let _guard = InterruptGuard::new();
        self.active.list.push(Some(lp));
        Ok(())
    }

    /// Null out the entries for the records in `[bp, ep)` of the buffer
    /// ring (they were deleted or moved out from under the traversal).
    pub(crate) fn unset_active_nodes(&mut self, bp: NodeId, ep: NodeId) {
        let len = self.active.list.len();
        if len == 0 {
            return;
        }
        let mut bp = bp;
        while bp != ep {
            for _ in 0..len {
                self.active.idxm = (self.active.idxm + 1) % len;
                if self.active.list[self.active.idxm] == Some(bp) {
                    self.active.list[self.active.idxm] = None;
                    break;
                }
            }
            bp = self.next_of(bp);
        }
    }
}

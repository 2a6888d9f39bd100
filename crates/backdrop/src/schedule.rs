//! Single-threaded frame scheduling.
//!
//! Effects ask for "the next frame" and receive a [`FrameToken`]; the host
//! window drains due tokens once per redraw and hands each back to the effect
//! that asked for it. A cancelled token is never handed out, which is what
//! lets an unmounting effect guarantee that no queued frame runs against
//! released resources.

use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameToken(u64);

impl FrameToken {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct FrameScheduler {
    next_id: u64,
    pending: Vec<FrameToken>,
}

pub type SharedScheduler = Rc<RefCell<FrameScheduler>>;

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedScheduler {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Queues a callback for the next frame.
    pub fn request(&mut self) -> FrameToken {
        self.next_id = self.next_id.wrapping_add(1);
        let token = FrameToken(self.next_id);
        self.pending.push(token);
        tracing::trace!(token = token.0, "frame requested");
        token
    }

    /// Returns true when the token was still pending.
    pub fn cancel(&mut self, token: FrameToken) -> bool {
        let before = self.pending.len();
        self.pending.retain(|pending| *pending != token);
        let removed = self.pending.len() != before;
        if removed {
            tracing::trace!(token = token.0, "frame cancelled");
        }
        removed
    }

    /// Drains every pending token in request order.
    ///
    /// Tokens requested while the drained batch is being dispatched belong to
    /// the following frame.
    pub fn take_due(&mut self) -> Vec<FrameToken> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_pending(&self, token: FrameToken) -> bool {
        self.pending.contains(&token)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::error::{Error, Result};

/// Cancellation and deadline carried into every provider call.
///
/// Clones share the same cancel flag, so a clone handed to another thread can
/// cancel work running on this one. The provider looks at the context before
/// each statement and each row it reads, and interrupts a statement that is
/// still running once the context is done.
#[derive(Debug, Clone, Default)]
pub struct Context {
    canceled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never canceled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            canceled: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Derive a context sharing this one's cancel flag with a tighter deadline.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            canceled: self.canceled.clone(),
            deadline: Some(match self.deadline {
                Some(current) => current.min(deadline),
                None => deadline,
            }),
        }
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fail with [`Error::Canceled`] once the context is canceled or expired.
    pub fn check(&self) -> Result<()> {
        if self.is_done() {
            return Err(Error::Canceled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_never_done() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let ctx = Context::background();
        let other = ctx.clone();
        other.cancel();
        assert!(matches!(ctx.check(), Err(Error::Canceled)));
    }

    #[test]
    fn expired_deadline_cancels() {
        let ctx = Context::with_timeout(Duration::ZERO);
        assert!(ctx.is_done());
        let child = Context::background().child_with_timeout(Duration::from_secs(60));
        assert!(!child.is_done());
    }
}

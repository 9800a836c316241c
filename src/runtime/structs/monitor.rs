use crate::runtime::{Exception, ThreadId, famous_classes::ILLEGAL_MONITOR_STATE_EXCEPTION};
use std::collections::VecDeque;

/// Reentrant lock attached to an object.
///
/// Contenders queue in arrival order. When the count drops to zero the head
/// of the queue becomes the successor: the monitor stays free but only the
/// successor may take it, so a thread that arrives later cannot barge past
/// the queue.
#[derive(Debug, Default)]
pub struct Monitor {
    owner: Option<ThreadId>,
    count: u32,
    entry_queue: VecDeque<ThreadId>,
    successor: Option<ThreadId>,
    wait_set: VecDeque<ThreadId>,
}

impl Monitor {
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_owned_by(&self, thread: ThreadId) -> bool {
        self.owner == Some(thread)
    }

    pub fn queued(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.entry_queue.iter().copied()
    }

    pub fn waiting(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.wait_set.iter().copied()
    }

    /// Takes the monitor `count` times. On failure `thread` is queued and
    /// must retry once it has been promoted.
    pub fn try_enter(&mut self, thread: ThreadId, count: u32) -> bool {
        match self.owner {
            Some(owner) if owner == thread => {
                self.count += count;
                true
            }
            Some(_) => {
                self.enqueue(thread);
                false
            }
            None => match self.successor {
                Some(successor) if successor != thread => {
                    self.enqueue(thread);
                    false
                }
                _ => {
                    self.successor = None;
                    self.entry_queue.retain(|t| *t != thread);
                    self.owner = Some(thread);
                    self.count = count;
                    true
                }
            },
        }
    }

    /// Releases one hold. Returns the thread promoted to successor when the
    /// monitor became free.
    pub fn exit(&mut self, thread: ThreadId) -> Result<Option<ThreadId>, Exception> {
        if !self.is_owned_by(thread) {
            return Err(Exception::new_vm_msg(
                ILLEGAL_MONITOR_STATE_EXCEPTION,
                "current thread is not owner",
            ));
        }
        self.count -= 1;
        if self.count > 0 {
            return Ok(None);
        }
        self.owner = None;
        Ok(self.promote())
    }

    /// Fully releases the monitor and parks `thread` in the wait set.
    /// Returns the saved hold count and the promoted successor.
    pub fn wait(&mut self, thread: ThreadId) -> Result<(u32, Option<ThreadId>), Exception> {
        if !self.is_owned_by(thread) {
            return Err(Exception::new_vm_msg(
                ILLEGAL_MONITOR_STATE_EXCEPTION,
                "current thread is not owner",
            ));
        }
        let count = self.count;
        self.count = 0;
        self.owner = None;
        self.wait_set.push_back(thread);
        Ok((count, self.promote()))
    }

    pub fn notify(&mut self, thread: ThreadId) -> Result<Option<ThreadId>, Exception> {
        if !self.is_owned_by(thread) {
            return Err(Exception::new_vm_msg(
                ILLEGAL_MONITOR_STATE_EXCEPTION,
                "current thread is not owner",
            ));
        }
        Ok(self.wait_set.pop_front())
    }

    pub fn notify_all(&mut self, thread: ThreadId) -> Result<Vec<ThreadId>, Exception> {
        if !self.is_owned_by(thread) {
            return Err(Exception::new_vm_msg(
                ILLEGAL_MONITOR_STATE_EXCEPTION,
                "current thread is not owner",
            ));
        }
        Ok(self.wait_set.drain(..).collect())
    }

    /// Drops a timed-out waiter. `false` if it was already notified.
    pub fn remove_waiter(&mut self, thread: ThreadId) -> bool {
        let before = self.wait_set.len();
        self.wait_set.retain(|t| *t != thread);
        before != self.wait_set.len()
    }

    fn enqueue(&mut self, thread: ThreadId) {
        if !self.entry_queue.contains(&thread) {
            self.entry_queue.push_back(thread);
        }
    }

    fn promote(&mut self) -> Option<ThreadId> {
        self.successor = self.entry_queue.pop_front();
        self.successor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T1: ThreadId = ThreadId(1);
    const T2: ThreadId = ThreadId(2);
    const T3: ThreadId = ThreadId(3);

    #[test]
    fn test_reentrant_release_count() {
        let mut monitor = Monitor::default();
        for _ in 0..3 {
            assert!(monitor.try_enter(T1, 1));
        }
        assert_eq!(monitor.exit(T1).unwrap(), None);
        assert_eq!(monitor.exit(T1).unwrap(), None);
        assert_eq!(monitor.owner(), Some(T1));
        assert!(!monitor.try_enter(T2, 1));
        assert_eq!(monitor.exit(T1).unwrap(), Some(T2));
        assert_eq!(monitor.owner(), None);
        assert_eq!(monitor.count(), 0);
        assert!(monitor.try_enter(T2, 1));
    }

    #[test]
    fn test_only_owner_releases() {
        let mut monitor = Monitor::default();
        assert!(monitor.exit(T1).is_err());
        assert!(monitor.try_enter(T1, 1));
        assert!(monitor.exit(T2).is_err());
        assert_eq!(monitor.count(), 1);
    }

    #[test]
    fn test_fifo_handoff_without_barging() {
        let mut monitor = Monitor::default();
        assert!(monitor.try_enter(T1, 1));
        assert!(!monitor.try_enter(T2, 1));
        assert!(!monitor.try_enter(T3, 1));
        // retrying while queued must not reorder
        assert!(!monitor.try_enter(T2, 1));
        assert_eq!(monitor.queued().collect::<Vec<_>>(), vec![T2, T3]);

        assert_eq!(monitor.exit(T1).unwrap(), Some(T2));
        // T1 comes back first but T2 was promoted
        assert!(!monitor.try_enter(T1, 1));
        assert!(!monitor.try_enter(T3, 1));
        assert!(monitor.try_enter(T2, 1));
        assert_eq!(monitor.exit(T2).unwrap(), Some(T3));
        assert!(monitor.try_enter(T3, 1));
        assert_eq!(monitor.exit(T3).unwrap(), Some(T1));
    }

    #[test]
    fn test_wait_releases_and_restores_count() {
        let mut monitor = Monitor::default();
        assert!(monitor.try_enter(T1, 1));
        assert!(monitor.try_enter(T1, 1));
        assert!(!monitor.try_enter(T2, 1));
        let (count, promoted) = monitor.wait(T1).unwrap();
        assert_eq!((count, promoted), (2, Some(T2)));
        assert!(monitor.try_enter(T2, 1));
        assert_eq!(monitor.notify(T2).unwrap(), Some(T1));
        assert_eq!(monitor.notify(T2).unwrap(), None);
        assert!(!monitor.try_enter(T1, count));
        assert_eq!(monitor.exit(T2).unwrap(), Some(T1));
        assert!(monitor.try_enter(T1, count));
        assert_eq!(monitor.count(), 2);
    }

    #[test]
    fn test_wait_requires_ownership() {
        let mut monitor = Monitor::default();
        assert!(monitor.wait(T1).is_err());
        assert!(monitor.notify_all(T1).is_err());
    }
}

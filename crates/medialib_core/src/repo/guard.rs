//! Reader/writer guard around one repository cache.
//!
//! # Invariants
//! - Shared acquisition is recursive: a thread already holding a read lock
//!   may take it again even while a writer is queued.
//! - Guards never escape the closures, so no lock is held across a hook.

use parking_lot::RwLock;

pub(crate) struct CacheGuard<S> {
    lock: RwLock<S>,
}

impl<S> CacheGuard<S> {
    pub(crate) fn new(state: S) -> Self {
        Self {
            lock: RwLock::new(state),
        }
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let guard = self.lock.read_recursive();
        f(&guard)
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut guard = self.lock.write();
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::CacheGuard;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn nested_reads_do_not_deadlock_with_a_queued_writer() {
        let guard = Arc::new(CacheGuard::new(0_u32));
        let writer_done = Arc::new(AtomicBool::new(false));

        let value = guard.read(|outer| {
            let writer = {
                let guard = Arc::clone(&guard);
                let writer_done = Arc::clone(&writer_done);
                std::thread::spawn(move || {
                    guard.write(|state| *state += 1);
                    writer_done.store(true, Ordering::SeqCst);
                })
            };
            std::thread::sleep(Duration::from_millis(20));
            let inner = guard.read(|inner| *inner);
            assert!(!writer_done.load(Ordering::SeqCst));
            (writer, *outer + inner)
        });

        let (writer, sum) = value;
        writer.join().unwrap();
        assert_eq!(sum, 0);
        assert_eq!(guard.read(|state| *state), 1);
    }
}

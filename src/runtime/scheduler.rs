use crate::runtime::{
    InitState, Runtime,
    thread::{Blocker, Effects, Suspend, Thread, ThreadId, ThreadStatus},
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// One executed unit of work, recorded when tracing is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub turn: u64,
    pub thread: ThreadId,
    pub class_name: Arc<str>,
    pub method_name: Arc<str>,
    pub pc: usize,
}

pub(crate) enum Turn {
    Ran,
    /// No thread can make progress.
    Idle,
    Exited,
}

/// Round-robin over threads in creation order, one unit of work per turn.
///
/// Time is logical: the clock advances one tick per turn, and when every
/// live thread is parked on a deadline it jumps straight to the earliest
/// one. Runs are therefore reproducible for the same program and inputs.
#[derive(Default)]
pub(crate) struct Scheduler {
    threads: Vec<Thread>,
    next: usize,
    clock: u64,
    turns: u64,
    trace: Vec<TraceEntry>,
    exit: Option<i32>,
}

impl Scheduler {
    pub(crate) fn add(&mut self, thread: Thread) {
        debug!(thread = %thread.id, name = %thread.name, "thread added");
        self.threads.push(thread);
    }

    pub(crate) fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub(crate) fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub(crate) fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub(crate) fn turns(&self) -> u64 {
        self.turns
    }

    pub(crate) fn exit_status(&self) -> Option<i32> {
        self.exit
    }

    pub(crate) fn turn(&mut self, runtime: &Runtime) -> Turn {
        if self.exit.is_some() {
            return Turn::Exited;
        }
        self.wake_due();
        let index = match self.pick() {
            Some(index) => index,
            None => {
                if !self.fast_forward() {
                    self.report_stall();
                    return Turn::Idle;
                }
                self.wake_due();
                match self.pick() {
                    Some(index) => index,
                    None => return Turn::Idle,
                }
            }
        };

        self.turns += 1;
        self.clock += 1;
        let id = self.threads[index].id;
        if runtime.config.record_trace {
            if let Some((class_name, method_name, pc)) = self.threads[index].location() {
                self.trace.push(TraceEntry {
                    turn: self.turns,
                    thread: id,
                    class_name,
                    method_name,
                    pc,
                });
            }
        }
        let mut effects = Effects::default();
        self.threads[index].step(runtime, &mut effects);
        self.apply(index, effects);
        self.next = index + 1;
        if self.exit.is_some() {
            Turn::Exited
        } else {
            Turn::Ran
        }
    }

    /// First runnable thread at or after the round-robin cursor.
    fn pick(&self) -> Option<usize> {
        let count = self.threads.len();
        (0..count)
            .map(|offset| (self.next + offset) % count)
            .find(|&i| self.threads[i].status == ThreadStatus::Runnable)
    }

    fn apply(&mut self, index: usize, effects: Effects) {
        let Effects {
            woken,
            notified,
            spawned,
            suspend,
            exit,
        } = effects;
        for id in woken {
            if let Some(thread) = self.thread_mut(id) {
                if thread.status == ThreadStatus::Blocked {
                    trace!(thread = %id, "promoted to monitor successor");
                    thread.status = ThreadStatus::Runnable;
                    thread.blocker = None;
                }
            }
        }
        for id in notified {
            if let Some(thread) = self.thread_mut(id) {
                resume_waiter(thread);
            }
        }
        if let Some(suspend) = suspend {
            self.suspend(index, suspend);
        }
        if let Some(status) = exit {
            debug!(status, "exit requested");
            self.exit = Some(status);
        }
        for thread in spawned {
            self.add(thread);
        }
    }

    fn suspend(&mut self, index: usize, suspend: Suspend) {
        let clock = self.clock;
        let blocker = match suspend {
            Suspend::Wait {
                monitor,
                count,
                millis,
            } => Blocker::Wait {
                monitor,
                count,
                deadline: millis.map(|m| clock + m),
            },
            Suspend::Join(target) => {
                let alive = self
                    .thread(target)
                    .is_some_and(|t| t.status != ThreadStatus::Terminated);
                if !alive {
                    return;
                }
                Blocker::Join(target)
            }
            Suspend::Sleep(millis) => Blocker::Sleep(clock + millis),
            Suspend::Yield => return,
        };
        let thread = &mut self.threads[index];
        if thread.status == ThreadStatus::Runnable {
            thread.status = ThreadStatus::Waiting;
            thread.blocker = Some(blocker);
        }
    }

    /// Wakes sleepers and timed waiters whose deadline has passed, joiners
    /// whose target has terminated, and threads waiting on a class whose
    /// initializer has finished or failed.
    fn wake_due(&mut self) {
        let clock = self.clock;
        let terminated: Vec<ThreadId> = self
            .threads
            .iter()
            .filter(|t| t.status == ThreadStatus::Terminated)
            .map(|t| t.id)
            .collect();
        for thread in &mut self.threads {
            if thread.status != ThreadStatus::Waiting {
                continue;
            }
            match &thread.blocker {
                Some(Blocker::Sleep(deadline)) if *deadline <= clock => {
                    thread.status = ThreadStatus::Runnable;
                    thread.blocker = None;
                }
                Some(Blocker::Join(target)) if terminated.contains(target) => {
                    thread.status = ThreadStatus::Runnable;
                    thread.blocker = None;
                }
                Some(Blocker::ClassInit(class))
                    if !matches!(class.init_state(), InitState::InProgress(_)) =>
                {
                    thread.status = ThreadStatus::Runnable;
                    thread.blocker = None;
                }
                Some(Blocker::Wait {
                    monitor,
                    deadline: Some(deadline),
                    ..
                }) if *deadline <= clock => {
                    monitor.monitor().lock().remove_waiter(thread.id);
                    resume_waiter(thread);
                }
                _ => {}
            }
        }
    }

    /// Moves the clock to the earliest pending deadline.
    fn fast_forward(&mut self) -> bool {
        let earliest = self
            .threads
            .iter()
            .filter(|t| t.status == ThreadStatus::Waiting)
            .filter_map(|t| match &t.blocker {
                Some(Blocker::Sleep(deadline)) => Some(*deadline),
                Some(Blocker::Wait {
                    deadline: Some(deadline),
                    ..
                }) => Some(*deadline),
                _ => None,
            })
            .min();
        match earliest {
            Some(deadline) => {
                trace!(from = self.clock, to = deadline, "clock fast-forward");
                self.clock = self.clock.max(deadline);
                true
            }
            None => false,
        }
    }

    fn report_stall(&self) {
        let stuck: Vec<_> = self
            .threads
            .iter()
            .filter(|t| t.status != ThreadStatus::Terminated)
            .map(|t| (t.id, t.status))
            .collect();
        if !stuck.is_empty() {
            warn!(?stuck, "no runnable thread left");
        }
    }

    fn thread_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.id == id)
    }
}

/// A waiter leaving the wait set competes for its monitor again before
/// `wait` returns.
fn resume_waiter(thread: &mut Thread) {
    if let Some(Blocker::Wait { monitor, count, .. }) = thread.blocker.take() {
        thread.reacquire = Some((monitor, count));
        thread.status = ThreadStatus::Runnable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassBuilder, CodeAst, Instruction};
    use crate::consts::MethodAccessFlag;
    use crate::runtime::test_support::runtime_with;

    #[test]
    fn test_empty_scheduler_is_idle() {
        let runtime = runtime_with(vec![]);
        let mut scheduler = Scheduler::default();
        assert!(matches!(scheduler.turn(&runtime), Turn::Idle));
        assert_eq!(scheduler.turns(), 0);
    }

    #[test]
    fn test_clock_jumps_to_sleep_deadline() {
        let mut class = ClassBuilder::new("Nap");
        let sleep = class.method_ref("java/lang/Thread", "sleep", "(J)V");
        class.method(
            MethodAccessFlag::PUBLIC | MethodAccessFlag::STATIC,
            "nap",
            "()V",
            CodeAst::new(
                2,
                0,
                vec![
                    Instruction::Lconst(1000),
                    Instruction::InvokeStatic(sleep),
                    Instruction::Return(None),
                ],
            ),
        );
        let runtime = runtime_with(vec![class.build()]);
        let nap = runtime
            .load_class("Nap")
            .unwrap()
            .find_method("nap", "()V")
            .unwrap();
        let mut scheduler = Scheduler::default();
        scheduler.add(Thread::new(ThreadId(0), "main".to_string(), nap, vec![]));

        while let Turn::Ran = scheduler.turn(&runtime) {}
        assert!(scheduler.clock >= 1000);
        assert!(scheduler.turns() < 10);
        assert_eq!(scheduler.threads()[0].status(), ThreadStatus::Terminated);
    }
}

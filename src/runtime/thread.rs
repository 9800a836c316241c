use crate::runtime::{
    Class, Exception, Fault, InitState, NativeEnv, NativeResult, ObjectRef, ResolvedMethod, Runtime,
    ThrownValue, Value, VmError,
    famous_classes::{ABSTRACT_METHOD_ERROR, STACK_OVERFLOW_ERROR, UNSATISFIED_LINK_ERROR},
    interpreter::{
        Frame, FrameKind, InterpreterEnv, Next, find_handler, initialization_step,
        initializer_failure,
    },
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Runnable,
    /// Waiting to enter a monitor.
    Blocked,
    /// In `wait`, `join` or `sleep`.
    Waiting,
    Terminated,
}

/// Why a thread is not runnable.
#[derive(Debug, Clone)]
pub enum Blocker {
    Monitor(ObjectRef),
    Wait {
        monitor: ObjectRef,
        count: u32,
        deadline: Option<u64>,
    },
    Join(ThreadId),
    Sleep(u64),
    /// Another thread is running the class's initializer.
    ClassInit(Arc<Class>),
}

/// How a thread ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Returned(Option<Value>),
    Threw(ThrownValue),
    /// An engine invariant was violated; the thread was stopped.
    Aborted(VmError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTraceElement {
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
    pub pc: usize,
    pub line: Option<u16>,
    pub source_file: Option<String>,
}

impl fmt::Display for StackTraceElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}.{}", self.class_name.replace('/', "."), self.method_name)?;
        match (&self.source_file, self.line) {
            (Some(file), Some(line)) => write!(f, "({file}:{line})"),
            (Some(file), None) => write!(f, "({file})"),
            _ => write!(f, "(pc {})", self.pc),
        }
    }
}

/// Requests a step leaves for the scheduler, which applies them after the
/// step so no other thread observes a half-done transition.
#[derive(Default)]
pub(crate) struct Effects {
    /// Threads promoted to successor of a monitor they are blocked on.
    pub(crate) woken: Vec<ThreadId>,
    /// Threads moved out of a wait set.
    pub(crate) notified: Vec<ThreadId>,
    pub(crate) spawned: Vec<Thread>,
    pub(crate) suspend: Option<Suspend>,
    pub(crate) exit: Option<i32>,
}

pub(crate) enum Suspend {
    Wait {
        monitor: ObjectRef,
        count: u32,
        millis: Option<u64>,
    },
    Join(ThreadId),
    Sleep(u64),
    Yield,
}

pub struct Thread {
    pub(crate) id: ThreadId,
    pub(crate) name: String,
    pub(crate) status: ThreadStatus,
    pub(crate) blocker: Option<Blocker>,
    /// Monitor and recursion count to take back after a wait.
    pub(crate) reacquire: Option<(ObjectRef, u32)>,
    /// Method still to be invoked as the bottom frame, pending class
    /// initialization.
    entry: Option<(ResolvedMethod, Vec<Value>)>,
    top_frame: Option<Box<Frame>>,
    depth: usize,
    pub(crate) completion: Option<Completion>,
}

impl Thread {
    pub(crate) fn new(
        id: ThreadId,
        name: String,
        method: ResolvedMethod,
        args: Vec<Value>,
    ) -> Self {
        Self {
            id,
            name,
            status: ThreadStatus::Runnable,
            blocker: None,
            reacquire: None,
            entry: Some((method, args)),
            top_frame: None,
            depth: 0,
            completion: None,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    pub fn blocker(&self) -> Option<&Blocker> {
        self.blocker.as_ref()
    }

    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    /// Where the thread will execute next, as `(class, method, pc)`.
    pub(crate) fn location(&self) -> Option<(Arc<str>, Arc<str>, usize)> {
        let frame = self.top_frame.as_deref()?;
        Some((
            Arc::clone(&frame.method.class.class_name),
            Arc::clone(&frame.method.method().name),
            frame.pc,
        ))
    }

    /// Innermost frame first.
    pub fn backtrace(&self) -> Vec<StackTraceElement> {
        let mut elements = vec![];
        let mut current = self.top_frame.as_deref();
        while let Some(frame) = current {
            let method = frame.method.method();
            elements.push(StackTraceElement {
                class_name: frame.class().class_name.to_string(),
                method_name: method.name.to_string(),
                descriptor: method.descriptor_str.to_string(),
                pc: frame.pc,
                line: frame.code.line_number(frame.pc),
                source_file: frame.class().source_file.as_deref().map(str::to_string),
            });
            current = frame.previous_frame.as_deref();
        }
        elements
    }

    /// Runs one unit of work: a single instruction, the start of the entry
    /// method, or an attempt to take back a monitor after a wait.
    pub(crate) fn step(&mut self, runtime: &Runtime, effects: &mut Effects) {
        if self.status != ThreadStatus::Runnable {
            return;
        }
        let result = self.try_step(runtime, effects);
        let fault = match result {
            Ok(()) => return,
            Err(fault) => fault,
        };
        let fatal = match fault {
            Fault::Throw(exception) => match self.unwind(runtime, effects, exception) {
                Ok(()) => return,
                Err(fatal) => fatal,
            },
            Fault::Fatal(fatal) => fatal,
        };
        self.abort(effects, fatal);
    }

    fn try_step(&mut self, runtime: &Runtime, effects: &mut Effects) -> NativeResult<()> {
        if let Some((monitor, count)) = self.reacquire.take() {
            if !monitor.monitor().lock().try_enter(self.id, count) {
                self.block_on(Arc::clone(&monitor));
                self.reacquire = Some((monitor, count));
            }
            return Ok(());
        }
        if self.top_frame.is_none() {
            return self.start_entry(runtime, effects);
        }
        let next = {
            let Some(frame) = self.top_frame.as_deref_mut() else {
                return Ok(());
            };
            InterpreterEnv::new(runtime, frame, self.id, effects).execute()?
        };
        match next {
            Next::Advance => self.frame_mut()?.pc += 1,
            Next::Jump(target) => self.frame_mut()?.pc = target,
            Next::Invoke(method) => self.invoke(runtime, effects, method)?,
            Next::Return(value) => self.return_from_frame(effects, value)?,
            Next::Block(monitor) => self.block_on(monitor),
            Next::AwaitInit(class) => self.await_init(class),
            Next::InitClass(clinit) => {
                self.push_frame(Frame::new(clinit, vec![], FrameKind::ClassInit)?)
            }
        }
        Ok(())
    }

    fn start_entry(&mut self, runtime: &Runtime, effects: &mut Effects) -> NativeResult<()> {
        let Some((method, args)) = self.entry.take() else {
            return Err(
                VmError::Unsupported(format!("thread {} has nothing to run", self.id)).into(),
            );
        };
        match initialization_step(runtime, self.id, &method.class, effects)? {
            Some(Next::InitClass(clinit)) => {
                self.entry = Some((method, args));
                self.push_frame(Frame::new(clinit, vec![], FrameKind::ClassInit)?);
            }
            Some(Next::AwaitInit(class)) => {
                self.entry = Some((method, args));
                self.await_init(class);
            }
            Some(_) => self.entry = Some((method, args)),
            None => {
                debug!(thread = %self.id, method = ?method, "starting thread");
                let info = method.method();
                let native = runtime
                    .natives
                    .lookup(method.class.name(), &info.name, &info.descriptor_str);
                if let Some(native) = native {
                    let (this, args) = split_receiver(&method, args)?;
                    let class = Arc::clone(&method.class);
                    let mut env = NativeEnv::new(runtime, class, this, args, self.id, effects);
                    let value = native(&mut env)?;
                    self.terminate(Completion::Returned(value));
                } else {
                    self.push_frame(Frame::new(method, args, FrameKind::Method)?);
                }
            }
        }
        Ok(())
    }

    /// Performs a call whose arguments sit on the caller's operand stack.
    /// A synchronized callee whose monitor is taken leaves the stack alone
    /// and blocks, so the invoke instruction simply runs again.
    fn invoke(
        &mut self,
        runtime: &Runtime,
        effects: &mut Effects,
        method: ResolvedMethod,
    ) -> NativeResult<()> {
        let info = method.method();
        let arg_count = info.arg_count();
        let lock = if info.is_synchronized() {
            let lock = if info.is_static() {
                runtime.class_object(&method.class)?
            } else {
                self.frame_mut()?.stack.peek(arg_count - 1)?.as_object()?
            };
            if !lock.monitor().lock().try_enter(self.id, 1) {
                self.block_on(lock);
                return Ok(());
            }
            Some(lock)
        } else {
            None
        };
        let args = self.frame_mut()?.stack.pop_args(arg_count)?;

        let native = runtime
            .natives
            .lookup(method.class.name(), &info.name, &info.descriptor_str);
        if let Some(native) = native {
            let (this, args) = split_receiver(&method, args)?;
            let class = Arc::clone(&method.class);
            let result = native(&mut NativeEnv::new(runtime, class, this, args, self.id, effects));
            if let Some(lock) = &lock {
                release(lock, self.id, effects);
            }
            let value = result?;
            let frame = self.frame_mut()?;
            if let (Some(value), Some(_)) = (value, &info.descriptor.return_type) {
                frame.stack.push(value)?;
            }
            frame.pc += 1;
            return Ok(());
        }

        let failure = if info.code.is_none() {
            let name = method.qualified_name();
            Some(if info.is_abstract() {
                Exception::new_vm_msg(ABSTRACT_METHOD_ERROR, name)
            } else {
                Exception::new_vm_msg(UNSATISFIED_LINK_ERROR, name)
            })
        } else if self.depth >= runtime.config.max_call_depth {
            Some(Exception::new_vm(STACK_OVERFLOW_ERROR))
        } else {
            None
        };
        if let Some(exception) = failure {
            if let Some(lock) = &lock {
                release(lock, self.id, effects);
            }
            return Err(exception.into());
        }
        let mut callee = Frame::new(method, args, FrameKind::Method)?;
        callee.monitors.extend(lock);
        self.push_frame(callee);
        Ok(())
    }

    fn return_from_frame(
        &mut self,
        effects: &mut Effects,
        value: Option<Value>,
    ) -> Result<(), VmError> {
        let frame = self
            .pop_frame(effects)
            .ok_or_else(|| VmError::Unsupported("return without a frame".to_string()))?;
        if frame.kind == FrameKind::ClassInit {
            frame.class().set_init_state(InitState::Done);
            debug!(class = frame.class().name(), thread = %self.id, "class initialized");
        }
        match self.top_frame.as_deref_mut() {
            // the instruction that triggered initialization runs again
            Some(_) if frame.kind == FrameKind::ClassInit => {}
            Some(caller) => {
                if let Some(value) = value {
                    caller.stack.push(value)?;
                }
                caller.pc += 1;
            }
            None if self.entry.is_some() => {}
            None => self.terminate(Completion::Returned(value)),
        }
        Ok(())
    }

    /// Transfers control to the nearest handler for `exception`, popping
    /// frames and releasing their monitors on the way.
    fn unwind(
        &mut self,
        runtime: &Runtime,
        effects: &mut Effects,
        exception: Exception,
    ) -> Result<(), VmError> {
        let mut thrown = runtime.materialize(exception)?;
        loop {
            let Some(frame) = self.top_frame.as_deref_mut() else {
                self.entry = None;
                let value = runtime.thrown_value(&thrown);
                info!(thread = %self.id, exception = %value, "uncaught exception");
                self.terminate(Completion::Threw(value));
                return Ok(());
            };
            if let Some(handler) = find_handler(runtime, frame, &thrown) {
                frame.stack.clear();
                frame.stack.push(Value::from_ref(thrown))?;
                frame.pc = handler;
                return Ok(());
            }
            if let Some(popped) = self.pop_frame(effects) {
                if popped.kind == FrameKind::ClassInit {
                    popped.class().set_init_state(InitState::Failed);
                    thrown = initializer_failure(runtime, thrown)?;
                }
            }
        }
    }

    fn abort(&mut self, effects: &mut Effects, fatal: VmError) {
        error!(thread = %self.id, location = ?self.location(), %fatal, "aborting thread");
        while let Some(frame) = self.pop_frame(effects) {
            if frame.kind == FrameKind::ClassInit {
                frame.class().set_init_state(InitState::Failed);
            }
        }
        self.entry = None;
        self.reacquire = None;
        self.terminate(Completion::Aborted(fatal));
    }

    fn terminate(&mut self, completion: Completion) {
        debug!(thread = %self.id, ?completion, "thread terminated");
        self.status = ThreadStatus::Terminated;
        self.blocker = None;
        self.completion = Some(completion);
    }

    fn block_on(&mut self, monitor: ObjectRef) {
        self.status = ThreadStatus::Blocked;
        self.blocker = Some(Blocker::Monitor(monitor));
    }

    fn await_init(&mut self, class: Arc<Class>) {
        debug!(thread = %self.id, class = class.name(), "waiting for class initialization");
        self.status = ThreadStatus::Waiting;
        self.blocker = Some(Blocker::ClassInit(class));
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, VmError> {
        self.top_frame
            .as_deref_mut()
            .ok_or_else(|| VmError::Unsupported("thread has no frame".to_string()))
    }

    fn push_frame(&mut self, mut frame: Frame) {
        frame.previous_frame = self.top_frame.take();
        self.top_frame = Some(Box::new(frame));
        self.depth += 1;
    }

    /// Pops the top frame, releasing the monitors it still holds.
    fn pop_frame(&mut self, effects: &mut Effects) -> Option<Box<Frame>> {
        let mut frame = self.top_frame.take()?;
        self.top_frame = frame.previous_frame.take();
        self.depth -= 1;
        for monitor in frame.monitors.drain(..).rev() {
            release(&monitor, self.id, effects);
        }
        Some(frame)
    }
}

fn release(monitor: &ObjectRef, thread: ThreadId, effects: &mut Effects) {
    match monitor.monitor().lock().exit(thread) {
        Ok(promoted) => effects.woken.extend(promoted),
        Err(_) => debug!(%thread, ?monitor, "monitor already released"),
    }
}

fn split_receiver(
    method: &ResolvedMethod,
    mut args: Vec<Value>,
) -> NativeResult<(Option<ObjectRef>, Vec<Value>)> {
    if method.method().is_static() {
        return Ok((None, args));
    }
    if args.is_empty() {
        return Err(VmError::StackUnderflow.into());
    }
    let this = args.remove(0).as_object()?;
    Ok((Some(this), args))
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("depth", &self.depth)
            .finish()
    }
}

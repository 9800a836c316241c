use crate::consts::{EXIT_FATAL, EXIT_UNCAUGHT};
use crate::runtime::{
    ClassProvider, Exception, Fault, NativeRegistry, NativeResult, Runtime, StdStream, VmConfig,
    VmError,
    famous_classes::{INCOMPATIBLE_CLASS_CHANGE_ERROR, NO_SUCH_METHOD_ERROR, STRING},
    scheduler::{Scheduler, TraceEntry, Turn},
    thread::{Completion, StackTraceElement, Thread, ThreadId, ThreadStatus},
    value::Value,
};
use tracing::{debug, info};

const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

/// One virtual machine: a [`Runtime`] plus the threads scheduled on it.
pub struct Vm {
    runtime: Runtime,
    scheduler: Scheduler,
}

/// How a run ended.
#[derive(Debug, Clone)]
pub struct Termination {
    pub exit_status: i32,
    /// Completion of the first root thread, `None` if it never finished.
    pub main: Option<Completion>,
    pub threads: Vec<ThreadReport>,
    /// The turn budget ran out before the program settled.
    pub exhausted: bool,
}

#[derive(Debug, Clone)]
pub struct ThreadReport {
    pub id: ThreadId,
    pub name: String,
    pub status: ThreadStatus,
    pub completion: Option<Completion>,
}

impl Vm {
    pub fn new(provider: impl ClassProvider + 'static) -> Self {
        Self::with_config(VmConfig::default(), provider)
    }

    pub fn with_config(config: VmConfig, provider: impl ClassProvider + 'static) -> Self {
        Self {
            runtime: Runtime::new(config, Box::new(provider)),
            scheduler: Scheduler::default(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.runtime.natives
    }

    /// Starts a root thread at a static method. The declaring class is
    /// loaded now and initialized by the thread's first step.
    pub fn spawn(
        &mut self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> NativeResult<ThreadId> {
        let class = self.runtime.load_class(class_name)?;
        let method = class.find_method(method_name, descriptor).ok_or_else(|| {
            Exception::new_vm_msg(
                NO_SUCH_METHOD_ERROR,
                format!("{class_name}.{method_name}{descriptor}"),
            )
        })?;
        if !method.method().is_static() {
            return Err(Exception::new_vm_msg(
                INCOMPATIBLE_CLASS_CHANGE_ERROR,
                format!("{} is not static", method.qualified_name()),
            )
            .into());
        }
        let expected = method.method().arg_count();
        if args.len() != expected {
            return Err(VmError::Unsupported(format!(
                "{} takes {expected} arguments, {} given",
                method.qualified_name(),
                args.len()
            ))
            .into());
        }
        let id = self.runtime.next_thread_id();
        let name = if id.0 == 0 {
            "main".to_string()
        } else {
            format!("Thread-{}", id.0)
        };
        self.runtime.new_thread_object(id, &name)?;
        debug!(thread = %id, method = ?method, "spawning root thread");
        self.scheduler.add(Thread::new(id, name, method, args));
        Ok(id)
    }

    /// Runs one scheduler turn. `false` once no thread can make progress or
    /// the program called `System.exit`.
    pub fn step(&mut self) -> bool {
        matches!(self.scheduler.turn(&self.runtime), Turn::Ran)
    }

    /// Steps until nothing is runnable. Returns `true` if the turn budget
    /// ran out first.
    pub fn run_until_idle(&mut self) -> bool {
        loop {
            if let Some(limit) = self.runtime.config.max_turns {
                if self.scheduler.turns() >= limit {
                    info!(turns = limit, "turn budget exhausted");
                    return true;
                }
            }
            if !self.step() {
                return false;
            }
        }
    }

    /// Runs `main_class.main(String[])` and every thread it starts.
    pub fn run(&mut self, main_class: &str, args: &[&str]) -> Result<Termination, VmError> {
        match self.start_main(main_class, args) {
            Ok(_) => {}
            Err(Fault::Throw(exception)) => {
                let object = self.runtime.materialize(exception)?;
                let thrown = self.runtime.thrown_value(&object);
                info!(class = main_class, %thrown, "could not start main");
                return Ok(Termination {
                    exit_status: EXIT_UNCAUGHT,
                    main: Some(Completion::Threw(thrown)),
                    threads: self.reports(),
                    exhausted: false,
                });
            }
            Err(Fault::Fatal(error)) => return Err(error),
        }
        let exhausted = self.run_until_idle();
        Ok(self.termination(exhausted))
    }

    fn start_main(&mut self, main_class: &str, args: &[&str]) -> NativeResult<ThreadId> {
        let array = self
            .runtime
            .new_array(&format!("[L{STRING};"), args.len() as i32)?;
        for (index, arg) in args.iter().enumerate() {
            let value = Value::from_ref(self.runtime.new_string(arg)?);
            array.array_store(index as i32, value)?;
        }
        self.spawn(main_class, "main", MAIN_DESCRIPTOR, vec![Value::from_ref(array)])
    }

    /// Summarizes the threads as they stand now.
    pub fn termination(&self, exhausted: bool) -> Termination {
        let threads = self.reports();
        let main = threads.first().and_then(|t| t.completion.clone());
        let aborted = threads
            .iter()
            .any(|t| matches!(t.completion, Some(Completion::Aborted(_))));
        let exit_status = match (self.scheduler.exit_status(), &main) {
            (Some(status), _) => status,
            (None, Some(Completion::Threw(_))) => EXIT_UNCAUGHT,
            (None, _) if aborted => EXIT_FATAL,
            _ => 0,
        };
        Termination {
            exit_status,
            main,
            threads,
            exhausted,
        }
    }

    fn reports(&self) -> Vec<ThreadReport> {
        self.scheduler
            .threads()
            .iter()
            .map(|t| ThreadReport {
                id: t.id(),
                name: t.name().to_string(),
                status: t.status(),
                completion: t.completion().cloned(),
            })
            .collect()
    }

    pub fn thread_status(&self, thread: ThreadId) -> Option<ThreadStatus> {
        self.scheduler.thread(thread).map(Thread::status)
    }

    pub fn completion(&self, thread: ThreadId) -> Option<&Completion> {
        self.scheduler.thread(thread)?.completion()
    }

    pub fn backtrace(&self, thread: ThreadId) -> Result<Vec<StackTraceElement>, VmError> {
        self.scheduler
            .thread(thread)
            .map(Thread::backtrace)
            .ok_or(VmError::NoSuchThread(thread))
    }

    pub fn threads(&self) -> &[Thread] {
        self.scheduler.threads()
    }

    pub fn trace(&self) -> &[TraceEntry] {
        self.scheduler.trace()
    }

    pub fn captured_output(&self, stream: StdStream) -> String {
        self.runtime.captured_output(stream)
    }
}

use crate::consts::DEFAULT_MAX_CALL_DEPTH;

/// Knobs of a [`Vm`](crate::runtime::Vm). Every field has a working default.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Invocations deeper than this raise `StackOverflowError`.
    pub max_call_depth: usize,
    /// Reject classes whose native methods have no registered host function
    /// when they are linked, instead of when they are first called.
    pub eager_native_linking: bool,
    /// Record every executed step in [`Vm::trace`](crate::runtime::Vm::trace).
    pub record_trace: bool,
    /// Keep `System.out`/`System.err` output in memory.
    pub capture_output: bool,
    /// Stop after this many scheduler turns.
    pub max_turns: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            eager_native_linking: true,
            record_trace: false,
            capture_output: false,
            max_turns: None,
        }
    }
}

impl VmConfig {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_eager_native_linking(mut self, eager: bool) -> Self {
        self.eager_native_linking = eager;
        self
    }

    pub fn with_trace(mut self, record: bool) -> Self {
        self.record_trace = record;
        self
    }

    pub fn with_captured_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn with_max_turns(mut self, turns: u64) -> Self {
        self.max_turns = Some(turns);
        self
    }
}

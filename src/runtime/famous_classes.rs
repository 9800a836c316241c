pub const OBJECT: &str = "java/lang/Object";
pub const CLASS: &str = "java/lang/Class";
pub const STRING: &str = "java/lang/String";
pub const STRING_BUILDER: &str = "java/lang/StringBuilder";
pub const SYSTEM: &str = "java/lang/System";
pub const THREAD: &str = "java/lang/Thread";
pub const RUNNABLE: &str = "java/lang/Runnable";
pub const CLONEABLE: &str = "java/lang/Cloneable";
pub const SERIALIZABLE: &str = "java/io/Serializable";
pub const PRINT_STREAM: &str = "java/io/PrintStream";

pub const THROWABLE: &str = "java/lang/Throwable";
pub const EXCEPTION: &str = "java/lang/Exception";
pub const ERROR: &str = "java/lang/Error";
pub const RUNTIME_EXCEPTION: &str = "java/lang/RuntimeException";
pub const ARITHMETIC_EXCEPTION: &str = "java/lang/ArithmeticException";
pub const INDEX_OUT_OF_BOUNDS_EXCEPTION: &str = "java/lang/IndexOutOfBoundsException";
pub const ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION: &str = "java/lang/ArrayIndexOutOfBoundsException";
pub const STRING_INDEX_OUT_OF_BOUNDS_EXCEPTION: &str = "java/lang/StringIndexOutOfBoundsException";
pub const NEGATIVE_ARRAY_SIZE_EXCEPTION: &str = "java/lang/NegativeArraySizeException";
pub const NULL_POINTER_EXCEPTION: &str = "java/lang/NullPointerException";
pub const CLASS_CAST_EXCEPTION: &str = "java/lang/ClassCastException";
pub const ARRAY_STORE_EXCEPTION: &str = "java/lang/ArrayStoreException";
pub const ILLEGAL_ARGUMENT_EXCEPTION: &str = "java/lang/IllegalArgumentException";
pub const ILLEGAL_STATE_EXCEPTION: &str = "java/lang/IllegalStateException";
pub const ILLEGAL_MONITOR_STATE_EXCEPTION: &str = "java/lang/IllegalMonitorStateException";
pub const CLONE_NOT_SUPPORTED_EXCEPTION: &str = "java/lang/CloneNotSupportedException";
pub const INTERRUPTED_EXCEPTION: &str = "java/lang/InterruptedException";
pub const ILLEGAL_THREAD_STATE_EXCEPTION: &str = "java/lang/IllegalThreadStateException";
pub const UNSUPPORTED_OPERATION_EXCEPTION: &str = "java/lang/UnsupportedOperationException";

pub const LINKAGE_ERROR: &str = "java/lang/LinkageError";
pub const NO_CLASS_DEF_FOUND_ERROR: &str = "java/lang/NoClassDefFoundError";
pub const CLASS_CIRCULARITY_ERROR: &str = "java/lang/ClassCircularityError";
pub const CLASS_FORMAT_ERROR: &str = "java/lang/ClassFormatError";
pub const INCOMPATIBLE_CLASS_CHANGE_ERROR: &str = "java/lang/IncompatibleClassChangeError";
pub const ABSTRACT_METHOD_ERROR: &str = "java/lang/AbstractMethodError";
pub const NO_SUCH_METHOD_ERROR: &str = "java/lang/NoSuchMethodError";
pub const NO_SUCH_FIELD_ERROR: &str = "java/lang/NoSuchFieldError";
pub const INSTANTIATION_ERROR: &str = "java/lang/InstantiationError";
pub const UNSATISFIED_LINK_ERROR: &str = "java/lang/UnsatisfiedLinkError";
pub const EXCEPTION_IN_INITIALIZER_ERROR: &str = "java/lang/ExceptionInInitializerError";
pub const BOOTSTRAP_METHOD_ERROR: &str = "java/lang/BootstrapMethodError";
pub const VIRTUAL_MACHINE_ERROR: &str = "java/lang/VirtualMachineError";
pub const STACK_OVERFLOW_ERROR: &str = "java/lang/StackOverflowError";
pub const OUT_OF_MEMORY_ERROR: &str = "java/lang/OutOfMemoryError";

/// Built-in throwables as `(class, superclass)`, superclasses first.
pub const THROWABLE_HIERARCHY: &[(&str, &str)] = &[
    (THROWABLE, OBJECT),
    (EXCEPTION, THROWABLE),
    (ERROR, THROWABLE),
    (RUNTIME_EXCEPTION, EXCEPTION),
    (ARITHMETIC_EXCEPTION, RUNTIME_EXCEPTION),
    (INDEX_OUT_OF_BOUNDS_EXCEPTION, RUNTIME_EXCEPTION),
    (ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION, INDEX_OUT_OF_BOUNDS_EXCEPTION),
    (STRING_INDEX_OUT_OF_BOUNDS_EXCEPTION, INDEX_OUT_OF_BOUNDS_EXCEPTION),
    (NEGATIVE_ARRAY_SIZE_EXCEPTION, RUNTIME_EXCEPTION),
    (NULL_POINTER_EXCEPTION, RUNTIME_EXCEPTION),
    (CLASS_CAST_EXCEPTION, RUNTIME_EXCEPTION),
    (ARRAY_STORE_EXCEPTION, RUNTIME_EXCEPTION),
    (ILLEGAL_ARGUMENT_EXCEPTION, RUNTIME_EXCEPTION),
    (ILLEGAL_STATE_EXCEPTION, RUNTIME_EXCEPTION),
    (ILLEGAL_MONITOR_STATE_EXCEPTION, RUNTIME_EXCEPTION),
    (UNSUPPORTED_OPERATION_EXCEPTION, RUNTIME_EXCEPTION),
    (ILLEGAL_THREAD_STATE_EXCEPTION, ILLEGAL_ARGUMENT_EXCEPTION),
    (CLONE_NOT_SUPPORTED_EXCEPTION, EXCEPTION),
    (INTERRUPTED_EXCEPTION, EXCEPTION),
    (LINKAGE_ERROR, ERROR),
    (NO_CLASS_DEF_FOUND_ERROR, LINKAGE_ERROR),
    (CLASS_CIRCULARITY_ERROR, LINKAGE_ERROR),
    (CLASS_FORMAT_ERROR, LINKAGE_ERROR),
    (INCOMPATIBLE_CLASS_CHANGE_ERROR, LINKAGE_ERROR),
    (ABSTRACT_METHOD_ERROR, INCOMPATIBLE_CLASS_CHANGE_ERROR),
    (NO_SUCH_METHOD_ERROR, INCOMPATIBLE_CLASS_CHANGE_ERROR),
    (NO_SUCH_FIELD_ERROR, INCOMPATIBLE_CLASS_CHANGE_ERROR),
    (INSTANTIATION_ERROR, INCOMPATIBLE_CLASS_CHANGE_ERROR),
    (UNSATISFIED_LINK_ERROR, LINKAGE_ERROR),
    (EXCEPTION_IN_INITIALIZER_ERROR, LINKAGE_ERROR),
    (BOOTSTRAP_METHOD_ERROR, LINKAGE_ERROR),
    (VIRTUAL_MACHINE_ERROR, ERROR),
    (STACK_OVERFLOW_ERROR, VIRTUAL_MACHINE_ERROR),
    (OUT_OF_MEMORY_ERROR, VIRTUAL_MACHINE_ERROR),
];

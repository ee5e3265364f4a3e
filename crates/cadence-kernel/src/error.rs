use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KernelError {
    #[error("unknown option `{0}' (use -h for help)")]
    UnknownOption(String),

    #[error("option `{option}' does not take a value (got `{value}')")]
    UnexpectedValue { option: String, value: String },

    #[error("unknown action `{0}' (use -h for help)")]
    UnknownAction(String),

    #[error("action `{action}' requires {expected} argument(s)")]
    MissingArgument { action: String, expected: usize },

    #[error("no test named \"{0}\"")]
    UnknownTest(String),
}

/// Aborts the kernel with a diagnostic naming the source location.
///
/// Contract violations are bugs in kernel code, so there is nothing to return
/// to: the message goes to the log and the calling thread panics. A panic on
/// any kernel thread halts the whole emulated machine.
#[macro_export]
macro_rules! kpanic {
    ($($arg:tt)+) => {
        $crate::error::kernel_panic(file!(), line!(), format_args!($($arg)+))
    };
}

/// `assert!` for kernel contracts. Failures go through [`kpanic!`].
#[macro_export]
macro_rules! kassert {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::kpanic!("assertion `{}' failed", stringify!($cond));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::kpanic!($($arg)+);
        }
    };
}

#[cold]
#[track_caller]
pub fn kernel_panic(file: &str, line: u32, args: core::fmt::Arguments<'_>) -> ! {
    log::error!("Kernel PANIC at {}:{}: {}", file, line, args);
    panic!("Kernel PANIC at {}:{}: {}", file, line, args)
}

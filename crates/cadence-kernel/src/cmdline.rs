//! Kernel command line.
//!
//! The command line is a list of options followed by a list of actions:
//!
//! ```text
//! [-h] [-q] [-mlfqs] [run TEST | list]...
//! ```
//!
//! Options start with `-`; the first word that does not ends the options.
//! None of the options take a value, so `-q=1` is rejected.

use crate::error::KernelError;
use crate::sync::SchedMode;

/// Settings fixed at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootOptions {
    pub mode: SchedMode,
    /// Power off once the actions have run.
    pub power_off: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run the named self-test.
    Run(String),
    /// List the available self-tests.
    List,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandLine {
    pub options: BootOptions,
    pub actions: Vec<Action>,
    /// `-h` was given; the caller should print [`usage`] and stop.
    pub help: bool,
}

/// Parses a kernel command line, already split into words.
pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<CommandLine, KernelError> {
    let mut cmdline = CommandLine::default();
    let mut words = args.iter().map(AsRef::<str>::as_ref).peekable();

    while let Some(word) = words.next_if(|w| w.starts_with('-')) {
        let (name, value) = match word.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (word, None),
        };
        if let Some(value) = value {
            return Err(KernelError::UnexpectedValue {
                option: name.to_string(),
                value: value.to_string(),
            });
        }
        match name {
            "-h" => cmdline.help = true,
            "-q" => cmdline.options.power_off = true,
            "-mlfqs" => cmdline.options.mode = SchedMode::Mlfqs,
            _ => return Err(KernelError::UnknownOption(name.to_string())),
        }
    }

    while let Some(word) = words.next() {
        match word {
            "run" => match words.next() {
                Some(test) => cmdline.actions.push(Action::Run(test.to_string())),
                None => {
                    return Err(KernelError::MissingArgument {
                        action: word.to_string(),
                        expected: 1,
                    })
                }
            },
            "list" => cmdline.actions.push(Action::List),
            _ => return Err(KernelError::UnknownAction(word.to_string())),
        }
    }

    Ok(cmdline)
}

pub fn usage() -> &'static str {
    "\
Command line syntax: [OPTION...] [ACTION...]
Options must precede actions.
Actions are executed in the order specified.

Available actions:
  run TEST           Run TEST.
  list               List available tests.

Options:
  -h                 Print this help message and power off.
  -q                 Power off VM after actions or on panic.
  -mlfqs             Use multi-level feedback queue scheduler.
"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_line() {
        let cmdline = parse::<&str>(&[]).unwrap();
        assert_eq!(cmdline, CommandLine::default());
        assert_eq!(cmdline.options.mode, SchedMode::Priority);
        assert!(!cmdline.options.power_off);
    }

    #[test]
    fn options_then_actions() {
        let cmdline = parse(&["-q", "-mlfqs", "run", "mlfqs-load-1", "list"]).unwrap();
        assert_eq!(
            cmdline.options,
            BootOptions {
                mode: SchedMode::Mlfqs,
                power_off: true,
            }
        );
        assert_eq!(
            cmdline.actions,
            vec![Action::Run("mlfqs-load-1".to_string()), Action::List]
        );
    }

    #[test]
    fn help_flag() {
        assert!(parse(&["-h"]).unwrap().help);
    }

    #[test]
    fn options_after_actions_are_not_options() {
        assert_eq!(
            parse(&["list", "-q"]),
            Err(KernelError::UnknownAction("-q".to_string()))
        );
    }

    #[test]
    fn unknown_option() {
        assert_eq!(
            parse(&["-x"]),
            Err(KernelError::UnknownOption("-x".to_string()))
        );
    }

    #[test]
    fn option_with_value() {
        assert_eq!(
            parse(&["-mlfqs=yes"]),
            Err(KernelError::UnexpectedValue {
                option: "-mlfqs".to_string(),
                value: "yes".to_string(),
            })
        );
    }

    #[test]
    fn run_needs_a_test_name() {
        assert_eq!(
            parse(&["run"]),
            Err(KernelError::MissingArgument {
                action: "run".to_string(),
                expected: 1,
            })
        );
    }

    #[test]
    fn unknown_action() {
        assert_eq!(
            parse(&["boot"]),
            Err(KernelError::UnknownAction("boot".to_string()))
        );
    }

    #[test]
    fn usage_mentions_every_option() {
        for flag in ["-h", "-q", "-mlfqs", "run TEST", "list"] {
            assert!(usage().contains(flag), "usage is missing {flag}");
        }
    }
}

use anyhow::Context;
use cadence_kernel::cmdline::{self, Action};
use cadence_kernel::{selftest, Kernel};
use clap::{Parser, Subcommand};
use log::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the kernel with a kernel command line
    Boot {
        /// Kernel options and actions, e.g. `-mlfqs run mlfqs-load-1`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        cmdline: Vec<String>,
    },
    /// List the built-in self-tests
    List,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Boot { cmdline } => boot(&cmdline),
        Commands::List => {
            for name in selftest::list() {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn boot(args: &[String]) -> anyhow::Result<()> {
    let cmdline = cmdline::parse(args).context("bad kernel command line")?;
    if cmdline.help {
        print!("{}", cmdline::usage());
        return Ok(());
    }

    if cmdline.actions.is_empty() {
        warn!("no actions given; use `list` or `run TEST`");
    }

    let kernel = Kernel::boot(cmdline.options);
    println!("Boot complete ({} scheduler).", kernel.mode());

    for action in &cmdline.actions {
        match action {
            Action::Run(test) => {
                info!("running self-test `{}'", test);
                println!("Executing '{}':", test);
                for line in selftest::run_test(&kernel, test)? {
                    println!("{}", line);
                }
                println!("Execution of '{}' complete.", test);
            }
            Action::List => {
                for name in selftest::list() {
                    println!("{}", name);
                }
            }
        }
    }

    if cmdline.options.power_off {
        println!("Powering off...");
    }
    Ok(())
}

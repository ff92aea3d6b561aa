use std::process;

use anyhow::Result;
use lox_lib::{run_file, run_prompt, Status};
use structopt::StructOpt;

/// Run a lox script, or start an interactive prompt if none is given.
#[derive(StructOpt)]
struct Cli {
    /// Path to a lox file.
    #[structopt(parse(from_os_str))]
    script: Option<std::path::PathBuf>,
}

/// Exit code for command line misuse.
const USAGE: i32 = 64;

fn main() -> Result<()> {
    env_logger::init();

    let args = match Cli::from_args_safe() {
        Ok(args) => args,
        // --help and --version are not misuse
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            eprintln!("{}", err.message);
            process::exit(USAGE);
        }
    };

    match args.script {
        Some(path) => {
            let status = run_file(path)?;
            if status != Status::Ok {
                process::exit(status.exit_code());
            }
            Ok(())
        }
        None => run_prompt(),
    }
}

use std::fs;
use std::process::ExitCode;

use lisper::{Environment, Interpreter, Value, print_result};

const USAGE: &str = "usage: lisper [--quiet] <file>...";

// Exit codes
const PARSE_FAILURE: u8 = 1;
const IO_FAILURE: u8 = 2;
const ERROR_RESULT: u8 = 3;

struct Options {
    quiet: bool,
    paths: Vec<String>,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        quiet: false,
        paths: Vec::new(),
    };
    for arg in args {
        match arg.as_str() {
            "-q" | "--quiet" => options.quiet = true,
            flag if flag.starts_with('-') => return Err(format!("unknown option '{}'", flag)),
            _ => options.paths.push(arg),
        }
    }
    if options.paths.is_empty() {
        return Err("no input files".to_string());
    }
    Ok(options)
}

fn main() -> ExitCode {
    lisper::init_tracing();

    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("lisper: {}\n{}", message, USAGE);
            return ExitCode::from(IO_FAILURE);
        }
    };

    // Every file shares one global environment, so later files see earlier
    // definitions.
    let env = Environment::new_global_populated();
    let mut last = Value::Nil;
    for path in &options.paths {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("lisper: cannot read {}: {}", path, err);
                return ExitCode::from(IO_FAILURE);
            }
        };
        tracing::debug!(path = %path, bytes = source.len(), "evaluating file");
        match Interpreter::new(&source).evaluate_all(&env) {
            Ok(value) => last = value,
            Err(err) => {
                if err.pretty_print(path, &source).is_err() {
                    eprintln!("{}: {}", path, err);
                }
                return ExitCode::from(PARSE_FAILURE);
            }
        }
    }

    if !options.quiet || last.is_error() {
        if let Err(err) = print_result(&last, &env) {
            eprintln!("lisper: {}", err);
            return ExitCode::from(IO_FAILURE);
        }
    }
    if last.is_error() {
        ExitCode::from(ERROR_RESULT)
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_parse_args() {
        let options = parse_args(args(&["--quiet", "a.lisp", "b.lisp"])).unwrap();
        assert!(options.quiet);
        assert_eq!(options.paths, vec!["a.lisp", "b.lisp"]);

        let options = parse_args(args(&["main.lisp"])).unwrap();
        assert!(!options.quiet);
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["--quiet"])).is_err());
        assert!(parse_args(args(&["--verbose", "a.lisp"])).is_err());
    }
}

use crate::environment::EnvRef;
use crate::evaluator::evaluate;
use crate::reader::{ParseError, ParseResult, Reader};
use crate::types::Value;
use std::io;

/// Reads and evaluates a program one top-level expression at a time, so
/// definitions made by earlier expressions are visible to later ones.
pub struct Interpreter {
    reader: Reader,
}

impl Interpreter {
    /// Tokenizes `source` up front; reading happens lazily.
    pub fn new(source: &str) -> Self {
        Interpreter {
            reader: Reader::from_source(source),
        }
    }

    /// The next top-level expression, or `None` once the source is exhausted.
    pub fn read(&mut self) -> ParseResult<Option<Value>> {
        self.reader.read_one()
    }

    /// Evaluates every remaining expression in `env` and returns the last
    /// value (nil for an empty program). Error values do not stop the run;
    /// a parse error does, after everything before it has been evaluated.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn evaluate_all(&mut self, env: &EnvRef) -> Result<Value, ParseError> {
        let mut last = Value::Nil;
        loop {
            tracing::debug!(token = self.reader.position(), "reading top-level expression");
            match self.read()? {
                Some(expr) => last = evaluate(&expr, env),
                None => return Ok(last),
            }
        }
    }
}

/// Evaluates all of `source` in `env`.
pub fn run_str(source: &str, env: &EnvRef) -> Result<Value, ParseError> {
    Interpreter::new(source).evaluate_all(env)
}

/// Writes a result the way the drivers show it: values to the output
/// stream, errors to the diagnostic stream.
pub fn print_result(value: &Value, env: &EnvRef) -> io::Result<()> {
    let io = env.borrow().io();
    match value {
        Value::Error(_) => io.write_diagnostic(&format!("{}\n", value)),
        other => io.write_output(&format!("{}\n", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::io::IoConfig;
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn assert_run(input: &str, expected: &str) {
        let env = Environment::new_global_populated();
        let result = run_str(input, &env).expect("program should parse");
        assert_eq!(result.to_string(), expected, "Input: '{}'", input);
    }

    #[test]
    fn test_read_one_at_a_time() {
        let mut interpreter = Interpreter::new("(define x 1) x ; trailing comment");
        assert_eq!(
            interpreter.read().unwrap().map(|v| v.to_string()),
            Some("(define x 1)".to_string())
        );
        assert_eq!(interpreter.read().unwrap(), Some(Value::symbol("x")));
        assert_eq!(interpreter.read().unwrap(), None);
        assert_eq!(interpreter.read().unwrap(), None);
    }

    #[test]
    fn test_empty_program_is_nil() {
        assert_run("", "nil");
        assert_run("  ; only a comment\n", "nil");
    }

    #[test]
    fn test_definitions_visible_to_later_expressions() {
        assert_run(
            "(define (square x) (* x x))
             (define nums '(1 2 3))
             (map square nums)",
            "(1 4 9)",
        );
    }

    #[test]
    fn test_error_values_do_not_stop_the_program() {
        assert_run("(car 5) (+ 1 2)", "3");
    }

    #[test]
    fn test_parse_error_after_earlier_effects() {
        let env = Environment::new_global_populated();
        let result = run_str("(define seen 1) (+ 1", &env);
        assert!(matches!(result, Err(ParseError::UnexpectedEof(_))));
        assert_eq!(env.borrow().get("seen"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_shared_environment_across_runs() {
        let env = Environment::new_global_populated();
        run_str("(define counter 10)", &env).unwrap();
        assert_eq!(run_str("(+ counter 1)", &env).unwrap(), Value::Number(11.0));
    }

    #[test]
    fn test_print_result_routes_errors() {
        let (io, output, diagnostic) = IoConfig::capture();
        let env = Environment::new_global_with_io(Rc::new(io));
        let value = run_str("(list 1 \"two\")", &env).unwrap();
        print_result(&value, &env).unwrap();
        let error = run_str("(car 5)", &env).unwrap();
        print_result(&error, &env).unwrap();
        assert_eq!(output.contents(), "(1 \"two\")\n");
        assert_eq!(diagnostic.contents(), "Error: car: expected list, got number\n");
    }

    #[test]
    fn test_small_programs_end_to_end() {
        assert_run("(define (f x) (* x x)) (f 4)", "16");
        assert_run("(let ((a 5)) a)", "5");
        assert_run("(if #f 1 2)", "2");
        assert_run("(eval '(+ 1 2))", "3");
        assert_run(
            "(defmacro! unless (lambda (c a b) (list 'if c b a))) (unless #f 'yes 'no)",
            "yes",
        );
    }
}

// Declare modules publicly so they are part of the library interface
pub mod environment;
pub mod evaluator;
pub mod interpreter;
pub mod io;
pub mod lexer;
pub mod pretty_print;
pub mod primitives;
pub mod reader;
pub mod source;
pub mod special_forms;
pub mod types;

pub use environment::{EnvRef, Environment};
pub use evaluator::{EvalError, MAX_EVAL_DEPTH, apply_value, evaluate};
pub use interpreter::{Interpreter, print_result, run_str};
pub use io::{IoConfig, SharedBuffer};
pub use lexer::{Token, TokenKind, tokenize};
pub use reader::{ParseError, ParseResult, Reader, read_all, read_str};
pub use source::Span;
pub use special_forms::{SpecialForm, special_form_identifiers};
pub use types::{Callable, Closure, HashValue, NativeFunc, Procedure, Value};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Installs a stderr `tracing` subscriber filtered by `RUST_LOG`, e.g.
/// `RUST_LOG=lisper=debug` or `RUST_LOG=lisper=trace`. Does nothing when
/// `RUST_LOG` is unset. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

use crate::environment::{EnvRef, Environment};
use crate::reader::ParseError;
use crate::special_forms::{self, SpecialForm};
use crate::types::{Callable, Closure, Procedure, Value};
use std::cell::Cell;
use std::rc::Rc;
use thiserror::Error;

/// Nested `evaluate` calls allowed before evaluation gives up with an error.
/// Tail calls run inside the trampoline and do not count against it.
pub const MAX_EVAL_DEPTH: usize = 10_000;

// Stack headroom kept before recursing, and how much to grow by when short.
const RED_ZONE: usize = 128 * 1024;
const STACK_GROWTH: usize = 2 * 1024 * 1024;

// --- Evaluation Error ---

/// Failures raised during evaluation. They are carried inside
/// [`Value::Error`] and flow through the program like any other value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("not a procedure: {0}")]
    NotAProcedure(String),
    #[error("'{form}' expects {expected} arguments, got {got}")]
    Arity {
        form: String,
        expected: String,
        got: usize,
    },
    #[error("'{form}' expects a symbol, got {found}")]
    NotASymbol { form: String, found: String },
    #[error("invalid special form: {0}")]
    InvalidSpecialForm(String),
    #[error("{context}: expected {expected}, got {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },
    #[error("'{0}' not found in any enclosing scope")]
    NotFound(String),
    #[error("maximum evaluation depth of {0} exceeded")]
    DepthExceeded(usize),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Native(String),
}

impl EvalError {
    pub fn arity(form: &str, expected: impl Into<String>, got: usize) -> Self {
        EvalError::Arity {
            form: form.to_string(),
            expected: expected.into(),
            got,
        }
    }

    pub fn type_mismatch(context: &str, expected: &str, found: &Value) -> Self {
        EvalError::TypeMismatch {
            context: context.to_string(),
            expected: expected.to_string(),
            found: found.type_name(),
        }
    }
}

/// One hop of the trampoline: either a finished value, or an expression to
/// keep evaluating in tail position without growing the native stack.
pub(crate) enum Step {
    Done(Value),
    Continue(Value, EnvRef),
}

impl From<EvalError> for Step {
    fn from(err: EvalError) -> Self {
        Step::Done(Value::Error(err))
    }
}

thread_local! {
    static EVAL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Option<DepthGuard> {
        EVAL_DEPTH.with(|depth| {
            if depth.get() >= MAX_EVAL_DEPTH {
                None
            } else {
                depth.set(depth.get() + 1);
                Some(DepthGuard)
            }
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EVAL_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

// --- Evaluate Function ---

/// Evaluates an expression within the specified environment.
///
/// Literals evaluate to themselves, symbols are looked up (unbound symbols
/// are nil), and non-empty lists are special forms or applications. Tail
/// positions (`if` branches, the last form of `begin`/`let`, closure bodies,
/// macro expansions) replace the current expression instead of recursing.
pub fn evaluate(expr: &Value, env: &EnvRef) -> Value {
    let Some(_guard) = DepthGuard::enter() else {
        return EvalError::DepthExceeded(MAX_EVAL_DEPTH).into();
    };
    stacker::maybe_grow(RED_ZONE, STACK_GROWTH, || run_trampoline(expr, env))
}

fn run_trampoline(expr: &Value, env: &EnvRef) -> Value {
    let mut current_expr = expr.clone();
    let mut current_env = env.clone();

    loop {
        let step = match &current_expr {
            Value::Symbol(name) => return lookup(name, &current_env),
            Value::List(items) if !items.is_empty() => evaluate_list(items, &current_env),
            // Nil, booleans, numbers, strings, characters, hashes, errors,
            // procedures and the empty list are self-evaluating
            _ => return current_expr.clone(),
        };

        match step {
            Step::Done(value) => return value,
            Step::Continue(next_expr, next_env) => {
                tracing::trace!(expr = %next_expr, "tail call");
                current_expr = next_expr;
                current_env = next_env;
            }
        }
    }
}

fn lookup(name: &str, env: &EnvRef) -> Value {
    env.borrow().get(name).unwrap_or(Value::Nil)
}

fn evaluate_list(items: &[Value], env: &EnvRef) -> Step {
    let Some((operator, operands)) = items.split_first() else {
        return Step::Done(Value::list(vec![]));
    };

    if let Some(form) = operator.as_symbol().and_then(SpecialForm::from_name) {
        return special_forms::dispatch(form, operands, env);
    }

    let procedure = match evaluate(operator, env) {
        Value::Procedure(procedure) => procedure,
        error @ Value::Error(_) => return Step::Done(error),
        other => {
            return EvalError::NotAProcedure(format!("{} ({})", operator, other.type_name()))
                .into();
        }
    };

    if procedure.is_macro {
        let expansion = expand_macro(&procedure, operands, env);
        if expansion.is_error() {
            return Step::Done(expansion);
        }
        return Step::Continue(expansion, env.clone());
    }

    // Operands are evaluated left to right and passed on as they are, errors
    // included; the callee decides what an error argument means.
    let evaluated_args: Vec<Value> = operands
        .iter()
        .map(|operand| evaluate(operand, env))
        .collect();

    apply_step(&procedure, evaluated_args, env)
}

fn apply_step(procedure: &Procedure, args: Vec<Value>, env: &EnvRef) -> Step {
    match &procedure.callable {
        Callable::Native { func, .. } => Step::Done(func(&args, env)),
        Callable::Closure(closure) => match bind_parameters(procedure, closure, args) {
            Ok(frame) => Step::Continue(closure.body.clone(), frame),
            Err(err) => err.into(),
        },
    }
}

/// Calls a procedure with already-evaluated arguments and runs it to
/// completion. Used by natives that take procedures (`apply`, `map`).
pub fn apply(procedure: &Procedure, args: Vec<Value>, env: &EnvRef) -> Value {
    match apply_step(procedure, args, env) {
        Step::Done(value) => value,
        Step::Continue(body, frame) => evaluate(&body, &frame),
    }
}

/// Runs a macro's body against the unevaluated call-site forms and returns
/// the expansion. The caller evaluates the expansion.
pub(crate) fn expand_macro(procedure: &Procedure, forms: &[Value], env: &EnvRef) -> Value {
    tracing::debug!(procedure = %procedure, "expanding macro");
    match &procedure.callable {
        Callable::Native { func, .. } => func(forms, env),
        Callable::Closure(closure) => match bind_parameters(procedure, closure, forms.to_vec()) {
            Ok(frame) => evaluate(&closure.body, &frame),
            Err(err) => err.into(),
        },
    }
}

/// Creates the call frame for a closure: a child of the captured
/// environment with parameters bound positionally. A `&` parameter collects
/// the remaining arguments as a list.
fn bind_parameters(
    procedure: &Procedure,
    closure: &Closure,
    args: Vec<Value>,
) -> Result<EnvRef, EvalError> {
    let fixed = closure.params.iter().take_while(|p| *p != "&").count();
    let variadic = fixed < closure.params.len();
    let arity_ok = if variadic {
        args.len() >= fixed
    } else {
        args.len() == fixed
    };
    if !arity_ok {
        let expected = if variadic {
            format!("at least {}", fixed)
        } else {
            fixed.to_string()
        };
        return Err(EvalError::arity(&procedure.to_string(), expected, args.len()));
    }

    let frame = Environment::new_enclosed(closure.env.clone());
    {
        let mut frame_mut = frame.borrow_mut();
        let mut args = args.into_iter();
        for param in &closure.params[..fixed] {
            if let Some(value) = args.next() {
                frame_mut.define(param.as_str(), value);
            }
        }
        if let Some(rest) = closure.params.get(fixed + 1) {
            frame_mut.define(rest.as_str(), Value::list(args.collect()));
        }
    }
    Ok(frame)
}

/// Convenience for hosts holding a procedure value rather than a `Procedure`.
pub fn apply_value(callee: &Value, args: Vec<Value>, env: &EnvRef) -> Value {
    match callee {
        Value::Procedure(procedure) => apply(procedure, args, env),
        other => EvalError::NotAProcedure(other.to_string()).into(),
    }
}

/// Wraps a closure value as a new procedure value; used by `defmacro!`.
pub(crate) fn procedure_value(procedure: Procedure) -> Value {
    Value::Procedure(Rc::new(procedure))
}

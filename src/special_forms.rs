use crate::environment::{EnvRef, Environment};
use crate::evaluator::{EvalError, Step, evaluate, expand_macro, procedure_value};
use crate::reader::{read_all, read_str};
use crate::types::{Callable, Procedure, Value};
use std::collections::HashSet;
use std::rc::Rc;

/// Keywords evaluated by dedicated rules instead of ordinary application.
/// Special forms are recognised by name before any environment lookup, so
/// they cannot be shadowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    Quasiquote,
    If,
    Define,
    Set,
    Lambda,
    Begin,
    Do,
    Let,
    Eval,
    Read,
    DefMacro,
    MacroExpand,
    Alias,
}

impl SpecialForm {
    pub const ALL: [SpecialForm; 14] = [
        SpecialForm::Quote,
        SpecialForm::Quasiquote,
        SpecialForm::If,
        SpecialForm::Define,
        SpecialForm::Set,
        SpecialForm::Lambda,
        SpecialForm::Begin,
        SpecialForm::Do,
        SpecialForm::Let,
        SpecialForm::Eval,
        SpecialForm::Read,
        SpecialForm::DefMacro,
        SpecialForm::MacroExpand,
        SpecialForm::Alias,
    ];

    pub fn from_name(name: &str) -> Option<SpecialForm> {
        SpecialForm::ALL.into_iter().find(|form| form.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            SpecialForm::Quote => "quote",
            SpecialForm::Quasiquote => "quasiquote",
            SpecialForm::If => "if",
            SpecialForm::Define => "define",
            SpecialForm::Set => "set!",
            SpecialForm::Lambda => "lambda",
            SpecialForm::Begin => "begin",
            SpecialForm::Do => "do",
            SpecialForm::Let => "let",
            SpecialForm::Eval => "eval",
            SpecialForm::Read => "read",
            SpecialForm::DefMacro => "defmacro!",
            SpecialForm::MacroExpand => "macroexpand",
            SpecialForm::Alias => "alias",
        }
    }
}

/// Names of every special form, for completion.
pub fn special_form_identifiers() -> HashSet<String> {
    SpecialForm::ALL
        .iter()
        .map(|form| form.name().to_string())
        .collect()
}

/// Runs a special form on its unevaluated arguments.
pub(crate) fn dispatch(form: SpecialForm, args: &[Value], env: &EnvRef) -> Step {
    match form {
        SpecialForm::Quote => evaluate_quote(args),
        SpecialForm::Quasiquote => evaluate_quasiquote(args, env),
        SpecialForm::If => evaluate_if(args, env),
        SpecialForm::Define => evaluate_define(args, env),
        SpecialForm::Set => evaluate_set(args, env),
        SpecialForm::Lambda => evaluate_lambda(args, env),
        SpecialForm::Begin | SpecialForm::Do => evaluate_body(args, env),
        SpecialForm::Let => evaluate_let(args, env),
        SpecialForm::Eval => evaluate_eval(args, env),
        SpecialForm::Read => evaluate_read(args, env),
        SpecialForm::DefMacro => evaluate_defmacro(args, env),
        SpecialForm::MacroExpand => evaluate_macroexpand(args, env),
        SpecialForm::Alias => evaluate_alias(args, env),
    }
}

fn expect_symbol<'a>(form: &str, value: &'a Value) -> Result<&'a str, EvalError> {
    value.as_symbol().ok_or_else(|| EvalError::NotASymbol {
        form: form.to_string(),
        found: value.type_name(),
    })
}

fn evaluate_quote(args: &[Value]) -> Step {
    match args {
        [quoted] => Step::Done(quoted.clone()),
        _ => EvalError::arity("quote", "exactly 1", args.len()).into(),
    }
}

fn evaluate_if(args: &[Value], env: &EnvRef) -> Step {
    let (condition, consequent, alternate) = match args {
        [condition, consequent] => (condition, consequent, None),
        [condition, consequent, alternate] => (condition, consequent, Some(alternate)),
        _ => return EvalError::arity("if", "2 or 3", args.len()).into(),
    };

    let test = evaluate(condition, env);
    if test.is_error() {
        return Step::Done(test);
    }
    if test.is_truthy() {
        Step::Continue(consequent.clone(), env.clone())
    } else {
        match alternate {
            Some(alternate) => Step::Continue(alternate.clone(), env.clone()),
            None => Step::Done(Value::Nil),
        }
    }
}

fn evaluate_define(args: &[Value], env: &EnvRef) -> Step {
    let [target, value_expr, ..] = args else {
        return EvalError::arity("define", "at least 2", args.len()).into();
    };
    let name = match expect_symbol("define", target) {
        Ok(name) => name,
        Err(err) => return err.into(),
    };
    let value = evaluate(value_expr, env);
    env.borrow_mut().define(name, value);
    Step::Done(Value::Nil)
}

/// `(set! name value)` writes into the current frame; `(set! name value outer)`
/// updates the nearest enclosing binding instead.
fn evaluate_set(args: &[Value], env: &EnvRef) -> Step {
    let [target, value_expr, rest @ ..] = args else {
        return EvalError::arity("set!", "at least 2", args.len()).into();
    };
    let name = match expect_symbol("set!", target) {
        Ok(name) => name,
        Err(err) => return err.into(),
    };
    let value = evaluate(value_expr, env);
    if rest.is_empty() {
        env.borrow_mut().define(name, value);
    } else if !env.borrow_mut().set_in_outer(name, value) {
        return EvalError::NotFound(name.to_string()).into();
    }
    Step::Done(Value::Nil)
}

fn evaluate_lambda(args: &[Value], env: &EnvRef) -> Step {
    let (params, doc, body) = match args {
        [params, body] => (params, None, body),
        [params, Value::String(doc), body] => (params, Some(doc.clone()), body),
        [_, doc, _] => return EvalError::type_mismatch("lambda doc string", "string", doc).into(),
        _ => return EvalError::arity("lambda", "2 or 3", args.len()).into(),
    };
    let params = match parameter_names(params) {
        Ok(params) => params,
        Err(err) => return err.into(),
    };
    let procedure = Procedure::closure(params, body.clone(), env.clone(), doc);
    Step::Done(procedure_value(procedure))
}

/// Validates a parameter list: symbols only, with at most one `&` that is
/// followed by exactly one name.
fn parameter_names(params: &Value) -> Result<Vec<String>, EvalError> {
    let Value::List(items) = params else {
        return Err(EvalError::type_mismatch("lambda parameters", "list", params));
    };
    let names = items
        .iter()
        .map(|item| expect_symbol("lambda", item).map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(position) = names.iter().position(|name| name == "&") {
        if position + 2 != names.len() {
            return Err(EvalError::InvalidSpecialForm(
                "'&' must be followed by exactly one parameter name".to_string(),
            ));
        }
    }
    Ok(names)
}

/// `begin` / `do`: every form but the last for effect, the last in tail position.
fn evaluate_body(forms: &[Value], env: &EnvRef) -> Step {
    let Some((last, init)) = forms.split_last() else {
        return Step::Done(Value::Nil);
    };
    for form in init {
        evaluate(form, env);
    }
    Step::Continue(last.clone(), env.clone())
}

/// Binding values are evaluated in the enclosing environment, so later
/// bindings cannot see earlier ones; the body runs in one new child frame.
fn evaluate_let(args: &[Value], env: &EnvRef) -> Step {
    let Some((bindings, body)) = args.split_first() else {
        return EvalError::arity("let", "at least 1", 0).into();
    };
    let Value::List(bindings) = bindings else {
        return EvalError::type_mismatch("let bindings", "list", bindings).into();
    };

    let mut evaluated = Vec::with_capacity(bindings.len());
    for binding in bindings.iter() {
        let (name, value_expr) = match binding {
            Value::List(pair) if pair.len() == 2 => match expect_symbol("let", &pair[0]) {
                Ok(name) => (name.to_string(), &pair[1]),
                Err(err) => return err.into(),
            },
            other => {
                return EvalError::InvalidSpecialForm(format!(
                    "let binding must be a (name value) pair, got {}",
                    other
                ))
                .into();
            }
        };
        evaluated.push((name, evaluate(value_expr, env)));
    }

    let frame = Environment::new_enclosed(env.clone());
    {
        let mut frame_mut = frame.borrow_mut();
        for (name, value) in evaluated {
            frame_mut.define(name, value);
        }
    }
    evaluate_body(body, &frame)
}

/// Text to hand back to the reader for `eval` and `read`: a string's
/// contents, or the rendering of any other value.
fn source_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Re-reads the argument's text and evaluates it in a fresh child frame.
fn evaluate_eval(args: &[Value], env: &EnvRef) -> Step {
    let [arg] = args else {
        return EvalError::arity("eval", "exactly 1", args.len()).into();
    };
    let source = match arg {
        Value::String(s) => s.clone(),
        Value::List(_) | Value::Symbol(_) => {
            let value = evaluate(arg, env);
            if value.is_error() {
                return Step::Done(value);
            }
            source_text(&value)
        }
        other => return EvalError::type_mismatch("eval", "list, symbol or string", other).into(),
    };

    let mut expressions = match read_all(&source) {
        Ok(expressions) => expressions,
        Err(err) => return EvalError::from(err).into(),
    };
    let frame = Environment::new_enclosed(env.clone());
    match expressions.len() {
        0 => Step::Done(Value::Nil),
        1 => Step::Continue(expressions.remove(0), frame),
        _ => {
            expressions.insert(0, Value::symbol("begin"));
            Step::Continue(Value::list(expressions), frame)
        }
    }
}

/// Parses the argument's text without evaluating the result.
fn evaluate_read(args: &[Value], env: &EnvRef) -> Step {
    let [arg] = args else {
        return EvalError::arity("read", "exactly 1", args.len()).into();
    };
    let value = evaluate(arg, env);
    if value.is_error() {
        return Step::Done(value);
    }
    match read_str(&source_text(&value)) {
        Ok(Some(expr)) => Step::Done(expr),
        Ok(None) => Step::Done(Value::Nil),
        Err(err) => EvalError::from(err).into(),
    }
}

fn evaluate_defmacro(args: &[Value], env: &EnvRef) -> Step {
    let [target, value_expr, ..] = args else {
        return EvalError::arity("defmacro!", "at least 2", args.len()).into();
    };
    let name = match expect_symbol("defmacro!", target) {
        Ok(name) => name,
        Err(err) => return err.into(),
    };
    let value = evaluate(value_expr, env);
    let procedure = match &value {
        Value::Procedure(procedure) if matches!(procedure.callable, Callable::Closure(_)) => {
            procedure.as_macro()
        }
        Value::Error(_) => return Step::Done(value.clone()),
        other => return EvalError::type_mismatch("defmacro!", "closure", other).into(),
    };
    env.borrow_mut().define(name, procedure_value(procedure));
    Step::Done(Value::Nil)
}

/// Returns the expansion of a macro call without evaluating it; any other
/// form comes back unchanged.
fn evaluate_macroexpand(args: &[Value], env: &EnvRef) -> Step {
    let [form] = args else {
        return EvalError::arity("macroexpand", "exactly 1", args.len()).into();
    };
    if let Value::List(items) = form {
        if let Some((Value::Symbol(head), operands)) = items.split_first() {
            if SpecialForm::from_name(head).is_none() {
                let resolved = env.borrow().get(head);
                if let Some(Value::Procedure(procedure)) = resolved {
                    if procedure.is_macro {
                        return Step::Done(expand_macro(&procedure, operands, env));
                    }
                }
            }
        }
    }
    Step::Done(form.clone())
}

/// `(alias new original ...)`: binds each new name to the current value of
/// its original and records the mapping. Unresolved originals are skipped.
fn evaluate_alias(args: &[Value], env: &EnvRef) -> Step {
    if args.is_empty() || args.len() % 2 != 0 {
        return EvalError::arity("alias", "an even number (at least 2) of", args.len()).into();
    }
    for pair in args.chunks(2) {
        let (alias, original) = match (expect_symbol("alias", &pair[0]), expect_symbol("alias", &pair[1])) {
            (Ok(alias), Ok(original)) => (alias, original),
            (Err(err), _) | (_, Err(err)) => return err.into(),
        };
        let resolved = env.borrow().get(original);
        match resolved {
            Some(value) => {
                tracing::debug!(alias, original, "registering alias");
                let mut env_mut = env.borrow_mut();
                env_mut.define(alias, value);
                env_mut.add_alias(alias, original);
            }
            None => tracing::warn!(alias, original, "alias target is not bound; skipping"),
        }
    }
    Step::Done(Value::Nil)
}

fn evaluate_quasiquote(args: &[Value], env: &EnvRef) -> Step {
    match args {
        [template] => match quasiquote(template, env) {
            Ok(value) => Step::Done(value),
            Err(err) => err.into(),
        },
        _ => EvalError::arity("quasiquote", "exactly 1", args.len()).into(),
    }
}

fn unquoted<'a>(value: &'a Value, keyword: &str) -> Option<&'a Value> {
    match value {
        Value::List(items) => match items.as_slice() {
            [head, inner] if head.as_symbol() == Some(keyword) => Some(inner),
            _ => None,
        },
        _ => None,
    }
}

/// Copies a template, evaluating `(unquote e)` and splicing the list
/// produced by `(splice-unquote e)` into the enclosing list. An unquoted
/// Error is copied in like any other value; only a failed splice fails.
fn quasiquote(template: &Value, env: &EnvRef) -> Result<Value, EvalError> {
    if let Some(inner) = unquoted(template, "unquote") {
        return Ok(evaluate(inner, env));
    }
    let Value::List(items) = template else {
        return Ok(template.clone());
    };

    let mut expanded = Vec::with_capacity(items.len());
    for item in items.iter() {
        if let Some(inner) = unquoted(item, "splice-unquote") {
            match evaluate(inner, env) {
                Value::List(spliced) => expanded.extend(spliced.iter().cloned()),
                Value::Nil => {}
                Value::Error(err) => return Err(err),
                other => return Err(EvalError::type_mismatch("splice-unquote", "list", &other)),
            }
            continue;
        }
        expanded.push(quasiquote(item, env)?);
    }
    Ok(Value::List(Rc::new(expanded)))
}

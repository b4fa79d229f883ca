use std::rc::Rc;

use crate::environment::EnvRef;
use crate::evaluator::{EvalError, apply_value};
use crate::types::{HashValue, Value};

type NativeResult = Result<Value, EvalError>;
type Primitive = fn(&[Value], &EnvRef) -> NativeResult;

// Checks the number of arguments
macro_rules! check_arity {
    // Variant for minimum number of args
    ($args:expr, min $expected:expr, $name:expr) => {
        if $args.len() < $expected {
            return Err(EvalError::arity(
                $name,
                format!("at least {}", $expected),
                $args.len(),
            ));
        }
    };
    ($args:expr, $expected:expr, $name:expr) => {
        if $args.len() != $expected {
            return Err(EvalError::arity($name, $expected.to_string(), $args.len()));
        }
    };
}

// Extracts a number from a Value or returns a type mismatch
macro_rules! expect_number {
    ($value:expr, $name:expr) => {
        match $value {
            Value::Number(n) => *n,
            Value::Error(err) => return Err(err.clone()),
            other => return Err(EvalError::type_mismatch($name, "number", other)),
        }
    };
}

/// Binds the native library into `env`.
pub fn install(env: &EnvRef) {
    let primitives: [(&str, Primitive); 35] = [
        ("+", prim_add),
        ("-", prim_sub),
        ("*", prim_mul),
        ("/", prim_div),
        ("%", prim_rem),
        ("=", prim_equals),
        ("<", prim_less_than),
        ("<=", prim_less_than_or_equals),
        (">", prim_greater_than),
        (">=", prim_greater_than_or_equals),
        ("eq", prim_eq),
        ("not", prim_not),
        ("list", prim_list),
        ("cons", prim_cons),
        ("car", prim_car),
        ("cdr", prim_cdr),
        ("count", prim_count),
        ("empty?", prim_is_empty),
        ("nth", prim_nth),
        ("concat", prim_concat),
        ("str", prim_str),
        ("symbol", prim_symbol),
        ("type", prim_type),
        ("error", prim_error),
        ("error?", prim_is_error),
        ("hash-map", prim_hash_map),
        ("get", prim_get),
        ("keys", prim_keys),
        ("struct", prim_struct),
        ("print", prim_print),
        ("println", prim_println),
        ("read-line", prim_read_line),
        ("apply", prim_apply),
        ("map", prim_map),
        ("help", prim_help),
    ];

    let mut env_mut = env.borrow_mut();
    for (name, func) in primitives {
        env_mut.add_native(name, move |args, env| func(args, env).unwrap_or_else(Value::Error));
    }
}

/// Elements of a list argument; nil counts as the empty list.
fn list_items<'a>(name: &str, value: &'a Value) -> Result<&'a [Value], EvalError> {
    match value {
        Value::List(items) => Ok(items.as_slice()),
        Value::Nil => Ok(&[]),
        Value::Error(err) => Err(err.clone()),
        other => Err(EvalError::type_mismatch(name, "list", other)),
    }
}

fn expect_key(name: &str, value: &Value) -> Result<String, EvalError> {
    match value {
        Value::String(s) | Value::Symbol(s) => Ok(s.clone()),
        Value::Error(err) => Err(err.clone()),
        other => Err(EvalError::type_mismatch(name, "string or symbol key", other)),
    }
}

fn expect_hash<'a>(name: &str, value: &'a Value) -> Result<&'a HashValue, EvalError> {
    match value {
        Value::Hash(hash) => Ok(hash),
        Value::Error(err) => Err(err.clone()),
        other => Err(EvalError::type_mismatch(name, "hash", other)),
    }
}

fn division_by_zero(name: &str) -> EvalError {
    EvalError::Native(format!("Division by zero: ({} ... 0)", name))
}

// --- Arithmetic ---

fn fold_numbers(
    args: &[Value],
    name: &str,
    start: f64,
    func: impl Fn(f64, f64) -> f64,
) -> NativeResult {
    let mut acc = start;
    for arg in args {
        acc = func(acc, expect_number!(arg, name));
    }
    Ok(Value::Number(acc))
}

fn prim_add(args: &[Value], _env: &EnvRef) -> NativeResult {
    // (+) -> 0
    // (+ 1 2 3) -> 6
    fold_numbers(args, "+", 0.0, |acc, val| acc + val)
}

fn prim_sub(args: &[Value], _env: &EnvRef) -> NativeResult {
    // (- x) -> -x
    // (- x y z) -> x - y - z
    check_arity!(args, min 1, "-");
    let first = expect_number!(&args[0], "-");
    if args.len() == 1 {
        return Ok(Value::Number(-first));
    }
    fold_numbers(&args[1..], "-", first, |acc, val| acc - val)
}

fn prim_mul(args: &[Value], _env: &EnvRef) -> NativeResult {
    fold_numbers(args, "*", 1.0, |acc, val| acc * val)
}

fn prim_div(args: &[Value], _env: &EnvRef) -> NativeResult {
    // (/ x) -> 1/x
    check_arity!(args, min 1, "/");
    let first = expect_number!(&args[0], "/");
    let (start, divisors) = if args.len() == 1 {
        (1.0, args)
    } else {
        (first, &args[1..])
    };
    let mut acc = start;
    for divisor in divisors {
        let divisor = expect_number!(divisor, "/");
        if divisor == 0.0 {
            return Err(division_by_zero("/"));
        }
        acc /= divisor;
    }
    Ok(Value::Number(acc))
}

fn prim_rem(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 2, "%");
    let dividend = expect_number!(&args[0], "%");
    let divisor = expect_number!(&args[1], "%");
    if divisor == 0.0 {
        return Err(division_by_zero("%"));
    }
    Ok(Value::Number(dividend % divisor))
}

// (= n1 n2 ...) -> true when every adjacent pair satisfies `compare`
fn compare_numbers(args: &[Value], name: &str, compare: impl Fn(f64, f64) -> bool) -> NativeResult {
    check_arity!(args, min 2, name);
    let mut numbers = Vec::with_capacity(args.len());
    for arg in args {
        numbers.push(expect_number!(arg, name));
    }
    Ok(Value::Bool(
        numbers.windows(2).all(|pair| compare(pair[0], pair[1])),
    ))
}

fn prim_equals(args: &[Value], _env: &EnvRef) -> NativeResult {
    compare_numbers(args, "=", |left, right| left == right)
}

fn prim_less_than(args: &[Value], _env: &EnvRef) -> NativeResult {
    compare_numbers(args, "<", |left, right| left < right)
}

fn prim_less_than_or_equals(args: &[Value], _env: &EnvRef) -> NativeResult {
    compare_numbers(args, "<=", |left, right| left <= right)
}

fn prim_greater_than(args: &[Value], _env: &EnvRef) -> NativeResult {
    compare_numbers(args, ">", |left, right| left > right)
}

fn prim_greater_than_or_equals(args: &[Value], _env: &EnvRef) -> NativeResult {
    compare_numbers(args, ">=", |left, right| left >= right)
}

fn prim_eq(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 2, "eq");
    Ok(Value::Bool(args[0].eq_value(&args[1])))
}

fn prim_not(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 1, "not");
    Ok(Value::Bool(!args[0].is_truthy()))
}

// --- List Primitives ---

fn prim_list(args: &[Value], _env: &EnvRef) -> NativeResult {
    Ok(Value::list(args.to_vec()))
}

fn prim_cons(args: &[Value], _env: &EnvRef) -> NativeResult {
    // (cons item list) -> (item ..list)
    check_arity!(args, 2, "cons");
    let tail = list_items("cons", &args[1])?;
    let mut items = Vec::with_capacity(tail.len() + 1);
    items.push(args[0].clone());
    items.extend_from_slice(tail);
    Ok(Value::list(items))
}

fn prim_car(args: &[Value], _env: &EnvRef) -> NativeResult {
    // (car '()) -> nil
    check_arity!(args, 1, "car");
    let items = list_items("car", &args[0])?;
    Ok(items.first().cloned().unwrap_or(Value::Nil))
}

fn prim_cdr(args: &[Value], _env: &EnvRef) -> NativeResult {
    // (cdr '()) -> ()
    check_arity!(args, 1, "cdr");
    let items = list_items("cdr", &args[0])?;
    Ok(Value::list(items.iter().skip(1).cloned().collect()))
}

fn prim_count(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 1, "count");
    let count = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Hash(hash) => hash.entries.len(),
        other => list_items("count", other)?.len(),
    };
    Ok(Value::Number(count as f64))
}

fn prim_is_empty(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 1, "empty?");
    let empty = match &args[0] {
        Value::String(s) => s.is_empty(),
        Value::Hash(hash) => hash.entries.is_empty(),
        other => list_items("empty?", other)?.is_empty(),
    };
    Ok(Value::Bool(empty))
}

fn prim_nth(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 2, "nth");
    let items = list_items("nth", &args[0])?;
    let index = expect_number!(&args[1], "nth");
    if index < 0.0 || index.fract() != 0.0 {
        return Err(EvalError::Native(format!(
            "nth: index must be a non-negative integer, got {}",
            index
        )));
    }
    items.get(index as usize).cloned().ok_or_else(|| {
        EvalError::Native(format!(
            "nth: index {} out of range for list of length {}",
            index,
            items.len()
        ))
    })
}

fn prim_concat(args: &[Value], _env: &EnvRef) -> NativeResult {
    let mut items = Vec::new();
    for arg in args {
        items.extend_from_slice(list_items("concat", arg)?);
    }
    Ok(Value::list(items))
}

// --- Strings, symbols and types ---

fn prim_str(args: &[Value], _env: &EnvRef) -> NativeResult {
    Ok(Value::String(args.iter().map(Value::to_plain_string).collect()))
}

fn prim_symbol(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 1, "symbol");
    match &args[0] {
        Value::String(name) | Value::Symbol(name) => Ok(Value::Symbol(name.clone())),
        other => Err(EvalError::type_mismatch("symbol", "string", other)),
    }
}

fn prim_type(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 1, "type");
    Ok(Value::String(args[0].type_name()))
}

fn prim_error(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 1, "error");
    Ok(Value::Error(EvalError::Native(args[0].to_plain_string())))
}

fn prim_is_error(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 1, "error?");
    Ok(Value::Bool(args[0].is_error()))
}

fn prim_help(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 1, "help");
    match &args[0] {
        Value::Procedure(procedure) => Ok(procedure
            .doc()
            .map(Value::string)
            .unwrap_or(Value::Nil)),
        other => Err(EvalError::type_mismatch("help", "procedure", other)),
    }
}

// --- Hashes ---

fn prim_hash_map(args: &[Value], _env: &EnvRef) -> NativeResult {
    // (hash-map "a" 1 "b" 2)
    if args.len() % 2 != 0 {
        return Err(EvalError::arity("hash-map", "an even number of", args.len()));
    }
    let mut hash = HashValue::default();
    for pair in args.chunks(2) {
        hash.entries
            .insert(expect_key("hash-map", &pair[0])?, pair[1].clone());
    }
    Ok(Value::Hash(Rc::new(hash)))
}

fn prim_get(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 2, "get");
    if matches!(args[0], Value::Nil) {
        return Ok(Value::Nil);
    }
    let hash = expect_hash("get", &args[0])?;
    let key = expect_key("get", &args[1])?;
    Ok(hash.entries.get(&key).cloned().unwrap_or(Value::Nil))
}

fn prim_keys(args: &[Value], _env: &EnvRef) -> NativeResult {
    check_arity!(args, 1, "keys");
    let hash = expect_hash("keys", &args[0])?;
    Ok(Value::list(
        hash.sorted_entries()
            .into_iter()
            .map(|(key, _)| Value::string(key))
            .collect(),
    ))
}

fn prim_struct(args: &[Value], _env: &EnvRef) -> NativeResult {
    // (struct point {x 1 y 2}) -> point{"x" 1 "y" 2}
    check_arity!(args, 2, "struct");
    let name = expect_key("struct", &args[0])?;
    let hash = expect_hash("struct", &args[1])?;
    Ok(Value::Hash(Rc::new(HashValue {
        struct_name: Some(name),
        entries: hash.entries.clone(),
    })))
}

// --- I/O ---

fn write_plain(args: &[Value], env: &EnvRef, name: &str, terminator: &str) -> NativeResult {
    let mut text = args
        .iter()
        .map(Value::to_plain_string)
        .collect::<Vec<_>>()
        .join(" ");
    text.push_str(terminator);
    let io = env.borrow().io();
    io.write_output(&text)
        .map_err(|err| EvalError::Native(format!("{}: {}", name, err)))?;
    Ok(Value::Nil)
}

fn prim_print(args: &[Value], env: &EnvRef) -> NativeResult {
    write_plain(args, env, "print", "")
}

fn prim_println(args: &[Value], env: &EnvRef) -> NativeResult {
    write_plain(args, env, "println", "\n")
}

fn prim_read_line(args: &[Value], env: &EnvRef) -> NativeResult {
    check_arity!(args, 0, "read-line");
    let io = env.borrow().io();
    match io.read_line() {
        Ok(Some(line)) => Ok(Value::String(line)),
        Ok(None) => Ok(Value::Nil),
        Err(err) => Err(EvalError::Native(format!("read-line: {}", err))),
    }
}

// --- Higher-order ---

fn prim_apply(args: &[Value], env: &EnvRef) -> NativeResult {
    // (apply f 1 2 '(3 4)) -> (f 1 2 3 4)
    check_arity!(args, min 2, "apply");
    let (last, leading) = match args[1..].split_last() {
        Some(split) => split,
        None => return Err(EvalError::arity("apply", "at least 2", args.len())),
    };
    let mut call_args = leading.to_vec();
    call_args.extend_from_slice(list_items("apply", last)?);
    Ok(apply_value(&args[0], call_args, env))
}

fn prim_map(args: &[Value], env: &EnvRef) -> NativeResult {
    check_arity!(args, 2, "map");
    if !matches!(args[0], Value::Procedure(_)) {
        return Err(EvalError::type_mismatch("map", "procedure", &args[0]));
    }
    let items = list_items("map", &args[1])?;
    let mut mapped = Vec::with_capacity(items.len());
    for item in items {
        let value = apply_value(&args[0], vec![item.clone()], env);
        if value.is_error() {
            return Ok(value);
        }
        mapped.push(value);
    }
    Ok(Value::list(mapped))
}

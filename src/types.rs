use crate::environment::EnvRef;
use crate::evaluator::EvalError;
use std::collections::HashMap;
use std::fmt; // For custom display formatting
use std::rc::Rc;

/// A runtime value. Lists double as the expression tree produced by the
/// reader; there is no separate AST type.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),           // #t or #f
    Number(f64),          // Integers and reals share one representation
    String(String),       // For string literals "hello\n"
    Character(char),      // Only produced by natives and hosts
    Symbol(String),       // e.g., +, variable-name, quote
    Error(EvalError),     // Failures travel as ordinary values
    List(Rc<Vec<Value>>), // e.g., (+ 1 2), (define x 10)
    Hash(Rc<HashValue>),
    Procedure(Rc<Procedure>),
}

/// A string-keyed mapping. When `struct_name` is set the hash reports that
/// name as its type, turning it into a nominal record.
#[derive(Clone, Default)]
pub struct HashValue {
    pub struct_name: Option<String>,
    pub entries: HashMap<String, Value>,
}

impl HashValue {
    pub fn new(entries: HashMap<String, Value>) -> Self {
        HashValue {
            struct_name: None,
            entries,
        }
    }

    /// Entries ordered by key, which is the canonical order for rendering.
    pub fn sorted_entries(&self) -> Vec<(&String, &Value)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

/// Signature for natively implemented procedures. Natives receive the fully
/// evaluated argument list (or, for native macros, the unevaluated forms) and
/// the calling environment, and must validate their own arguments.
pub type NativeFunc = Rc<dyn Fn(&[Value], &EnvRef) -> Value>;

#[derive(Clone)]
pub enum Callable {
    Native { name: String, func: NativeFunc },
    Closure(Closure),
}

#[derive(Clone)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Value,
    pub env: EnvRef,
    pub doc: Option<String>,
}

#[derive(Clone)]
pub struct Procedure {
    pub callable: Callable,
    pub is_macro: bool,
}

impl Procedure {
    pub fn native(name: &str, func: NativeFunc) -> Self {
        Procedure {
            callable: Callable::Native {
                name: name.to_string(),
                func,
            },
            is_macro: false,
        }
    }

    pub fn closure(params: Vec<String>, body: Value, env: EnvRef, doc: Option<String>) -> Self {
        Procedure {
            callable: Callable::Closure(Closure {
                params,
                body,
                env,
                doc,
            }),
            is_macro: false,
        }
    }

    /// A copy of this procedure flagged as a macro. The original value stays
    /// an ordinary procedure.
    pub fn as_macro(&self) -> Self {
        Procedure {
            callable: self.callable.clone(),
            is_macro: true,
        }
    }

    pub fn doc(&self) -> Option<&str> {
        match &self.callable {
            Callable::Closure(closure) => closure.doc.as_deref(),
            Callable::Native { .. } => None,
        }
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(name.to_string())
    }

    pub fn string(s: &str) -> Value {
        Value::String(s.to_string())
    }

    pub fn error(err: EvalError) -> Value {
        Value::Error(err)
    }

    pub fn native(name: &str, func: impl Fn(&[Value], &EnvRef) -> Value + 'static) -> Value {
        Value::Procedure(Rc::new(Procedure::native(name, Rc::new(func))))
    }

    /// Nil and the empty list are both "nil".
    pub fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Only `#f` and nil (including the empty list) are false.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false)) && !self.is_nil()
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Number(_) => "number".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Character(_) => "char".to_string(),
            Value::Symbol(_) => "symbol".to_string(),
            Value::Error(_) => "error".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Hash(hash) => match &hash.struct_name {
                Some(name) => name.clone(),
                None => "hash".to_string(),
            },
            Value::Procedure(procedure) if procedure.is_macro => "macro".to_string(),
            Value::Procedure(_) => "procedure".to_string(),
        }
    }

    /// Text without the reader syntax around strings and characters; what
    /// `print` and `str` emit.
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Character(c) => c.to_string(),
            other => other.to_string(),
        }
    }

    /// Language-level equality: same type tag and identical rendering.
    pub fn eq_value(&self, other: &Value) -> bool {
        if self.is_nil() && other.is_nil() {
            return true;
        }
        self.type_name() == other.type_name() && self.to_string() == other.to_string()
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_value(other)
    }
}

impl From<EvalError> for Value {
    fn from(err: EvalError) -> Self {
        Value::Error(err)
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(
        f,
        "\"{}\"",
        s.chars().fold(String::new(), |mut acc, char| {
            match char {
                '"' => acc.push_str("\\\""),
                '\\' => acc.push_str("\\\\"),
                '\n' => acc.push_str("\\n"),
                '\r' => acc.push_str("\\r"),
                '\t' => acc.push_str("\\t"),
                c => acc.push(c),
            }
            acc
        })
    )
}

// Rendering is readable: strings come back quoted and escaped so that a
// rendered list can be read again.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write_escaped(f, s),
            Value::Character(c) => write!(f, "{}", c),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Error(err) => write!(f, "Error: {}", err),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Value::Hash(hash) => {
                if let Some(name) = &hash.struct_name {
                    write!(f, "{}", name)?;
                }
                write!(f, "{{")?;
                for (i, (key, value)) in hash.sorted_entries().into_iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write_escaped(f, key)?;
                    write!(f, " {}", value)?;
                }
                write!(f, "}}")
            }
            Value::Procedure(procedure) => procedure.fmt(f),
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_macro { "macro" } else { "lambda" };
        match &self.callable {
            Callable::Native { name, .. } => write!(f, "#<native:{}>", name),
            Callable::Closure(closure) => write!(f, "#<{} ({})>", kind, closure.params.join(" ")),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name(), self)
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

// Closures hold their environment; printing it would recurse through every
// binding, so only the shape is shown.
impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("params", &self.params)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    fn hash(pairs: &[(&str, Value)]) -> HashValue {
        HashValue::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_number_rendering_is_shortest() {
        assert_eq!(Value::Number(16.0).to_string(), "16");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Number(0.1 + 0.2).to_string(), "0.30000000000000004");
        assert_eq!(Value::Number(-0.5).to_string(), "-0.5");
    }

    #[test]
    fn test_list_and_string_rendering() {
        let value = Value::list(vec![
            Value::symbol("a"),
            Value::string("say \"hi\"\n"),
            Value::list(vec![]),
            Value::Bool(false),
            Value::Nil,
        ]);
        assert_eq!(value.to_string(), r#"(a "say \"hi\"\n" () #f nil)"#);
        assert_eq!(Value::string("x").to_plain_string(), "x");
        assert_eq!(Value::Character('c').to_plain_string(), "c");
    }

    #[test]
    fn test_hash_rendering_sorts_keys() {
        let value = Value::Hash(Rc::new(hash(&[
            ("b", Value::Number(2.0)),
            ("a", Value::Number(1.0)),
        ])));
        assert_eq!(value.to_string(), r#"{"a" 1 "b" 2}"#);
    }

    #[test]
    fn test_struct_name_overrides_type() {
        let mut record = hash(&[("x", Value::Number(1.0))]);
        assert_eq!(Value::Hash(Rc::new(record.clone())).type_name(), "hash");
        record.struct_name = Some("point".to_string());
        let value = Value::Hash(Rc::new(record));
        assert_eq!(value.type_name(), "point");
        assert_eq!(value.to_string(), r#"point{"x" 1}"#);
    }

    #[test]
    fn test_eq_requires_same_type() {
        assert!(Value::Number(9.0).eq_value(&Value::Number(9.0)));
        assert!(!Value::Number(9.0).eq_value(&Value::string("9")));
        assert!(!Value::symbol("a").eq_value(&Value::Character('a')));
        assert!(Value::Nil.eq_value(&Value::list(vec![])));
    }

    #[test]
    fn test_hash_equality_ignores_insertion_order() {
        let left = Value::Hash(Rc::new(hash(&[("a", Value::Nil), ("b", Value::Bool(true))])));
        let right = Value::Hash(Rc::new(hash(&[("b", Value::Bool(true)), ("a", Value::Nil)])));
        assert_eq!(left, right);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::string("").is_truthy());
        assert!(Value::list(vec![Value::Nil]).is_truthy());
    }

    #[test]
    fn test_macro_flag_does_not_touch_original() {
        let env = Environment::new();
        let procedure = Procedure::closure(vec!["x".to_string()], Value::symbol("x"), env, None);
        let as_macro = procedure.as_macro();
        assert!(!procedure.is_macro);
        assert!(as_macro.is_macro);
        assert_eq!(Value::Procedure(Rc::new(as_macro)).type_name(), "macro");
        assert_eq!(procedure.to_string(), "#<lambda (x)>");
    }
}

use crate::io::IoConfig;
use crate::types::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// Shared handle to an environment frame. Closures hold one of these, so a
/// frame lives as long as any closure created inside it.
pub type EnvRef = Rc<RefCell<Environment>>;

// --- Environment Definition ---

pub struct Environment {
    // Frames point at their parent only; children are never referenced.
    outer: Option<EnvRef>,
    bindings: HashMap<String, Value>,
    aliases: HashMap<String, String>,
    io: Rc<IoConfig>,
}

impl Environment {
    /// Creates a new, top-level (global) environment talking to stdio.
    pub fn new() -> EnvRef {
        Environment::with_io(Rc::new(IoConfig::stdio()))
    }

    /// Creates a top-level environment with the given streams.
    pub fn with_io(io: Rc<IoConfig>) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            outer: None,
            bindings: HashMap::new(),
            aliases: HashMap::new(),
            io,
        }))
    }

    /// A global environment holding the native library.
    pub fn new_global_populated() -> EnvRef {
        let env_ptr = Environment::new();
        crate::primitives::install(&env_ptr);
        env_ptr
    }

    /// A global environment holding the native library, using the given streams.
    pub fn new_global_with_io(io: Rc<IoConfig>) -> EnvRef {
        let env_ptr = Environment::with_io(io);
        crate::primitives::install(&env_ptr);
        env_ptr
    }

    /// Creates a new environment enclosed within an outer one. The child
    /// shares the outer environment's streams.
    pub fn new_enclosed(outer_env: EnvRef) -> EnvRef {
        let io = outer_env.borrow().io.clone();
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: HashMap::new(),
            aliases: HashMap::new(),
            io,
        }))
    }

    /// Defines a variable in the *current* environment frame, shadowing any
    /// binding of the same name further out.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Looks up a variable's value.
    /// Checks the current environment first, then walks up the outer environment chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self.bindings.get(name) {
            Some(value) => Some(value.clone()),
            None => match &self.outer {
                Some(outer_env_ptr) => outer_env_ptr.borrow().get(name),
                None => None,
            },
        }
    }

    /// Updates an existing binding, searching the enclosing frames first
    /// (nearest first) and this frame last. Returns false when no frame
    /// defines `name`; nothing is written in that case.
    pub fn set_in_outer(&mut self, name: &str, value: Value) -> bool {
        if let Some(outer_env_ptr) = &self.outer {
            if outer_env_ptr.borrow_mut().set_existing(name, value.clone()) {
                return true;
            }
        }
        match self.bindings.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn set_existing(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.bindings.get_mut(name) {
            *slot = value;
            return true;
        }
        match &self.outer {
            Some(outer_env_ptr) => outer_env_ptr.borrow_mut().set_existing(name, value),
            None => false,
        }
    }

    /// Records that `alias` was bound as another name for `original`.
    pub fn add_alias(&mut self, alias: &str, original: &str) {
        self.aliases
            .insert(alias.to_string(), original.to_string());
    }

    /// Alias mappings visible from this frame; inner frames win.
    pub fn aliases(&self) -> HashMap<String, String> {
        let mut merged = match &self.outer {
            Some(outer_env_ptr) => outer_env_ptr.borrow().aliases(),
            None => HashMap::new(),
        };
        merged.extend(self.aliases.clone());
        merged
    }

    /// Every binding visible from this frame; child entries shadow parent entries.
    pub fn items(&self) -> HashMap<String, Value> {
        let mut merged = match &self.outer {
            Some(outer_env_ptr) => outer_env_ptr.borrow().items(),
            None => HashMap::new(),
        };
        merged.extend(self.bindings.clone());
        merged
    }

    /// Gets a list of all identifiers visible from this environment
    pub fn identifiers(&self) -> HashSet<String> {
        let mut identifiers: HashSet<String> = self.bindings.keys().cloned().collect();
        if let Some(outer_env_ptr) = &self.outer {
            identifiers.extend(outer_env_ptr.borrow().identifiers());
        }
        identifiers
    }

    pub fn io(&self) -> Rc<IoConfig> {
        self.io.clone()
    }

    /// Helper to add a native procedure to the environment.
    pub fn add_native(&mut self, name: &str, func: impl Fn(&[Value], &EnvRef) -> Value + 'static) {
        self.define(name, Value::native(name, func));
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.bindings.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_outer", &self.outer.is_some())
            .finish()
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SharedBuffer;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_define_and_get_global() {
        let env = Environment::new();
        env.borrow_mut().define("x", num(10.0));
        assert_eq!(env.borrow().get("x"), Some(num(10.0)));
    }

    #[test]
    fn test_get_unbound() {
        let global_env = Environment::new();
        let local_env = Environment::new_enclosed(global_env);
        assert_eq!(local_env.borrow().get("z"), None);
    }

    #[test]
    fn test_shadowing() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("x", num(10.0));

        let local_env = Environment::new_enclosed(global_env.clone());
        local_env.borrow_mut().define("x", num(50.0)); // Shadow global x

        let inner_local_env = Environment::new_enclosed(local_env.clone());
        inner_local_env.borrow_mut().define("y", Value::symbol("y-value"));

        assert_eq!(inner_local_env.borrow().get("x"), Some(num(50.0)));
        assert_eq!(inner_local_env.borrow().get("y"), Some(Value::symbol("y-value")));
        assert_eq!(local_env.borrow().get("x"), Some(num(50.0)));
        assert_eq!(global_env.borrow().get("x"), Some(num(10.0)));
    }

    #[test]
    fn test_set_in_outer_mutates_defining_frame() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("counter", num(1.0));
        let local_env = Environment::new_enclosed(global_env.clone());

        assert!(local_env.borrow_mut().set_in_outer("counter", num(2.0)));
        assert_eq!(global_env.borrow().get("counter"), Some(num(2.0)));
        // No shadowing binding was created in the child
        assert!(!local_env.borrow().bindings.contains_key("counter"));
    }

    #[test]
    fn test_set_in_outer_prefers_parent_over_current() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("x", num(1.0));
        let local_env = Environment::new_enclosed(global_env.clone());
        local_env.borrow_mut().define("x", num(5.0));

        assert!(local_env.borrow_mut().set_in_outer("x", num(9.0)));
        assert_eq!(global_env.borrow().get("x"), Some(num(9.0)));
        assert_eq!(local_env.borrow().get("x"), Some(num(5.0)));
    }

    #[test]
    fn test_set_in_outer_falls_back_to_current() {
        let global_env = Environment::new();
        let local_env = Environment::new_enclosed(global_env.clone());
        local_env.borrow_mut().define("only-here", num(1.0));

        assert!(local_env.borrow_mut().set_in_outer("only-here", num(3.0)));
        assert_eq!(local_env.borrow().get("only-here"), Some(num(3.0)));
    }

    #[test]
    fn test_set_in_outer_not_found() {
        let global_env = Environment::new();
        let local_env = Environment::new_enclosed(global_env.clone());
        assert!(!local_env.borrow_mut().set_in_outer("missing", num(3.0)));
        assert_eq!(global_env.borrow().get("missing"), None);
    }

    #[test]
    fn test_items_child_shadows_parent() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("a", num(1.0));
        global_env.borrow_mut().define("b", num(2.0));
        let local_env = Environment::new_enclosed(global_env);
        local_env.borrow_mut().define("b", num(20.0));

        let items = local_env.borrow().items();
        assert_eq!(items.len(), 2);
        assert_eq!(items["a"], num(1.0));
        assert_eq!(items["b"], num(20.0));
    }

    #[test]
    fn test_aliases_merge_through_frames() {
        let global_env = Environment::new();
        global_env.borrow_mut().add_alias("first", "car");
        let local_env = Environment::new_enclosed(global_env);
        local_env.borrow_mut().add_alias("rest", "cdr");

        let aliases = local_env.borrow().aliases();
        assert_eq!(aliases.get("first").map(String::as_str), Some("car"));
        assert_eq!(aliases.get("rest").map(String::as_str), Some("cdr"));
    }

    #[test]
    fn test_children_share_io() {
        let (io, output, _) = IoConfig::capture();
        let global_env = Environment::with_io(Rc::new(io));
        let grandchild = Environment::new_enclosed(Environment::new_enclosed(global_env.clone()));

        grandchild.borrow().io().write_output("from child").unwrap();
        assert_eq!(output.contents(), "from child");

        let redirected = SharedBuffer::default();
        global_env.borrow().io().set_output(redirected.clone());
        grandchild.borrow().io().write_output("again").unwrap();
        assert_eq!(redirected.contents(), "again");
    }
}

use std::borrow::Cow;

use lisper::{
    EnvRef, Environment, Interpreter, TokenKind, print_result, special_form_identifiers, tokenize,
};
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{
    Cmd, Completer, Context, EditMode, Editor, EventHandler, KeyCode, KeyEvent, Modifiers,
};
use rustyline::{Helper, Highlighter, Hinter, Validator};

const DEFAULT_HISTORY: &str = ".lisper_history";

struct LispCompleter {
    env: EnvRef,
}

impl LispCompleter {
    fn new(env: EnvRef) -> Self {
        LispCompleter { env }
    }
}

impl rustyline::completion::Completer for LispCompleter {
    type Candidate = String;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let tokens = tokenize(&line[..pos]);
        let prefix = match tokens.last() {
            Some(token) if token.span.end == pos => match &token.kind {
                TokenKind::Atom(prefix) => prefix.clone(),
                _ => return Ok((pos, vec![])),
            },
            _ => return Ok((pos, vec![])),
        };
        let mut candidates: Vec<String> = self
            .env
            .borrow()
            .identifiers()
            .union(&special_form_identifiers())
            .filter_map(|id| id.strip_prefix(prefix.as_str()).map(str::to_string))
            .filter(|suffix| !suffix.is_empty())
            .collect();
        candidates.sort();
        Ok((pos, candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct InputHelper {
    #[rustyline(Validator)]
    validator: LispValidator,
    #[rustyline(Highlighter)]
    highlighter: LispHighlighter,
    #[rustyline(Completer)]
    completer: LispCompleter,
}

fn is_match(opening: char, closing: char) -> bool {
    matches!((opening, closing), ('(', ')') | ('[', ']') | ('{', '}'))
}

struct LispValidator;

impl Validator for LispValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();
        let mut stack = Vec::new();
        let mut in_string = false;
        let mut in_comment = false;
        let mut escape = false;

        for (i, c) in input.char_indices() {
            if in_comment {
                in_comment = c != '\n';
                continue;
            }
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }

            match c {
                '"' => in_string = true,
                ';' => in_comment = true,
                '(' | '[' | '{' => stack.push(c),
                ')' | ']' | '}' => match stack.pop() {
                    Some(opening) if is_match(opening, c) => {}
                    _ => {
                        return Ok(ValidationResult::Invalid(Some(format!(
                            "  - Unmatched '{}' at position {}",
                            c, i
                        ))));
                    }
                },
                _ => {}
            }
        }

        if in_string || !stack.is_empty() {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

struct LispHighlighter;

impl Highlighter for LispHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        let mut stack: Vec<(char, usize, usize)> = Vec::new();
        let mut highlighted = String::new();
        let mut in_string = false;
        let mut escape = false;
        let cursor = pos.checked_sub(1);

        for (i, c) in line.char_indices() {
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", c)); // Green for strings
                continue;
            }

            match c {
                '"' => {
                    in_string = true;
                    highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", c));
                }
                '(' | '[' | '{' => {
                    stack.push((c, i, highlighted.len()));
                    highlighted.push(c);
                }
                ')' | ']' | '}' => match stack.pop() {
                    Some((opening, source_pos, out_pos)) if is_match(opening, c) => {
                        if cursor == Some(source_pos) || cursor == Some(i) {
                            // Blue for the bracket pair under the cursor
                            highlighted.push_str(&format!("\x1b[34m{}\x1b[0m", c));
                            highlighted.replace_range(
                                out_pos..out_pos + 1,
                                &format!("\x1b[1;34m{}\x1b[0m", opening),
                            );
                        } else {
                            highlighted.push(c);
                        }
                    }
                    Some((opening, _, out_pos)) => {
                        // Red for mismatched pairs
                        highlighted.push_str(&format!("\x1b[31m{}\x1b[0m", c));
                        highlighted.replace_range(
                            out_pos..out_pos + 1,
                            &format!("\x1b[1;31m{}\x1b[0m", opening),
                        );
                    }
                    None => highlighted.push_str(&format!("\x1b[31m{}\x1b[0m", c)),
                },
                _ => highlighted.push(c),
            }
        }

        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn edit_mode() -> EditMode {
    match std::env::var("LISPER_EDIT_MODE").as_deref() {
        Ok("vi") => EditMode::Vi,
        _ => EditMode::Emacs,
    }
}

fn evaluate_entry(input: &str, env: &EnvRef) {
    match Interpreter::new(input).evaluate_all(env) {
        Ok(value) => {
            if let Err(err) = print_result(&value, env) {
                eprintln!("Output Error: {}", err);
            }
        }
        Err(parse_err) => {
            if parse_err.pretty_print("repl", input).is_err() {
                eprintln!("Parse Error: {}", parse_err);
            }
        }
    }
}

fn main() -> rustyline::Result<()> {
    lisper::init_tracing();
    println!("Lisper REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let history = std::env::var("LISPER_HISTORY").unwrap_or_else(|_| DEFAULT_HISTORY.to_string());
    let global_env = Environment::new_global_populated();
    let helper = InputHelper {
        highlighter: LispHighlighter,
        validator: LispValidator,
        completer: LispCompleter::new(global_env.clone()),
    };
    let config = rustyline::config::Config::builder()
        .edit_mode(edit_mode())
        .build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(helper));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if rl.load_history(&history).is_err() {
        println!("No previous history.");
    }

    loop {
        match rl.readline("lisper> ") {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let trimmed_input = line.trim();
                if trimmed_input.is_empty() {
                    continue;
                }
                if trimmed_input.eq_ignore_ascii_case("exit") {
                    break;
                }
                evaluate_entry(trimmed_input, &global_env);
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                println!("\nExiting.");
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history(&history)
}

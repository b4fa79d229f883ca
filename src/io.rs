use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

/// The three streams an interpreter instance talks to. One `IoConfig` is
/// shared (via `Rc`) by a root environment and every frame descended from
/// it, so replacing a stream affects the whole instance.
pub struct IoConfig {
    input: RefCell<Box<dyn BufRead>>,
    output: RefCell<Box<dyn Write>>,
    diagnostic: RefCell<Box<dyn Write>>,
}

impl IoConfig {
    /// stdin / stdout / stderr
    pub fn stdio() -> Self {
        IoConfig {
            input: RefCell::new(Box::new(io::BufReader::new(io::stdin()))),
            output: RefCell::new(Box::new(io::stdout())),
            diagnostic: RefCell::new(Box::new(io::stderr())),
        }
    }

    /// Empty input with output and diagnostics captured in memory.
    pub fn capture() -> (Self, SharedBuffer, SharedBuffer) {
        let output = SharedBuffer::default();
        let diagnostic = SharedBuffer::default();
        let config = IoConfig {
            input: RefCell::new(Box::new(io::empty())),
            output: RefCell::new(Box::new(output.clone())),
            diagnostic: RefCell::new(Box::new(diagnostic.clone())),
        };
        (config, output, diagnostic)
    }

    pub fn set_input(&self, input: impl BufRead + 'static) {
        *self.input.borrow_mut() = Box::new(input);
    }

    pub fn set_output(&self, output: impl Write + 'static) {
        *self.output.borrow_mut() = Box::new(output);
    }

    pub fn set_diagnostic(&self, diagnostic: impl Write + 'static) {
        *self.diagnostic.borrow_mut() = Box::new(diagnostic);
    }

    pub fn write_output(&self, text: &str) -> io::Result<()> {
        let mut output = self.output.borrow_mut();
        output.write_all(text.as_bytes())?;
        output.flush()
    }

    pub fn write_diagnostic(&self, text: &str) -> io::Result<()> {
        let mut diagnostic = self.diagnostic.borrow_mut();
        diagnostic.write_all(text.as_bytes())?;
        diagnostic.flush()
    }

    /// Reads one line without its terminator; `None` at end of input.
    pub fn read_line(&self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.borrow_mut().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig::stdio()
    }
}

/// An in-memory sink whose clones share one buffer.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

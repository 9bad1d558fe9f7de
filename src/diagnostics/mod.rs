use std::fmt;

use thiserror::Error;

/// One reported semantic violation: resolved file name, line, message.
/// Hierarchy errors carry the offending class's location; a few global
/// checks (the missing entry class, the inheritance cycle) have no single
/// source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: Option<String>,
    pub line: u32,
    pub msg: String,
}

impl Diagnostic {
    pub fn at(file: impl Into<String>, line: u32, msg: impl Into<String>) -> Self {
        Self { file: Some(file.into()), line, msg: msg.into() }
    }

    pub fn global(msg: impl Into<String>) -> Self {
        Self { file: None, line: 0, msg: msg.into() }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}: {}", file, self.line, self.msg),
            None => write!(f, "{}", self.msg),
        }
    }
}

/// Accumulator for recoverable errors. Analysis keeps going within a pass to
/// maximize diagnostic yield; callers check `count()` between passes.
#[derive(Debug, Default)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diag: Diagnostic) {
        self.list.push(diag);
    }

    pub fn count(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.list
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    /// Hierarchy construction failed; the pipeline aborts immediately.
    #[error("{0}")]
    Fatal(Diagnostic),

    /// One or more semantic errors accumulated; the pipeline halted after
    /// the pass that produced them.
    #[error("compilation halted due to {} static semantic error(s)", .diagnostics.len())]
    Semant { diagnostics: Vec<Diagnostic> },

    #[error("Input error: {msg}")]
    Input { msg: String },

    #[error("Codegen error: {msg}")]
    Codegen { msg: String },
}

impl CompileError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input { msg: msg.into() }
    }

    pub fn codegen(msg: impl Into<String>) -> Self {
        Self::Codegen { msg: msg.into() }
    }
}

/// Render an error for the terminal, one diagnostic per line.
pub fn render_error(err: &CompileError) -> String {
    match err {
        CompileError::Semant { diagnostics } => {
            let mut out = String::new();
            for d in diagnostics {
                out.push_str(&format!("{d}\n"));
            }
            out.push_str(&format!("{err}\n"));
            out
        }
        other => format!("{other}\n"),
    }
}

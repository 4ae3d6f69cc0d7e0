//! Embedded engine interfaces
//!
//! The engine (scripting runtime, renderer, audio) is an external collaborator.
//! This module describes the narrow surface the worker thread drives:
//!
//! ```text
//! EngineFactory::create_interpreter()
//!   └─ Interpreter
//!        ├─ register_module / load_module   (bootstrap)
//!        ├─ set_args / set_module_field     (launch state)
//!        ├─ resume_boot_sequence() → BootStep::{Suspended, Completed}
//!        ├─ discard_results(n)
//!        └─ close()
//! ```
//!
//! The boot sequence is the engine's own resumable startup procedure. Each
//! resume runs until the engine yields (`Suspended`) or finishes
//! (`Completed`); the engine multiplexes its subsystems inside that call.
//!
//! [`headless::HeadlessEngine`] implements the interface without a window and
//! is used by the CLI and the tests.

use std::fmt;

use thiserror::Error;

pub mod headless;

pub use headless::{ExitReason, HeadlessEngine, HeadlessOptions, Journal};

/// Result of one resumption of the boot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStep {
    /// The sequence yielded, leaving `results` values the caller must discard.
    Suspended { results: usize },
    /// The sequence finished; the engine wants to exit.
    Completed,
}

/// Value assigned to a field of a loaded module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Nil,
    Bool(bool),
    Str(String),
}

impl fmt::Display for FlagValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            FlagValue::Nil => f.write_str("nil"),
            FlagValue::Bool(b) => write!(f, "{}", b),
            FlagValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Synthetic command line for one session.
///
/// The engine sees it two ways: as `argv` (`[program, resource, extra..]`) and
/// as an argument table where index -2 holds the program name, -1 the boot
/// script label and 1.. the arguments after the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArgs {
    program: String,
    script_label: String,
    args: Vec<String>,
}

impl LaunchArgs {
    pub fn new(
        program: impl Into<String>,
        script_label: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            script_label: script_label.into(),
            args: vec![resource.into()],
        }
    }

    /// Append an argument after the resource path.
    pub fn with_arg(
        mut self,
        arg: impl Into<String>,
    ) -> Self {
        self.args.push(arg.into());
        self
    }

    #[inline]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[inline]
    pub fn script_label(&self) -> &str {
        &self.script_label
    }

    /// The resource path (first argument).
    #[inline]
    pub fn resource(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }

    /// `argv` form: program followed by every argument.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Argument-table form as `(index, value)` pairs in ascending index order.
    pub fn table(&self) -> Vec<(i64, &str)> {
        let mut entries = vec![(-2, self.program.as_str()), (-1, self.script_label.as_str())];
        entries.extend(
            self.args
                .iter()
                .enumerate()
                .map(|(i, arg)| (i as i64 + 1, arg.as_str())),
        );
        entries
    }
}

/// Engine errors surfaced to the worker thread.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("cannot create interpreter: {0}")]
    Creation(String),

    #[error("module '{0}' not found")]
    ModuleNotFound(String),

    #[error("module '{0}' is not loaded")]
    ModuleNotLoaded(String),

    #[error("boot sequence is not loaded")]
    BootNotLoaded,

    #[error("error in {module}: {message}")]
    Script { module: String, message: String },
}

/// Creates interpreter instances. Shared with the worker thread.
pub trait EngineFactory: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Create a fresh interpreter. Called on the worker thread.
    fn create_interpreter(&self) -> Result<Box<dyn Interpreter>, EngineError>;
}

/// One interpreter instance, confined to the worker thread.
pub trait Interpreter {
    /// Make `name` available for lazy loading.
    fn register_module(&mut self, name: &str) -> Result<(), EngineError>;

    /// Load (require) a registered module.
    fn load_module(&mut self, name: &str) -> Result<(), EngineError>;

    /// Install the launch arguments.
    fn set_args(&mut self, args: &LaunchArgs);

    /// Assign `module.key = value` on a loaded module.
    fn set_module_field(
        &mut self,
        module: &str,
        key: &str,
        value: FlagValue,
    ) -> Result<(), EngineError>;

    /// Run the boot sequence until it yields or finishes.
    fn resume_boot_sequence(&mut self) -> Result<BootStep, EngineError>;

    /// Drop `count` values produced by the last resumption.
    fn discard_results(&mut self, count: usize);

    /// Tear the interpreter down.
    fn close(self: Box<Self>);
}

#[cfg(test)]
mod tests;

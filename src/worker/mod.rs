//! Worker thread runner
//!
//! The function executed on the dedicated engine thread for one session:
//!
//! 1. attach to the host environment (this thread was not created by the host)
//! 2. create an interpreter
//! 3. bootstrap: setup module, main module with the launch arguments, the
//!    embedded-mode flags, then the boot module
//! 4. resume the boot sequence until it completes, discarding whatever each
//!    suspension leaves behind
//! 5. close the interpreter and return, which ends the thread
//!
//! Engine failures are not translated into anything the host sees. They are
//! logged, the interpreter is closed, and the thread still terminates.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::engine::{BootStep, EngineError, EngineFactory, FlagValue, Interpreter, LaunchArgs};
use crate::host::{EnvironmentHandle, HandleRegistry};

pub mod spawn;

pub use spawn::{OsThreadSpawner, ThreadSpawner, WorkerBody};

/// Module names used during bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootPlan {
    pub setup_module: String,
    pub main_module: String,
    pub boot_module: String,
}

impl Default for BootPlan {
    fn default() -> Self {
        Self {
            setup_module: "love.jitsetup".to_string(),
            main_module: "love".to_string(),
            boot_module: "love.boot".to_string(),
        }
    }
}

/// How a worker run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerOutcome {
    /// The boot sequence completed after `steps` suspensions.
    Completed { steps: u64 },
    /// The engine failed during creation, bootstrap or execution.
    Failed(EngineError),
    /// The worker thread panicked.
    Panicked(String),
}

impl RunnerOutcome {
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, RunnerOutcome::Completed { .. })
    }
}

impl fmt::Display for RunnerOutcome {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            RunnerOutcome::Completed { steps } => write!(f, "completed after {} steps", steps),
            RunnerOutcome::Failed(err) => write!(f, "failed: {}", err),
            RunnerOutcome::Panicked(msg) => write!(f, "panicked: {}", msg),
        }
    }
}

/// Everything the worker needs, moved onto the thread at spawn.
pub struct WorkerContext {
    pub engine: Arc<dyn EngineFactory>,
    pub registry: Arc<HandleRegistry>,
    pub env: EnvironmentHandle,
    pub args: LaunchArgs,
    pub plan: BootPlan,
}

impl fmt::Debug for WorkerContext {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("engine", &self.engine.name())
            .field("env", &self.env)
            .field("args", &self.args)
            .field("plan", &self.plan)
            .finish()
    }
}

/// Run one session to completion on the calling thread.
pub fn run_session(ctx: WorkerContext) -> RunnerOutcome {
    let _attach = match ctx.registry.attach(ctx.env) {
        Ok(guard) => Some(guard),
        Err(err) => {
            warn!(error = %err, "worker running without host environment");
            None
        }
    };

    info!(
        engine = ctx.engine.name(),
        resource = ctx.args.resource(),
        "starting embedded engine"
    );

    let mut interp = match ctx.engine.create_interpreter() {
        Ok(interp) => interp,
        Err(err) => {
            error!(error = %err, "interpreter creation failed");
            return RunnerOutcome::Failed(err);
        }
    };

    let result = bootstrap(interp.as_mut(), &ctx.args, &ctx.plan)
        .and_then(|()| drive_boot_sequence(interp.as_mut()));
    interp.close();

    match result {
        Ok(steps) => {
            info!(steps, "embedded engine finished");
            RunnerOutcome::Completed { steps }
        }
        Err(err) => {
            error!(error = %err, "embedded engine failed");
            RunnerOutcome::Failed(err)
        }
    }
}

/// Fixed bootstrap order.
///
/// The restart field is cleared because embedded mode has no host-level
/// restart protocol.
pub fn bootstrap(
    interp: &mut dyn Interpreter,
    args: &LaunchArgs,
    plan: &BootPlan,
) -> Result<(), EngineError> {
    interp.register_module(&plan.setup_module)?;
    interp.load_module(&plan.setup_module)?;

    interp.register_module(&plan.main_module)?;
    interp.set_args(args);
    interp.load_module(&plan.main_module)?;
    interp.set_module_field(&plan.main_module, "_exe", FlagValue::Bool(true))?;
    interp.set_module_field(&plan.main_module, "restart", FlagValue::Nil)?;

    interp.load_module(&plan.boot_module)?;
    debug!(argv = ?args.argv(), "bootstrap complete");
    Ok(())
}

/// Resume the boot sequence until it completes. Returns the number of
/// suspensions.
pub fn drive_boot_sequence(interp: &mut dyn Interpreter) -> Result<u64, EngineError> {
    let mut steps = 0u64;
    loop {
        match interp.resume_boot_sequence()? {
            BootStep::Suspended { results } => {
                interp.discard_results(results);
                steps += 1;
            }
            BootStep::Completed => return Ok(steps),
        }
    }
}

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

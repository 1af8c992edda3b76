//! Script runtime management
//!
//! One QuickJS runtime and context with the `uv` namespace and a `print`
//! function installed as globals. Scripts schedule work on the event loop;
//! [`ScriptRuntime::run_loop`] drives it to completion afterwards.

use std::path::Path;
use std::rc::Rc;

use rquickjs::{CatchResultExt, Context, Function, Object, Runtime};
use tern_core::RunMode;
use tracing::{debug, info};

use crate::bindings::{self, Binding};
use crate::error::ScriptError;

/// Engine limits. `None` keeps the QuickJS default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptLimits {
    pub memory_limit: Option<usize>,
    pub max_stack_size: Option<usize>,
    pub gc_threshold: Option<usize>,
}

/// Script execution context
pub struct ScriptRuntime {
    binding: Rc<Binding>,
    pub context: Context,
    #[allow(dead_code)] // Kept alive for context lifetime
    runtime: Runtime,
}

impl ScriptRuntime {
    pub fn new() -> Result<Self, ScriptError> {
        Self::with_limits(ScriptLimits::default())
    }

    pub fn with_limits(limits: ScriptLimits) -> Result<Self, ScriptError> {
        let runtime = Runtime::new()?;
        if let Some(limit) = limits.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(limit) = limits.max_stack_size {
            runtime.set_max_stack_size(limit);
        }
        if let Some(threshold) = limits.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }
        let context = Context::full(&runtime)?;
        let binding = Binding::new()?;

        context.with(|ctx| -> Result<(), ScriptError> {
            let globals = ctx.globals();
            globals.set(
                "print",
                Function::new(ctx.clone(), |msg: String| println!("{msg}"))?,
            )?;
            let ns = Object::new(ctx.clone())?;
            bindings::init(&ctx, &ns, &binding)?;
            globals.set("uv", ns)?;
            Ok(())
        })?;

        info!(?limits, "script runtime ready");
        Ok(Self {
            binding,
            context,
            runtime,
        })
    }

    pub fn execute_file(&self, path: &Path) -> Result<(), ScriptError> {
        let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = source.len(), "executing script");
        self.execute(&source)
    }

    pub fn execute(&self, source: &str) -> Result<(), ScriptError> {
        self.context.with(|ctx| {
            ctx.eval::<(), _>(source)
                .catch(&ctx)
                .map_err(|e| ScriptError::Js(e.to_string()))
        })
    }

    /// Call a JavaScript function by name with no arguments.
    pub fn call_function(&self, name: &str) -> Result<(), ScriptError> {
        self.context.with(|ctx| {
            let globals = ctx.globals();
            let func: Function = globals.get(name)?;
            func.call::<_, ()>(())
                .catch(&ctx)
                .map_err(|e| ScriptError::Js(e.to_string()))
        })
    }

    /// Run the event loop until nothing keeps it alive. Returns whether it
    /// is still alive, which only happens when a callback stopped it.
    pub fn run_loop(&self) -> Result<bool, ScriptError> {
        self.context.with(|ctx| {
            self.binding
                .run(&ctx, RunMode::Default)
                .catch(&ctx)
                .map_err(|e| ScriptError::Js(e.to_string()))
        })
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        // Retained callbacks must be released while the engine is alive.
        self.binding.clear_callbacks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_are_installed() {
        let runtime = ScriptRuntime::new().unwrap();
        let kinds: String = runtime
            .context
            .with(|ctx| ctx.eval("typeof print + ' ' + typeof uv + ' ' + typeof uv.run"))
            .unwrap();
        assert_eq!(kinds, "function object function");
    }

    #[test]
    fn uncaught_exceptions_carry_their_message() {
        let runtime = ScriptRuntime::new().unwrap();
        let err = runtime.execute("throw new Error('nope')").unwrap_err();
        assert!(matches!(&err, ScriptError::Js(msg) if msg.contains("nope")), "{err}");
    }

    #[test]
    fn call_function_invokes_a_global() {
        let runtime = ScriptRuntime::new().unwrap();
        runtime
            .execute("var calls = 0; function tick() { calls += 1; }")
            .unwrap();
        runtime.call_function("tick").unwrap();
        runtime.call_function("tick").unwrap();
        let calls: f64 = runtime.context.with(|ctx| ctx.eval("calls")).unwrap();
        assert_eq!(calls, 2.0);
        assert!(runtime.call_function("missing").is_err());
    }

    #[test]
    fn missing_script_file_is_a_read_error() {
        let runtime = ScriptRuntime::new().unwrap();
        let err = runtime
            .execute_file(Path::new("/nonexistent/tern/script.js"))
            .unwrap_err();
        assert!(matches!(err, ScriptError::Read { .. }));
    }

    #[test]
    fn limits_are_applied() {
        let limits = ScriptLimits {
            memory_limit: Some(64 * 1024 * 1024),
            max_stack_size: Some(512 * 1024),
            gc_threshold: None,
        };
        let runtime = ScriptRuntime::with_limits(limits).unwrap();
        runtime.execute("var x = [1, 2, 3].map(function (v) { return v * 2; });").unwrap();
    }

    #[test]
    fn dropping_with_pending_callbacks_is_clean() {
        let runtime = ScriptRuntime::new().unwrap();
        runtime
            .execute("var t = uv.new_timer(); uv.timer_start(t, 1000, 0, function () {});")
            .unwrap();
        assert_eq!(runtime.binding().callback_count(), 1);
        drop(runtime);
    }
}

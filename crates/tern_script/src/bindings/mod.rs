//! The `uv` namespace
//!
//! Script-facing functions over [`tern_core::EventLoop`] and [`tern_env`].
//! Every function converts its arguments, makes one loop or environment call
//! and converts the result back. Asynchronous results arrive through
//! callbacks that [`Binding::run`] invokes while the loop is running.
//!
//! Callbacks follow the `(err, ...)` convention: `err` is `null` on success
//! and a `"CODE: message"` string otherwise. Synchronous failures throw.

mod callbacks;
mod handle;
mod shim;
mod stream;
mod tcp;
mod timer;

use std::cell::RefCell;
use std::rc::Rc;

use rquickjs::{CatchResultExt, Ctx, Exception, IntoJs, Object, Value};
use tern_core::{EventLoop, HandleId, HandleKind, LoopError, RunMode};
use thiserror::Error;
use tracing::{debug, error};

use callbacks::Callbacks;

/// Failure of one setup step. The namespace is left untouched.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("error in {step} setup: {message}")]
    Step { step: &'static str, message: String },
}

type Initializer = for<'js> fn(&Ctx<'js>, &Object<'js>, &Rc<Binding>) -> rquickjs::Result<()>;

/// Setup steps, run in order.
const STEPS: [(&str, Initializer); 5] = [
    ("functions", shim::init),
    ("handle", handle::init),
    ("stream", stream::init),
    ("tcp", tcp::init),
    ("timer", timer::init),
];

/// Register every `uv` function into `ns`.
///
/// Steps register into a staging object that is copied onto `ns` only once
/// all of them succeeded, so a failed setup registers nothing.
pub fn init<'js>(ctx: &Ctx<'js>, ns: &Object<'js>, binding: &Rc<Binding>) -> Result<(), InitError> {
    init_steps(ctx, ns, binding, &STEPS)
}

fn init_steps<'js>(
    ctx: &Ctx<'js>,
    ns: &Object<'js>,
    binding: &Rc<Binding>,
    steps: &[(&'static str, Initializer)],
) -> Result<(), InitError> {
    let staging = Object::new(ctx.clone())
        .catch(ctx)
        .map_err(|e| step_failed("namespace", e))?;

    for &(step, init) in steps {
        init(ctx, &staging, binding)
            .catch(ctx)
            .map_err(|e| step_failed(step, e))?;
    }

    let publish = || -> rquickjs::Result<usize> {
        let mut count = 0;
        for prop in staging.props::<String, Value>() {
            let (name, value) = prop?;
            ns.set(name, value)?;
            count += 1;
        }
        Ok(count)
    };
    let count = publish().catch(ctx).map_err(|e| step_failed("namespace", e))?;
    debug!(functions = count, "uv namespace registered");
    Ok(())
}

fn step_failed(step: &'static str, err: impl std::fmt::Display) -> InitError {
    let message = err.to_string();
    error!(step, %message, "binding setup failed");
    InitError::Step { step, message }
}

/// Loop state shared by every registered function.
pub struct Binding {
    event_loop: EventLoop,
    callbacks: RefCell<Callbacks>,
}

impl Binding {
    pub fn new() -> Result<Rc<Self>, LoopError> {
        Ok(Rc::new(Self {
            event_loop: EventLoop::new()?,
            callbacks: RefCell::new(Callbacks::default()),
        }))
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Run the loop, invoking script callbacks as completions arrive. An
    /// exception thrown by a callback stops the loop and propagates.
    pub fn run<'js>(&self, ctx: &Ctx<'js>, mode: RunMode) -> rquickjs::Result<bool> {
        self.event_loop
            .run(mode, |completion| self.dispatch(ctx, completion))
    }

    /// Drop every retained callback. Must happen before the engine goes away.
    pub fn clear_callbacks(&self) {
        self.callbacks.borrow_mut().clear();
    }

    /// Callbacks currently retained.
    pub fn callback_count(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub(crate) fn callbacks(&self) -> std::cell::RefMut<'_, Callbacks> {
        self.callbacks.borrow_mut()
    }
}

// ============================================================================
// Conversion helpers shared by the sub-bindings
// ============================================================================

/// Turn loop errors into thrown exceptions.
pub(crate) trait OrThrow<T> {
    fn or_throw(self, ctx: &Ctx<'_>) -> rquickjs::Result<T>;
}

impl<T> OrThrow<T> for Result<T, LoopError> {
    fn or_throw(self, ctx: &Ctx<'_>) -> rquickjs::Result<T> {
        self.map_err(|e| Exception::throw_message(ctx, &error_message(&e)))
    }
}

pub(crate) fn error_message(err: &LoopError) -> String {
    format!("{}: {}", err.code(), err)
}

/// `null` for success, the error string otherwise.
pub(crate) fn error_value<'js>(
    ctx: &Ctx<'js>,
    err: Option<&LoopError>,
) -> rquickjs::Result<Value<'js>> {
    match err {
        None => Ok(Value::new_null(ctx.clone())),
        Some(e) => error_message(e).into_js(ctx),
    }
}

/// Script representation of a handle: `{ id, kind }`.
pub(crate) fn handle_object<'js>(
    ctx: &Ctx<'js>,
    id: HandleId,
    kind: HandleKind,
) -> rquickjs::Result<Object<'js>> {
    let obj = Object::new(ctx.clone())?;
    obj.set("id", id.to_bits() as f64)?;
    obj.set("kind", kind.as_str())?;
    Ok(obj)
}

pub(crate) fn handle_id<'js>(ctx: &Ctx<'js>, handle: &Object<'js>) -> rquickjs::Result<HandleId> {
    let id: Value<'js> = handle.get("id")?;
    match id.as_number() {
        Some(bits) if bits >= 1.0 && bits.fract() == 0.0 => Ok(HandleId::from_bits(bits as u64)),
        _ => Err(Exception::throw_type(ctx, "expected a handle object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    fn failing_step<'js>(
        ctx: &Ctx<'js>,
        _ns: &Object<'js>,
        _binding: &Rc<Binding>,
    ) -> rquickjs::Result<()> {
        Err(Exception::throw_message(ctx, "no sockets today"))
    }

    #[test]
    fn failed_step_registers_nothing() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        let binding = Binding::new().unwrap();

        context.with(|ctx| {
            let ns = Object::new(ctx.clone()).unwrap();
            let steps: [(&'static str, Initializer); 2] =
                [("functions", shim::init), ("tcp", failing_step)];
            let err = init_steps(&ctx, &ns, &binding, &steps).unwrap_err();

            let InitError::Step { step, message } = err;
            assert_eq!(step, "tcp");
            assert!(message.contains("no sockets today"));
            assert_eq!(ns.keys::<String>().count(), 0);
        });
        binding.clear_callbacks();
    }

    #[test]
    fn full_setup_registers_every_function() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        let binding = Binding::new().unwrap();

        context.with(|ctx| {
            let ns = Object::new(ctx.clone()).unwrap();
            init(&ctx, &ns, &binding).unwrap();
            for name in [
                "run", "ref", "unref", "exepath", "get_free_memory", "get_total_memory",
                "loadavg", "uptime", "close", "is_active", "read_start", "write", "new_tcp",
                "tcp_connect", "listen", "accept", "new_timer", "timer_start",
            ] {
                let value: Value = ns.get(name).unwrap();
                assert!(value.is_function(), "{name} is not registered");
            }
        });
        binding.clear_callbacks();
    }

    #[test]
    fn loop_errors_format_with_their_code() {
        let err = LoopError::BadHandle(HandleId::from_bits(3));
        assert_eq!(error_message(&err), "EBADF: unknown handle #3");
    }
}

//! Script callbacks retained across loop iterations, and their dispatch.

use std::collections::HashMap;

use rquickjs::{ArrayBuffer, Ctx, Function, IntoJs, Persistent, Value};
use tern_core::{Completion, HandleId, RequestId};
use tracing::trace;

use super::{error_value, Binding};

pub(crate) type Callback = Persistent<Function<'static>>;

/// Callbacks keyed by the handle or request they belong to.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub timers: HashMap<HandleId, Callback>,
    pub reads: HashMap<HandleId, Callback>,
    pub connections: HashMap<HandleId, Callback>,
    pub closes: HashMap<HandleId, Callback>,
    pub requests: HashMap<RequestId, Callback>,
}

impl Callbacks {
    pub fn save<'js>(ctx: &Ctx<'js>, callback: Function<'js>) -> Callback {
        Persistent::save(ctx, callback)
    }

    /// Forget everything registered for a closed handle, handing back its
    /// close callback.
    fn forget(&mut self, handle: HandleId) -> Option<Callback> {
        self.timers.remove(&handle);
        self.reads.remove(&handle);
        self.connections.remove(&handle);
        self.closes.remove(&handle)
    }

    pub fn clear(&mut self) {
        self.timers.clear();
        self.reads.clear();
        self.connections.clear();
        self.closes.clear();
        self.requests.clear();
    }

    pub fn len(&self) -> usize {
        self.timers.len()
            + self.reads.len()
            + self.connections.len()
            + self.closes.len()
            + self.requests.len()
    }
}

impl Binding {
    /// Invoke the script callback for one completion. The registry borrow is
    /// released before the call so callbacks may register new ones.
    pub(super) fn dispatch<'js>(
        &self,
        ctx: &Ctx<'js>,
        completion: Completion,
    ) -> rquickjs::Result<()> {
        match completion {
            Completion::Timer { handle } => {
                let callback = self.callbacks().timers.get(&handle).cloned();
                if let Some(callback) = callback {
                    callback.restore(ctx)?.call::<_, ()>(())?;
                }
            }
            Completion::Connection { handle, result } => {
                let callback = self.callbacks().connections.get(&handle).cloned();
                if let Some(callback) = callback {
                    let err = error_value(ctx, result.as_ref().err())?;
                    callback.restore(ctx)?.call::<_, ()>((err,))?;
                }
            }
            Completion::Read { handle, result } => {
                let callback = {
                    let mut callbacks = self.callbacks();
                    match result {
                        // Reading stops after EOF or an error.
                        Ok(Some(_)) => callbacks.reads.get(&handle).cloned(),
                        _ => callbacks.reads.remove(&handle),
                    }
                };
                let Some(callback) = callback else {
                    return Ok(());
                };
                let (err, data) = match result {
                    Ok(Some(bytes)) => (
                        Value::new_null(ctx.clone()),
                        ArrayBuffer::new(ctx.clone(), bytes)?.into_js(ctx)?,
                    ),
                    Ok(None) => (Value::new_null(ctx.clone()), Value::new_null(ctx.clone())),
                    Err(e) => (error_value(ctx, Some(&e))?, Value::new_null(ctx.clone())),
                };
                callback.restore(ctx)?.call::<_, ()>((err, data))?;
            }
            Completion::Request {
                request,
                kind,
                result,
                ..
            } => {
                let callback = self.callbacks().requests.remove(&request);
                trace!(%request, ?kind, ok = result.is_ok(), "request completed");
                if let Some(callback) = callback {
                    let err = error_value(ctx, result.as_ref().err())?;
                    callback.restore(ctx)?.call::<_, ()>((err,))?;
                }
            }
            Completion::Closed { handle } => {
                let callback = self.callbacks().forget(handle);
                if let Some(callback) = callback {
                    callback.restore(ctx)?.call::<_, ()>(())?;
                }
            }
        }
        Ok(())
    }
}

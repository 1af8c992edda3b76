//! Operations shared by every handle kind.

use std::rc::Rc;

use rquickjs::function::Opt;
use rquickjs::{Ctx, Function, Object};

use super::callbacks::Callbacks;
use super::{handle_id, Binding, OrThrow};

pub(super) fn init<'js>(
    ctx: &Ctx<'js>,
    ns: &Object<'js>,
    binding: &Rc<Binding>,
) -> rquickjs::Result<()> {
    let b = binding.clone();
    ns.set(
        "close",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, handle: Object<'js>, callback: Opt<Function<'js>>| {
                let id = handle_id(&ctx, &handle)?;
                b.event_loop().close(id).or_throw(&ctx)?;
                if let Some(callback) = callback.0 {
                    b.callbacks()
                        .closes
                        .insert(id, Callbacks::save(&ctx, callback));
                }
                Ok::<_, rquickjs::Error>(())
            },
        )?,
    )?;

    let b = binding.clone();
    ns.set(
        "is_active",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, handle: Object<'js>| {
            let id = handle_id(&ctx, &handle)?;
            b.event_loop().is_active(id).or_throw(&ctx)
        })?,
    )?;

    let b = binding.clone();
    ns.set(
        "has_ref",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, handle: Object<'js>| {
            let id = handle_id(&ctx, &handle)?;
            b.event_loop().has_ref(id).or_throw(&ctx)
        })?,
    )?;

    let b = binding.clone();
    ns.set(
        "ref_handle",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, handle: Object<'js>| {
            let id = handle_id(&ctx, &handle)?;
            b.event_loop().ref_handle(id).or_throw(&ctx)
        })?,
    )?;

    let b = binding.clone();
    ns.set(
        "unref_handle",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, handle: Object<'js>| {
            let id = handle_id(&ctx, &handle)?;
            b.event_loop().unref_handle(id).or_throw(&ctx)
        })?,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::ScriptRuntime;

    #[test]
    fn close_runs_its_callback_and_forgets_the_handle() {
        let runtime = ScriptRuntime::new().unwrap();
        let result: String = runtime
            .context
            .with(|ctx| {
                ctx.eval(
                    r#"
                    var log = [];
                    var t = uv.new_timer();
                    uv.close(t, function () { log.push("closed"); });
                    uv.run();
                    try { uv.is_active(t); } catch (e) { log.push(e.message); }
                    log.join("|");
                    "#,
                )
            })
            .unwrap();
        assert_eq!(result, "closed|EBADF: unknown handle #1");
    }

    #[test]
    fn bad_arguments_throw() {
        let runtime = ScriptRuntime::new().unwrap();
        let message: String = runtime
            .context
            .with(|ctx| {
                ctx.eval(
                    r#"
                    var msg = "";
                    try { uv.close({ id: 999 }); } catch (e) { msg = e.message; }
                    msg;
                    "#,
                )
            })
            .unwrap();
        assert!(message.starts_with("EBADF"), "{message}");

        let message: String = runtime
            .context
            .with(|ctx| {
                ctx.eval(
                    r#"
                    var msg = "";
                    try { uv.close({ name: "nope" }); } catch (e) { msg = e.message; }
                    msg;
                    "#,
                )
            })
            .unwrap();
        assert_eq!(message, "expected a handle object");
    }

    #[test]
    fn unref_handle_lets_run_return() {
        let runtime = ScriptRuntime::new().unwrap();
        let active: bool = runtime
            .context
            .with(|ctx| {
                ctx.eval(
                    r#"
                    var t = uv.new_timer();
                    uv.timer_start(t, 60000, 0, function () {});
                    uv.unref_handle(t);
                    uv.run();
                    uv.is_active(t) && !uv.has_ref(t) && uv.ref_count() === 0;
                    "#,
                )
            })
            .unwrap();
        assert!(active);
    }
}

//! Timer handles. Times are in milliseconds.

use std::rc::Rc;
use std::time::Duration;

use rquickjs::{Ctx, Exception, Function, Object};
use tern_core::HandleKind;

use super::callbacks::Callbacks;
use super::{handle_id, handle_object, Binding, OrThrow};

pub(super) fn init<'js>(
    ctx: &Ctx<'js>,
    ns: &Object<'js>,
    binding: &Rc<Binding>,
) -> rquickjs::Result<()> {
    let b = binding.clone();
    ns.set(
        "new_timer",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>| {
            handle_object(&ctx, b.event_loop().timer_new(), HandleKind::Timer)
        })?,
    )?;

    let b = binding.clone();
    ns.set(
        "timer_start",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  timer: Object<'js>,
                  timeout: f64,
                  repeat: f64,
                  callback: Function<'js>| {
                let id = handle_id(&ctx, &timer)?;
                let timeout = millis(&ctx, "timeout", timeout)?;
                let repeat = millis(&ctx, "repeat", repeat)?;
                b.event_loop()
                    .timer_start(id, timeout, Some(repeat))
                    .or_throw(&ctx)?;
                b.callbacks()
                    .timers
                    .insert(id, Callbacks::save(&ctx, callback));
                Ok::<_, rquickjs::Error>(())
            },
        )?,
    )?;

    let b = binding.clone();
    ns.set(
        "timer_stop",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, timer: Object<'js>| {
            let id = handle_id(&ctx, &timer)?;
            b.event_loop().timer_stop(id).or_throw(&ctx)
        })?,
    )?;

    let b = binding.clone();
    ns.set(
        "timer_get_repeat",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, timer: Object<'js>| {
            let id = handle_id(&ctx, &timer)?;
            let repeat = b.event_loop().timer_repeat(id).or_throw(&ctx)?;
            Ok::<_, rquickjs::Error>(repeat.map_or(0.0, |period| period.as_nanos() as f64 / 1e6))
        })?,
    )?;

    Ok(())
}

fn millis(ctx: &Ctx<'_>, what: &str, ms: f64) -> rquickjs::Result<Duration> {
    if !ms.is_finite() || ms < 0.0 {
        return Err(Exception::throw_range(
            ctx,
            &format!("{what} must be a non-negative number of milliseconds"),
        ));
    }
    Duration::try_from_secs_f64(ms / 1000.0)
        .map_err(|_| Exception::throw_range(ctx, &format!("{what} is too large")))
}

#[cfg(test)]
mod tests {
    use crate::ScriptRuntime;

    #[test]
    fn timers_fire_in_deadline_order() {
        let runtime = ScriptRuntime::new().unwrap();
        runtime
            .execute(
                r#"
                var order = [];
                var slow = uv.new_timer();
                var fast = uv.new_timer();
                uv.timer_start(slow, 30, 0, function () { order.push("slow"); uv.close(slow); });
                uv.timer_start(fast, 1, 0, function () { order.push("fast"); uv.close(fast); });
                uv.run();
                "#,
            )
            .unwrap();
        let order: String = runtime
            .context
            .with(|ctx| ctx.eval("order.join(',')"))
            .unwrap();
        assert_eq!(order, "fast,slow");
        assert_eq!(runtime.binding().callback_count(), 0);
    }

    #[test]
    fn repeating_timer_stops_from_its_callback() {
        let runtime = ScriptRuntime::new().unwrap();
        let ticks: f64 = runtime
            .context
            .with(|ctx| {
                ctx.eval(
                    r#"
                    var ticks = 0;
                    var t = uv.new_timer();
                    uv.timer_start(t, 0, 2, function () {
                        if (++ticks === 3) uv.timer_stop(t);
                    });
                    var repeat = uv.timer_get_repeat(t);
                    uv.run();
                    repeat === 2 ? ticks : -1;
                    "#,
                )
            })
            .unwrap();
        assert_eq!(ticks, 3.0);
    }

    #[test]
    fn negative_timeouts_throw() {
        let runtime = ScriptRuntime::new().unwrap();
        let message: String = runtime
            .context
            .with(|ctx| {
                ctx.eval(
                    r#"
                    var msg = "";
                    var t = uv.new_timer();
                    try { uv.timer_start(t, -1, 0, function () {}); } catch (e) { msg = e.message; }
                    msg;
                    "#,
                )
            })
            .unwrap();
        assert_eq!(message, "timeout must be a non-negative number of milliseconds");
    }

    #[test]
    fn oversized_timeouts_throw() {
        let runtime = ScriptRuntime::new().unwrap();
        let message: String = runtime
            .context
            .with(|ctx| {
                ctx.eval(
                    r#"
                    var out = [];
                    var t = uv.new_timer();
                    try { uv.timer_start(t, 1e300, 0, function () {}); } catch (e) { out.push(e.message); }
                    try { uv.timer_start(t, 0, 1e300, function () {}); } catch (e) { out.push(e.message); }
                    out.push(String(uv.is_active(t)));
                    out.join("|");
                    "#,
                )
            })
            .unwrap();
        assert_eq!(
            message,
            "timeout is too large|repeat is too large|false"
        );
        assert_eq!(runtime.binding().callback_count(), 0);
    }

    #[test]
    fn far_future_repeat_is_accepted() {
        let runtime = ScriptRuntime::new().unwrap();
        let fired: f64 = runtime
            .context
            .with(|ctx| {
                ctx.eval(
                    r#"
                    var fired = 0;
                    var t = uv.new_timer();
                    uv.timer_start(t, 0, 1e15, function () { fired += 1; uv.timer_stop(t); });
                    uv.run();
                    fired;
                    "#,
                )
            })
            .unwrap();
        assert_eq!(fired, 1.0);
    }

    #[test]
    fn callback_exceptions_stop_the_loop() {
        let runtime = ScriptRuntime::new().unwrap();
        runtime
            .execute(
                r#"
                var t = uv.new_timer();
                uv.timer_start(t, 0, 0, function () { throw new Error("boom"); });
                "#,
            )
            .unwrap();
        let err = runtime.run_loop().unwrap_err();
        assert!(err.to_string().contains("boom"), "{err}");
    }
}

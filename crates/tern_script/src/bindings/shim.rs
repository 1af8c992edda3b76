//! Loop control and host queries.

use std::rc::Rc;

use rquickjs::{Ctx, Exception, Function, Object};
use tern_core::RunMode;

use super::Binding;

pub(super) fn init<'js>(
    ctx: &Ctx<'js>,
    ns: &Object<'js>,
    binding: &Rc<Binding>,
) -> rquickjs::Result<()> {
    let b = binding.clone();
    ns.set(
        "run",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>| -> rquickjs::Result<()> {
            b.run(&ctx, RunMode::Default).map(|_| ())
        })?,
    )?;

    // Single iterations report whether the loop is still alive.
    let b = binding.clone();
    ns.set(
        "run_once",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>| b.run(&ctx, RunMode::Once))?,
    )?;
    let b = binding.clone();
    ns.set(
        "run_nowait",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>| b.run(&ctx, RunMode::NoWait))?,
    )?;

    let b = binding.clone();
    ns.set(
        "ref",
        Function::new(ctx.clone(), move || b.event_loop().ref_loop())?,
    )?;
    let b = binding.clone();
    ns.set(
        "unref",
        Function::new(ctx.clone(), move || b.event_loop().unref_loop())?,
    )?;
    let b = binding.clone();
    ns.set(
        "ref_count",
        Function::new(ctx.clone(), move || b.event_loop().ref_count() as f64)?,
    )?;

    ns.set(
        "exepath",
        Function::new(ctx.clone(), |ctx: Ctx<'js>| -> rquickjs::Result<String> {
            tern_env::exe_path()
                .map_err(|e| Exception::throw_message(&ctx, &format!("exepath: {}: {e}", e.code())))
        })?,
    )?;
    ns.set(
        "get_free_memory",
        Function::new(ctx.clone(), || tern_env::free_memory() as f64)?,
    )?;
    ns.set(
        "get_total_memory",
        Function::new(ctx.clone(), || tern_env::total_memory() as f64)?,
    )?;
    ns.set(
        "loadavg",
        Function::new(ctx.clone(), || tern_env::loadavg().to_vec())?,
    )?;
    ns.set("uptime", Function::new(ctx.clone(), tern_env::uptime)?)?;

    Ok(())
}

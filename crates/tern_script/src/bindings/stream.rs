//! Reading from and writing to connected streams.

use std::rc::Rc;

use rquickjs::function::Opt;
use rquickjs::{ArrayBuffer, Ctx, Exception, Function, Object, TypedArray, Value};

use super::callbacks::Callbacks;
use super::{handle_id, Binding, OrThrow};

pub(super) fn init<'js>(
    ctx: &Ctx<'js>,
    ns: &Object<'js>,
    binding: &Rc<Binding>,
) -> rquickjs::Result<()> {
    let b = binding.clone();
    ns.set(
        "read_start",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, stream: Object<'js>, callback: Function<'js>| {
                let id = handle_id(&ctx, &stream)?;
                b.event_loop().read_start(id).or_throw(&ctx)?;
                b.callbacks()
                    .reads
                    .insert(id, Callbacks::save(&ctx, callback));
                Ok::<_, rquickjs::Error>(())
            },
        )?,
    )?;

    let b = binding.clone();
    ns.set(
        "read_stop",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, stream: Object<'js>| {
            let id = handle_id(&ctx, &stream)?;
            b.event_loop().read_stop(id).or_throw(&ctx)?;
            b.callbacks().reads.remove(&id);
            Ok::<_, rquickjs::Error>(())
        })?,
    )?;

    let b = binding.clone();
    ns.set(
        "write",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  stream: Object<'js>,
                  data: Value<'js>,
                  callback: Opt<Function<'js>>| {
                let id = handle_id(&ctx, &stream)?;
                let bytes = bytes_of(&ctx, data)?;
                let request = b.event_loop().write(id, bytes).or_throw(&ctx)?;
                if let Some(callback) = callback.0 {
                    b.callbacks()
                        .requests
                        .insert(request, Callbacks::save(&ctx, callback));
                }
                Ok::<_, rquickjs::Error>(())
            },
        )?,
    )?;

    let b = binding.clone();
    ns.set(
        "shutdown",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, stream: Object<'js>, callback: Opt<Function<'js>>| {
                let id = handle_id(&ctx, &stream)?;
                let request = b.event_loop().shutdown(id).or_throw(&ctx)?;
                if let Some(callback) = callback.0 {
                    b.callbacks()
                        .requests
                        .insert(request, Callbacks::save(&ctx, callback));
                }
                Ok::<_, rquickjs::Error>(())
            },
        )?,
    )?;

    Ok(())
}

/// Payload bytes from a string, `ArrayBuffer` or `Uint8Array`.
fn bytes_of<'js>(ctx: &Ctx<'js>, data: Value<'js>) -> rquickjs::Result<Vec<u8>> {
    if let Some(text) = data.as_string() {
        return Ok(text.to_string()?.into_bytes());
    }
    let bytes = if let Ok(array) = data.get::<TypedArray<'js, u8>>() {
        array.as_bytes().map(<[u8]>::to_vec)
    } else if let Ok(buffer) = data.get::<ArrayBuffer<'js>>() {
        buffer.as_bytes().map(<[u8]>::to_vec)
    } else {
        return Err(Exception::throw_type(
            ctx,
            "write expects a string, ArrayBuffer or Uint8Array",
        ));
    };
    bytes.ok_or_else(|| Exception::throw_type(ctx, "write on a detached buffer"))
}

//! TCP handles.

use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;

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
        "new_tcp",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>| {
            handle_object(&ctx, b.event_loop().tcp_new(), HandleKind::Tcp)
        })?,
    )?;

    let b = binding.clone();
    ns.set(
        "tcp_bind",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, tcp: Object<'js>, host: String, port: f64| {
                let id = handle_id(&ctx, &tcp)?;
                let addr = socket_addr(&ctx, &host, port)?;
                b.event_loop().tcp_bind(id, addr).or_throw(&ctx)
            },
        )?,
    )?;

    let b = binding.clone();
    ns.set(
        "listen",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, tcp: Object<'js>, backlog: f64, callback: Function<'js>| {
                let id = handle_id(&ctx, &tcp)?;
                let backlog = backlog.clamp(0.0, u32::MAX as f64) as u32;
                b.event_loop().tcp_listen(id, backlog).or_throw(&ctx)?;
                b.callbacks()
                    .connections
                    .insert(id, Callbacks::save(&ctx, callback));
                Ok::<_, rquickjs::Error>(())
            },
        )?,
    )?;

    let b = binding.clone();
    ns.set(
        "accept",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, server: Object<'js>| {
            let id = handle_id(&ctx, &server)?;
            let client = b.event_loop().tcp_accept(id).or_throw(&ctx)?;
            handle_object(&ctx, client, HandleKind::Tcp)
        })?,
    )?;

    let b = binding.clone();
    ns.set(
        "tcp_connect",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  tcp: Object<'js>,
                  host: String,
                  port: f64,
                  callback: Function<'js>| {
                let id = handle_id(&ctx, &tcp)?;
                let addr = socket_addr(&ctx, &host, port)?;
                let request = b.event_loop().tcp_connect(id, addr).or_throw(&ctx)?;
                b.callbacks()
                    .requests
                    .insert(request, Callbacks::save(&ctx, callback));
                Ok::<_, rquickjs::Error>(())
            },
        )?,
    )?;

    let b = binding.clone();
    ns.set(
        "tcp_getsockname",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, tcp: Object<'js>| {
            let id = handle_id(&ctx, &tcp)?;
            let addr = b.event_loop().tcp_local_addr(id).or_throw(&ctx)?;
            address_object(&ctx, addr)
        })?,
    )?;

    let b = binding.clone();
    ns.set(
        "tcp_getpeername",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, tcp: Object<'js>| {
            let id = handle_id(&ctx, &tcp)?;
            let addr = b.event_loop().tcp_peer_addr(id).or_throw(&ctx)?;
            address_object(&ctx, addr)
        })?,
    )?;

    Ok(())
}

/// Numeric host plus port. Names are not resolved.
fn socket_addr(ctx: &Ctx<'_>, host: &str, port: f64) -> rquickjs::Result<SocketAddr> {
    let ip: IpAddr = host
        .parse()
        .map_err(|_| Exception::throw_message(ctx, &format!("EINVAL: invalid address {host:?}")))?;
    if !(0.0..=65535.0).contains(&port) || port.fract() != 0.0 {
        return Err(Exception::throw_range(ctx, &format!("invalid port {port}")));
    }
    Ok(SocketAddr::new(ip, port as u16))
}

/// `{ address, port, family }` for a socket address.
fn address_object<'js>(ctx: &Ctx<'js>, addr: SocketAddr) -> rquickjs::Result<Object<'js>> {
    let obj = Object::new(ctx.clone())?;
    obj.set("address", addr.ip().to_string())?;
    obj.set("port", i32::from(addr.port()))?;
    obj.set("family", if addr.is_ipv4() { "IPv4" } else { "IPv6" })?;
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use crate::ScriptRuntime;

    fn eval_string(runtime: &ScriptRuntime, source: &str) -> String {
        runtime.context.with(|ctx| ctx.eval(source)).unwrap()
    }

    #[test]
    fn bound_socket_reports_its_name() {
        let runtime = ScriptRuntime::new().unwrap();
        let name = eval_string(
            &runtime,
            r#"
            var t = uv.new_tcp();
            uv.tcp_bind(t, "127.0.0.1", 0);
            var n = uv.tcp_getsockname(t);
            t.kind + " " + n.address + " " + n.family + " " + (n.port > 0);
            "#,
        );
        assert_eq!(name, "tcp 127.0.0.1 IPv4 true");
    }

    #[test]
    fn accept_without_a_pending_connection_would_block() {
        let runtime = ScriptRuntime::new().unwrap();
        let message = eval_string(
            &runtime,
            r#"
            var msg = "";
            var s = uv.new_tcp();
            uv.tcp_bind(s, "127.0.0.1", 0);
            uv.listen(s, 4, function () {});
            try { uv.accept(s); } catch (e) { msg = e.message; }
            uv.close(s);
            msg;
            "#,
        );
        assert!(message.starts_with("EAGAIN"), "{message}");
    }

    #[test]
    fn bad_addresses_throw() {
        let runtime = ScriptRuntime::new().unwrap();
        let message = eval_string(
            &runtime,
            r#"
            var out = [];
            var t = uv.new_tcp();
            try { uv.tcp_bind(t, "not an ip", 80); } catch (e) { out.push(e.message); }
            try { uv.tcp_bind(t, "127.0.0.1", 70000); } catch (e) { out.push(e.message); }
            out.join("|");
            "#,
        );
        assert_eq!(message, "EINVAL: invalid address \"not an ip\"|invalid port 70000");
    }

    #[test]
    fn refused_connect_reports_through_the_callback() {
        let port = {
            let spare = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            spare.local_addr().unwrap().port()
        };
        let runtime = ScriptRuntime::new().unwrap();
        runtime
            .execute(&format!(
                r#"
                var outcome = "";
                var c = uv.new_tcp();
                uv.tcp_connect(c, "127.0.0.1", {port}, function (err) {{
                    outcome = err;
                    uv.close(c);
                }});
                uv.run();
                "#
            ))
            .unwrap();
        let outcome = eval_string(&runtime, "outcome");
        assert!(outcome.starts_with("ECONNREFUSED"), "{outcome}");
    }

    #[test]
    fn peer_names_match_across_a_connection() {
        let runtime = ScriptRuntime::new().unwrap();
        runtime
            .execute(
                r#"
                var same = false;
                var done = 0;
                var peer, theirs;
                function check() {
                    if (++done < 2) return;
                    var ours = uv.tcp_getsockname(c);
                    same = theirs.port === ours.port && theirs.address === ours.address;
                    uv.close(peer);
                    uv.close(c);
                }
                var s = uv.new_tcp();
                uv.tcp_bind(s, "127.0.0.1", 0);
                uv.listen(s, 4, function (err) {
                    peer = uv.accept(s);
                    theirs = uv.tcp_getpeername(peer);
                    uv.close(s);
                    check();
                });
                var c = uv.new_tcp();
                uv.tcp_connect(c, "127.0.0.1", uv.tcp_getsockname(s).port, function (err) {
                    if (err) throw new Error(err);
                    check();
                });
                uv.run();
                "#,
            )
            .unwrap();
        let same: bool = runtime.context.with(|ctx| ctx.eval("same")).unwrap();
        assert!(same);
    }
}

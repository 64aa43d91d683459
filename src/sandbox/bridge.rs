//! The host filesystem bridge as seen from inside the engine.
//!
//! Every evaluation context gets the reserved `sandbox:fs` module. When the
//! runtime was configured with filesystem access, its `raw` export is an
//! object of callback-style native functions; otherwise `raw` is `null` and
//! the `fs` shims refuse every call. The module has no other exports, so
//! nothing inside the sandbox can set or replace `raw`.

use std::io;
use std::sync::Arc;

use rquickjs::{Ctx, Exception, FromJs, Function, IntoJs, Module, Object, TypedArray, Value};

use crate::sandbox::fs::{error_code, FileStat, FsBridge};
use crate::sandbox::limits::InterruptState;
use crate::sandbox::shims::{BRIDGE_GLOBAL, BRIDGE_SOURCE, BRIDGE_SPECIFIER};

/// Host-side state shared by the native bridge functions.
struct BridgeOps {
    fs: Arc<dyn FsBridge>,
    interrupt: Arc<InterruptState>,
}

impl BridgeOps {
    /// Run one primitive, refusing to start once the call's budget is spent.
    fn run<T>(
        &self,
        syscall: &str,
        path: &str,
        op: impl FnOnce(&dyn FsBridge) -> io::Result<T>,
    ) -> io::Result<T> {
        if self.interrupt.should_interrupt() {
            return Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "evaluation deadline exceeded",
            ));
        }
        tracing::trace!(syscall, path, "fs bridge call");
        op(self.fs.as_ref())
    }
}

fn fault_object<'js>(
    ctx: &Ctx<'js>,
    err: &io::Error,
    syscall: &str,
    path: &str,
) -> rquickjs::Result<Object<'js>> {
    let code = error_code(err);
    let fault = Object::new(ctx.clone())?;
    fault.set("message", format!("{code}: {err}, {syscall} '{path}'"))?;
    fault.set("code", code)?;
    fault.set("syscall", syscall)?;
    fault.set("path", path)?;
    Ok(fault)
}

/// Invoke a bridge callback as `cb(fault)` or `cb(null, value)`.
fn settle<'js, T: IntoJs<'js>>(
    ctx: &Ctx<'js>,
    callback: &Function<'js>,
    syscall: &str,
    path: &str,
    outcome: io::Result<T>,
) -> rquickjs::Result<()> {
    match outcome {
        Ok(value) => callback.call((Value::new_null(ctx.clone()), value)),
        Err(err) => {
            tracing::debug!(syscall, path, error = %err, "fs bridge call failed");
            callback.call((fault_object(ctx, &err, syscall, path)?,))
        }
    }
}

/// Bytes to write: a string as UTF-8, a `Uint8Array` as-is.
fn data_bytes<'js>(ctx: &Ctx<'js>, data: &Value<'js>) -> rquickjs::Result<Vec<u8>> {
    if let Some(text) = data.as_string() {
        return Ok(text.to_string()?.into_bytes());
    }
    if let Ok(array) = TypedArray::<u8>::from_js(ctx, data.clone()) {
        if let Some(bytes) = array.as_bytes() {
            return Ok(bytes.to_vec());
        }
    }
    Err(Exception::throw_type(ctx, "file data must be a string or Uint8Array"))
}

/// File contents as a `Uint8Array`, or as text decoded lossily from UTF-8.
fn contents<'js>(ctx: &Ctx<'js>, bytes: Vec<u8>, binary: bool) -> rquickjs::Result<Value<'js>> {
    if binary {
        TypedArray::<u8>::new(ctx.clone(), bytes)?.into_js(ctx)
    } else {
        String::from_utf8_lossy(&bytes).into_js(ctx)
    }
}

fn stat_object<'js>(ctx: &Ctx<'js>, stat: &FileStat) -> rquickjs::Result<Object<'js>> {
    let obj = Object::new(ctx.clone())?;
    obj.set("size", stat.size as f64)?;
    obj.set("file", stat.is_file)?;
    obj.set("directory", stat.is_dir)?;
    obj.set("mtimeMs", stat.modified_ms)?;
    Ok(obj)
}

fn bridge_object<'js>(ctx: &Ctx<'js>, ops: Arc<BridgeOps>) -> rquickjs::Result<Object<'js>> {
    let raw = Object::new(ctx.clone())?;

    let o = Arc::clone(&ops);
    raw.set(
        "readFile",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, path: String, binary: bool, cb: Function<'js>| -> rquickjs::Result<()> {
                let outcome = match o.run("open", &path, |fs| fs.read_file(&path)) {
                    Ok(bytes) => Ok(contents(&ctx, bytes, binary)?),
                    Err(err) => Err(err),
                };
                settle(&ctx, &cb, "open", &path, outcome)
            },
        )?,
    )?;

    let o = Arc::clone(&ops);
    raw.set(
        "writeFile",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, path: String, data: Value<'js>, cb: Function<'js>| -> rquickjs::Result<()> {
                let data = data_bytes(&ctx, &data)?;
                let outcome = o.run("open", &path, |fs| fs.write_file(&path, &data));
                settle(&ctx, &cb, "open", &path, outcome)
            },
        )?,
    )?;

    let o = Arc::clone(&ops);
    raw.set(
        "appendFile",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, path: String, data: Value<'js>, cb: Function<'js>| -> rquickjs::Result<()> {
                let data = data_bytes(&ctx, &data)?;
                let outcome = o.run("open", &path, |fs| fs.append_file(&path, &data));
                settle(&ctx, &cb, "open", &path, outcome)
            },
        )?,
    )?;

    let o = Arc::clone(&ops);
    raw.set(
        "mkdir",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, path: String, recursive: bool, cb: Function<'js>| -> rquickjs::Result<()> {
                let outcome = o.run("mkdir", &path, |fs| fs.create_dir(&path, recursive));
                settle(&ctx, &cb, "mkdir", &path, outcome)
            },
        )?,
    )?;

    let o = Arc::clone(&ops);
    raw.set(
        "readdir",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, path: String, cb: Function<'js>| -> rquickjs::Result<()> {
                let outcome = o.run("scandir", &path, |fs| fs.read_dir(&path));
                settle(&ctx, &cb, "scandir", &path, outcome)
            },
        )?,
    )?;

    let o = Arc::clone(&ops);
    raw.set(
        "stat",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, path: String, cb: Function<'js>| -> rquickjs::Result<()> {
                let outcome = match o.run("stat", &path, |fs| fs.metadata(&path)) {
                    Ok(stat) => Ok(stat_object(&ctx, &stat)?),
                    Err(err) => Err(err),
                };
                settle(&ctx, &cb, "stat", &path, outcome)
            },
        )?,
    )?;

    let o = Arc::clone(&ops);
    raw.set(
        "access",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, path: String, cb: Function<'js>| -> rquickjs::Result<()> {
                let outcome = o.run("access", &path, |fs| fs.metadata(&path).map(|_| ()));
                settle(&ctx, &cb, "access", &path, outcome)
            },
        )?,
    )?;

    let o = Arc::clone(&ops);
    raw.set(
        "exists",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, path: String, cb: Function<'js>| -> rquickjs::Result<()> {
                let outcome = o.run("access", &path, |fs| Ok(fs.exists(&path)));
                settle(&ctx, &cb, "access", &path, outcome)
            },
        )?,
    )?;

    let o = Arc::clone(&ops);
    raw.set(
        "unlink",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, path: String, cb: Function<'js>| -> rquickjs::Result<()> {
                let outcome = o.run("unlink", &path, |fs| fs.remove_file(&path));
                settle(&ctx, &cb, "unlink", &path, outcome)
            },
        )?,
    )?;

    let o = Arc::clone(&ops);
    raw.set(
        "rmdir",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, path: String, recursive: bool, cb: Function<'js>| -> rquickjs::Result<()> {
                let outcome = o.run("rmdir", &path, |fs| fs.remove_dir(&path, recursive));
                settle(&ctx, &cb, "rmdir", &path, outcome)
            },
        )?,
    )?;

    let o = Arc::clone(&ops);
    raw.set(
        "rename",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, from: String, to: String, cb: Function<'js>| -> rquickjs::Result<()> {
                let outcome = o.run("rename", &from, |fs| fs.rename(&from, &to));
                settle(&ctx, &cb, "rename", &from, outcome)
            },
        )?,
    )?;

    let o = ops;
    raw.set(
        "copyFile",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, from: String, to: String, cb: Function<'js>| -> rquickjs::Result<()> {
                let outcome = o.run("copyfile", &from, |fs| fs.copy_file(&from, &to));
                settle(&ctx, &cb, "copyfile", &from, outcome)
            },
        )?,
    )?;

    Ok(raw)
}

/// Declare and evaluate the `sandbox:fs` module on a fresh context, before
/// any sandboxed code runs, binding `raw` to `fs` when present.
pub fn declare_bridge_module<'js>(
    ctx: &Ctx<'js>,
    fs: Option<&Arc<dyn FsBridge>>,
    interrupt: &Arc<InterruptState>,
) -> rquickjs::Result<()> {
    let globals = ctx.globals();
    if let Some(fs) = fs {
        let ops = Arc::new(BridgeOps {
            fs: Arc::clone(fs),
            interrupt: Arc::clone(interrupt),
        });
        globals.set(BRIDGE_GLOBAL, bridge_object(ctx, ops)?)?;
    }

    let evaluated = Module::declare(ctx.clone(), BRIDGE_SPECIFIER, BRIDGE_SOURCE)
        .and_then(|declared| declared.eval())
        .and_then(|(_, done)| done.finish::<()>());
    // The export holds its own reference; the global must not outlive set-up.
    globals.remove(BRIDGE_GLOBAL)?;
    evaluated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::fs::MemoryFs;

    fn with_bridge<F>(fs: Option<Arc<dyn FsBridge>>, f: F)
    where
        F: for<'js> FnOnce(Ctx<'js>, Module<'js, rquickjs::module::Evaluated>) + Send,
    {
        let runtime = rquickjs::Runtime::new().unwrap();
        let context = rquickjs::Context::full(&runtime).unwrap();
        let interrupt = Arc::new(InterruptState::new());
        context.with(|ctx| {
            declare_bridge_module(&ctx, fs.as_ref(), &interrupt).unwrap();
            let (module, done) = Module::declare(
                ctx.clone(),
                "consumer",
                r#"
                import { raw } from 'sandbox:fs'
                export const enabled = raw !== null
                export const read = (path) => {
                    let out
                    raw.readFile(path, false, (fault, value) => { out = fault ? fault.code : value })
                    return out
                }
                export const writeBytes = (path, bytes) => {
                    let out
                    raw.writeFile(path, new Uint8Array(bytes), (fault) => { out = fault ? fault.code : 'ok' })
                    return out
                }
                export const writeValue = (path, value) => {
                    let out
                    try {
                        raw.writeFile(path, value, (fault) => { out = fault ? fault.code : 'ok' })
                    } catch (e) {
                        out = e.name
                    }
                    return out
                }
                export const readBytes = (path) => {
                    let out
                    raw.readFile(path, true, (fault, value) => {
                        out = fault ? fault.code : (value instanceof Uint8Array ? Array.from(value) : null)
                    })
                    return out
                }
                "#,
            )
            .unwrap()
            .eval()
            .unwrap();
            done.finish::<()>().unwrap();
            f(ctx, module);
        });
    }

    #[test]
    fn test_bridge_absent_without_capability() {
        with_bridge(None, |_ctx, module| {
            let enabled: bool = module.get("enabled").unwrap();
            assert!(!enabled);
        });
    }

    #[test]
    fn test_bridge_global_is_gone_after_setup() {
        let fs: Arc<dyn FsBridge> = Arc::new(MemoryFs::new());
        with_bridge(Some(fs), |ctx, module| {
            let enabled: bool = module.get("enabled").unwrap();
            assert!(enabled);
            assert!(!ctx.globals().contains_key(BRIDGE_GLOBAL).unwrap());
        });
    }

    #[test]
    fn test_bridge_module_exports_only_raw() {
        with_bridge(None, |ctx, _module| {
            let err = Module::declare(
                ctx.clone(),
                "importer",
                "import { install } from 'sandbox:fs'\nexport default install",
            )
            .and_then(|declared| declared.eval())
            .and_then(|(_, done)| done.finish::<()>())
            .unwrap_err();
            assert!(matches!(err, rquickjs::Error::Exception));
            ctx.catch();
        });
    }

    #[test]
    fn test_bridge_settles_callbacks() {
        let fs: Arc<dyn FsBridge> = Arc::new(MemoryFs::new().with_file("/a.txt", "alpha").unwrap());
        with_bridge(Some(fs), |_ctx, module| {
            let read: Function = module.get("read").unwrap();
            let ok: String = read.call(("/a.txt",)).unwrap();
            assert_eq!(ok, "alpha");
            let missing: String = read.call(("/missing.txt",)).unwrap();
            assert_eq!(missing, "ENOENT");
        });
    }

    #[test]
    fn test_bridge_passes_bytes_through() {
        let memory = Arc::new(MemoryFs::new());
        let fs: Arc<dyn FsBridge> = memory.clone();
        with_bridge(Some(fs), |_ctx, module| {
            let write: Function = module.get("writeBytes").unwrap();
            let status: String = write.call(("/b.bin", vec![200i32, 255, 0])).unwrap();
            assert_eq!(status, "ok");

            let read: Function = module.get("readBytes").unwrap();
            let back: Vec<i32> = read.call(("/b.bin",)).unwrap();
            assert_eq!(back, vec![200, 255, 0]);
        });
        assert_eq!(memory.read_file("/b.bin").unwrap(), vec![200u8, 255, 0]);
    }

    #[test]
    fn test_bridge_rejects_other_data() {
        let fs: Arc<dyn FsBridge> = Arc::new(MemoryFs::new());
        with_bridge(Some(fs), |_ctx, module| {
            let write: Function = module.get("writeValue").unwrap();
            let outcome: String = write.call(("/n", 42)).unwrap();
            assert_eq!(outcome, "TypeError");
        });
    }
}

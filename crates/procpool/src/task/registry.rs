//! The task-function registry.
//!
//! Rust has no runtime equivalent of `pickle`-ing an arbitrary closure across
//! a process boundary, so a worker process cannot simply be handed a task's
//! captured environment. Instead, every function a pool may dispatch must be
//! registered at link time under a stable name via [`register_task!`]; the
//! `Payload` that crosses the IPC channel carries that name plus the
//! serialized argument, and the freshly exec'd worker process looks the name
//! up in this registry before invoking it.

use std::collections::HashMap;
use std::sync::OnceLock;

use procpool_core::{Error, Outcome};

/// A function registered to run inside a worker process.
///
/// `args` is the caller's argument, already serialized with `serde_json`. The
/// function is responsible for deserializing it, running, and serializing its
/// own return value; any error is folded into `Outcome::UserError` by the
/// blanket `Display` formatting rather than propagated as a typed error,
/// since the coordinator (and other workers) cannot know the concrete error
/// type defined in the embedder's crate.
pub type TaskFn = fn(&[u8]) -> Result<Vec<u8>, String>;

#[doc(hidden)]
pub struct TaskDescriptor {
    pub name: &'static str,
    pub func: TaskFn,
}

inventory::collect!(TaskDescriptor);

/// Registers a function under `name` so that it can be dispatched to a
/// worker process by that name.
///
/// `func` must have the signature `fn(&[u8]) -> Result<Vec<u8>, String>`; use
/// [`wrap`] to adapt an ordinary `fn(A) -> Result<R, E>` into that shape.
///
/// # Example
///
/// ```ignore
/// fn double(n: u64) -> Result<u64, std::convert::Infallible> {
///     Ok(n * 2)
/// }
///
/// procpool::register_task!("double", procpool::wrap!(double));
/// ```
#[macro_export]
macro_rules! register_task {
    ($name:expr, $func:expr) => {
        $crate::__private::inventory::submit! {
            $crate::task::registry::TaskDescriptor {
                name: $name,
                func: $func,
            }
        }
    };
}

/// Adapts a typed `fn(A) -> Result<R, E>` into the byte-oriented [`TaskFn`]
/// shape the registry stores, handling (de)serialization of the argument and
/// return value.
#[macro_export]
macro_rules! wrap {
    ($func:path) => {{
        fn adapter(
            args: &[u8],
        ) -> ::std::result::Result<::std::vec::Vec<u8>, ::std::string::String> {
            let arg = $crate::__private::serde_json::from_slice(args)
                .map_err(|e| format!("failed to deserialize argument: {e}"))?;
            let result = $func(arg).map_err(|e| e.to_string())?;
            $crate::__private::serde_json::to_vec(&result)
                .map_err(|e| format!("failed to serialize result: {e}"))
        }
        adapter as $crate::task::registry::TaskFn
    }};
}

fn registry() -> &'static HashMap<&'static str, TaskFn> {
    static REGISTRY: OnceLock<HashMap<&'static str, TaskFn>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        inventory::iter::<TaskDescriptor>()
            .map(|d| (d.name, d.func))
            .collect()
    })
}

/// Looks up `name` and invokes it with `args`, producing the `Outcome` that
/// travels back to the coordinator as a `Results` message.
///
/// Called only from inside a worker process.
pub(crate) fn invoke(name: &str, args: &[u8]) -> Result<Outcome, Error> {
    let func = registry()
        .get(name)
        .copied()
        .ok_or_else(|| Error::UnknownTask {
            name: name.to_string(),
        })?;

    Ok(match func(args) {
        Ok(value) => Outcome::UserValue(value),
        Err(message) => Outcome::UserError(message),
    })
}

/// Looks up `name` and invokes it for its side effects only, discarding any
/// returned bytes. Used for `WorkerConfig::initializer`/`deinitializer`,
/// which are run for setup/teardown rather than for a task result.
pub(crate) fn call(name: &str, args: &[u8]) -> Result<(), String> {
    let func = registry()
        .get(name)
        .copied()
        .ok_or_else(|| format!("no task registered under name {name:?}"))?;
    func(args).map(|_| ())
}

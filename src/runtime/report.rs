//! Failure descriptions for log lines.
//!
//! [`describe`] turns an [`anyhow::Error`] into one line of the form
//!
//! ```text
//! handler:88 botd::dispatch::handler::Handler::dispatch | echo:12 my_cb error: outer: inner
//! ```
//!
//! Frames come from the backtrace anyhow captured when the error was created.
//! anyhow only captures when `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE` ask for
//! it; the `botd` binary turns `RUST_LIB_BACKTRACE` on at startup unless one
//! of them is already set.  Without capture the line carries the cause chain
//! only.
//!
//! Panics caught through [`catch_panic`] always carry an origin: a panic hook
//! records the panic location and a forced backtrace on the panicking thread,
//! and [`describe_panic`] renders them.  Panics outside [`catch_panic`] go to
//! the previously installed hook untouched.
//!
//! Nothing in this module panics, so it is safe to call from inside a
//! failure-handling path.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

/// Frames from these crates are runtime plumbing, not caller code.
const SKIPPED_PREFIXES: &[&str] = &["std::", "core::", "alloc::", "anyhow::", "<", "__rust"];

/// Describe `err` as `frames... error: cause: cause`.
pub fn describe(err: &anyhow::Error) -> String {
    let frames = frames(err.backtrace());
    let chain = err
        .chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");
    compose(&frames, "error", &chain)
}

/// Where the last panic caught on this thread happened.
struct PanicOrigin {
    location: Option<(String, u32)>,
    backtrace: Backtrace,
}

thread_local! {
    /// Nesting depth of [`catch_panic`] on this thread.
    static CATCHING: Cell<usize> = const { Cell::new(0) };
    static LAST_PANIC: Cell<Option<PanicOrigin>> = const { Cell::new(None) };
}

/// Run `f`, catching a panic and remembering its origin for
/// [`describe_panic`].
pub fn catch_panic<F, R>(f: F) -> std::thread::Result<R>
where
    F: FnOnce() -> R,
{
    install_panic_hook();
    let _ = LAST_PANIC.try_with(|slot| slot.set(None));
    let _ = CATCHING.try_with(|depth| depth.set(depth.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    let _ = CATCHING.try_with(|depth| depth.set(depth.get().saturating_sub(1)));
    result
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CATCHING.try_with(Cell::get).unwrap_or(0) == 0 {
                previous(info);
                return;
            }
            let origin = PanicOrigin {
                location: info.location().map(|l| (l.file().to_string(), l.line())),
                backtrace: Backtrace::force_capture(),
            };
            let _ = LAST_PANIC.try_with(|slot| slot.set(Some(origin)));
        }));
    });
}

/// Describe a panic payload caught with [`catch_panic`] (or plain
/// `catch_unwind`, which yields no origin).
pub fn describe_panic(payload: &(dyn Any + Send)) -> String {
    let thread = std::thread::current();
    let name = thread.name().unwrap_or("<unnamed>");
    let origin = LAST_PANIC.try_with(Cell::take).ok().flatten();
    let frames = origin.map(|o| panic_frames(&o)).unwrap_or_default();
    compose(&frames, &format!("panic in thread '{name}'"), &panic_message(payload))
}

/// Frames from the panic site outwards.  Falls back to the bare location
/// when the backtrace has no matching frame.
fn panic_frames(origin: &PanicOrigin) -> Vec<String> {
    let mut frames = frames(&origin.backtrace);
    let Some((file, line)) = &origin.location else { return frames };
    let site = format!("{}:{line}", module_of(file));
    let prefix = format!("{site} ");
    match frames.iter().position(|f| f.starts_with(&prefix)) {
        Some(start) => frames.split_off(start),
        None => vec![site],
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

fn compose(frames: &[String], kind: &str, message: &str) -> String {
    if frames.is_empty() {
        format!("{kind}: {message}")
    } else {
        format!("{} {kind}: {message}", frames.join(" | "))
    }
}

/// Walk a captured backtrace and build `module:line function` per frame.
///
/// The std `Backtrace` only exposes its frames through `Display`, which
/// renders each frame as `N: function` followed by an optional
/// `at path:line:col` line.
fn frames(bt: &Backtrace) -> Vec<String> {
    if bt.status() != BacktraceStatus::Captured {
        return Vec::new();
    }

    let rendered = bt.to_string();
    let mut out = Vec::new();
    let mut function: Option<&str> = None;

    for line in rendered.lines().map(str::trim) {
        if let Some(location) = line.strip_prefix("at ") {
            let Some(func) = function.take() else { continue };
            if SKIPPED_PREFIXES.iter().any(|p| func.starts_with(p)) {
                continue;
            }
            if let Some((module, lineno)) = parse_location(location) {
                out.push(format!("{module}:{lineno} {func}"));
            }
        } else if let Some((index, func)) = line.split_once(": ") {
            if index.chars().all(|c| c.is_ascii_digit()) {
                function = Some(func);
            }
        }
    }

    out
}

/// `./src/dispatch/handler.rs:88:17` → `("handler", "88")`.
fn parse_location(location: &str) -> Option<(&str, &str)> {
    let mut parts = location.rsplitn(3, ':');
    let _col = parts.next()?;
    let lineno = parts.next()?;
    let path = parts.next()?;
    Some((module_of(path), lineno))
}

/// `src/dispatch/handler.rs` → `handler`.
fn module_of(path: &str) -> &str {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    file.strip_suffix(".rs").unwrap_or(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn describe_includes_cause_chain() {
        let err = std::fs::read_to_string("/definitely/not/here")
            .context("loading greeting")
            .unwrap_err();
        let line = describe(&err);
        assert!(line.contains("error: loading greeting: "), "got: {line}");
        assert!(!line.contains('\n'));
    }

    #[test]
    fn describe_plain_message() {
        let err = anyhow::anyhow!("boom");
        assert!(describe(&err).ends_with("error: boom"));
    }

    #[test]
    fn panic_payload_variants() {
        let s: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(s.as_ref()), "static str");

        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");

        let s: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(s.as_ref()), "<non-string panic payload>");
    }

    #[test]
    fn describe_panic_names_thread() {
        let payload: Box<dyn Any + Send> = Box::new("bad input");
        let line = std::thread::Builder::new()
            .name("reporter-test".into())
            .spawn(move || describe_panic(payload.as_ref()))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(line, "panic in thread 'reporter-test': bad input");
    }

    #[test]
    fn caught_panic_carries_its_origin() {
        let payload = catch_panic(|| -> u32 { panic!("bad index") }).unwrap_err();
        let line = describe_panic(payload.as_ref());
        assert!(line.contains("report:"), "got: {line}");
        assert!(line.ends_with("': bad index"), "got: {line}");

        let site = line.split_whitespace().next().unwrap_or_default();
        let lineno = site.strip_prefix("report:").unwrap_or_default();
        assert!(lineno.parse::<u32>().is_ok(), "got: {line}");

        // The origin is consumed by the first description.
        assert!(describe_panic(payload.as_ref()).starts_with("panic in thread"));
    }

    #[test]
    fn forced_backtrace_yields_module_line_frames() {
        let frames = frames(&Backtrace::force_capture());
        let here = frames.iter().find(|f| f.starts_with("report:"));
        let here = here.unwrap_or_else(|| panic!("no report frame in {frames:?}"));
        assert!(here.contains("forced_backtrace_yields_module_line_frames"), "got: {here}");
        assert!(frames.iter().all(|f| !f.contains(" std::")));
    }

    #[test]
    fn catch_panic_passes_values_through() {
        assert_eq!(catch_panic(|| 7).unwrap(), 7);
    }

    #[test]
    fn location_parsing() {
        assert_eq!(
            parse_location("./src/dispatch/handler.rs:88:17"),
            Some(("handler", "88"))
        );
        assert_eq!(parse_location("C:\\x\\y\\mod.rs:3:1"), Some(("mod", "3")));
        assert_eq!(parse_location("nonsense"), None);
    }

    #[test]
    fn compose_without_frames() {
        assert_eq!(compose(&[], "error", "x"), "error: x");
        assert_eq!(
            compose(&["a:1 f".into(), "b:2 g".into()], "error", "x"),
            "a:1 f | b:2 g error: x"
        );
    }
}

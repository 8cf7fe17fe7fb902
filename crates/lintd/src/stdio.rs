//! Thread-scoped redirection of the standard streams.
//!
//! Server commands read their input through [`stdin`] and write through
//! [`stdout`] and [`stderr`]. Outside a redirection scope these handles
//! forward to the process streams. Inside [`redirect`] they are bound to the
//! streams of the request being served, however deep the call stack goes.
//!
//! Bindings live in thread-local storage, so requests served on different
//! threads never observe each other's streams. The scope is torn down by a
//! drop guard: the previous binding is restored when the closure returns,
//! when it returns an error, and when it unwinds.
//!
//! Threads spawned inside a scope see the process streams.

use std::cell::RefCell;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;

use tracing::warn;

const STDIO_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::stdio");

/// Streams bound for the duration of one redirection scope.
///
/// Standard output and standard error share the same writer, mirroring a
/// socket that carries both.
pub struct Redirection {
    input: Vec<u8>,
    output: Box<dyn Write>,
}

impl Redirection {
    /// Binds input to `input` and both output streams to `output`.
    pub fn new(input: impl Into<Vec<u8>>, output: Box<dyn Write>) -> Self {
        Self {
            input: input.into(),
            output,
        }
    }
}

struct Binding {
    input: RefCell<Cursor<Vec<u8>>>,
    output: RefCell<Box<dyn Write>>,
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<Binding>>> = const { RefCell::new(None) };
}

/// Runs `body` with the standard streams of this thread bound to `redirection`.
///
/// The output writer is flushed and the previous binding restored before this
/// function returns or unwinds. Scopes nest.
pub fn redirect<T>(redirection: Redirection, body: impl FnOnce() -> T) -> T {
    let _scope = ScopeGuard::enter(redirection);
    body()
}

/// Returns `true` while the current thread is inside a redirection scope.
pub fn is_redirected() -> bool {
    CURRENT.with(|current| current.borrow().is_some())
}

/// Identity of the current binding, used to compare bindings across calls.
#[cfg(test)]
pub(crate) fn binding_id() -> Option<usize> {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .map(|binding| Rc::as_ptr(binding) as usize)
    })
}

struct ScopeGuard {
    binding: Rc<Binding>,
    previous: Option<Rc<Binding>>,
}

impl ScopeGuard {
    fn enter(redirection: Redirection) -> Self {
        let binding = Rc::new(Binding {
            input: RefCell::new(Cursor::new(redirection.input)),
            output: RefCell::new(redirection.output),
        });
        let previous = CURRENT.with(|current| current.replace(Some(Rc::clone(&binding))));
        Self { binding, previous }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        match self.binding.output.try_borrow_mut() {
            Ok(mut output) => {
                if let Err(error) = output.flush() {
                    warn!(target: STDIO_TARGET, %error, "failed to flush redirected output");
                }
            }
            Err(_) => warn!(target: STDIO_TARGET, "redirected output still borrowed at scope exit"),
        }
        let previous = self.previous.take();
        CURRENT.with(|current| {
            current.replace(previous);
        });
    }
}

fn current_binding() -> Option<Rc<Binding>> {
    CURRENT.with(|current| current.borrow().clone())
}

fn stream_busy() -> io::Error {
    io::Error::other("redirected stream is already in use on this thread")
}

fn write_bound(buf: &[u8], fallback: impl FnOnce(&[u8]) -> io::Result<usize>) -> io::Result<usize> {
    match current_binding() {
        Some(binding) => {
            let mut output = binding.output.try_borrow_mut().map_err(|_| stream_busy())?;
            output.write(buf)
        }
        None => fallback(buf),
    }
}

fn flush_bound(fallback: impl FnOnce() -> io::Result<()>) -> io::Result<()> {
    match current_binding() {
        Some(binding) => {
            let mut output = binding.output.try_borrow_mut().map_err(|_| stream_busy())?;
            output.flush()
        }
        None => fallback(),
    }
}

/// Handle to the current standard input. See [`stdin`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Stdin;

/// Handle to the current standard output. See [`stdout`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Stdout;

/// Handle to the current standard error. See [`stderr`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Stderr;

/// Current standard input: the request body inside a scope, the process
/// stdin outside.
pub fn stdin() -> Stdin {
    Stdin
}

/// Current standard output: the connection inside a scope, the process
/// stdout outside.
pub fn stdout() -> Stdout {
    Stdout
}

/// Current standard error: the connection inside a scope, the process
/// stderr outside.
pub fn stderr() -> Stderr {
    Stderr
}

impl Read for Stdin {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match current_binding() {
            Some(binding) => {
                let mut input = binding.input.try_borrow_mut().map_err(|_| stream_busy())?;
                input.read(buf)
            }
            None => io::stdin().read(buf),
        }
    }
}

impl Write for Stdout {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        write_bound(buf, |buf| io::stdout().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        flush_bound(|| io::stdout().flush())
    }
}

impl Write for Stderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        write_bound(buf, |buf| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        flush_bound(|| io::stderr().flush())
    }
}

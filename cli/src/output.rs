use indicatif::ProgressBar;
use std::io::{self, Write};
use std::sync::Mutex;
use tracing_subscriber::fmt::MakeWriter;

static ACTIVE_SPINNER: Mutex<Option<ProgressBar>> = Mutex::new(None);

/// Routes log lines around `pb` until `detach` is called.
pub fn attach(pb: &ProgressBar) {
    if let Ok(mut active) = ACTIVE_SPINNER.lock() {
        *active = Some(pb.clone());
    }
}

pub fn detach() {
    if let Ok(mut active) = ACTIVE_SPINNER.lock() {
        *active = None;
    }
}

fn active() -> Option<ProgressBar> {
    ACTIVE_SPINNER.lock().ok().and_then(|active| active.clone())
}

/// Stderr log writer that hides the running spinner while a line is printed.
#[derive(Clone, Copy, Default)]
pub struct LogWriter;

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let print = || io::stderr().lock().write_all(buf);
        match active() {
            Some(pb) => pb.suspend(print)?,
            None => print()?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        *self
    }
}

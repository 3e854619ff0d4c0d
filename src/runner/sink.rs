//! Output sinks for streamed subprocess output

use std::sync::Mutex;

/// Destination for subprocess output. Implementations must tolerate
/// interleaved writes from the stdout and stderr pump tasks.
pub trait OutputSink: Send + Sync + 'static {
    fn write(&self, chunk: &[u8]);
}

/// Line-buffered sink that forwards complete lines to the application log
/// with a `>` prefix.
pub struct LogSink {
    buf: Mutex<String>,
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            buf: Mutex::new(String::new()),
        }
    }
}

impl OutputSink for LogSink {
    fn write(&self, chunk: &[u8]) {
        let mut buf = match self.buf.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buf.push_str(&String::from_utf8_lossy(chunk));
        while let Some(pos) = buf.find('\n') {
            let line: String = buf.drain(..=pos).collect();
            log::info!("> {}", line.trim_end());
        }
    }
}

/// In-memory sink capturing raw output, used by tests.
pub struct BufferSink {
    buf: Mutex<Vec<u8>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self {
            buf: Mutex::new(Vec::new()),
        }
    }

    pub fn contents(&self) -> String {
        let buf = match self.buf.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl OutputSink for BufferSink {
    fn write(&self, chunk: &[u8]) {
        let mut buf = match self.buf.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buf.extend_from_slice(chunk);
    }
}

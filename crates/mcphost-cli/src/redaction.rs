use std::io::Write;

use tracing_subscriber::fmt::MakeWriter;

/// Log writer that masks API keys before they reach the terminal.
pub struct RedactingWriter<W> {
    inner: W,
}

/// Hands out a fresh stderr [`RedactingWriter`] per log event.
pub struct RedactingStderr;

impl<'a> MakeWriter<'a> for RedactingStderr {
    type Writer = RedactingWriter<std::io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new(std::io::stderr())
    }
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf);
        self.inner.write_all(redact_secrets(&line).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Replace Anthropic and OpenAI style keys with `[REDACTED]`.
pub fn redact_secrets(input: &str) -> String {
    static PATTERNS: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(
            r"(?x)
              sk-ant-[A-Za-z0-9_\-]{10,}   # Anthropic API keys
            | sk-proj-[A-Za-z0-9_\-]{20,}  # OpenAI project keys
            | sk-[A-Za-z0-9]{20,}          # legacy OpenAI keys
            ",
        )
        .expect("redaction regex should compile")
    });

    PATTERNS.replace_all(input, "[REDACTED]").into_owned()
}

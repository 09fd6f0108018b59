//! A [`MakeWriter`] that masks PII in each formatted log line.

use std::io::{self, Write};

use tracing_subscriber::fmt::MakeWriter;

use crate::detect;

/// Wraps another [`MakeWriter`]; every writer it hands out buffers one
/// formatted event and masks it before passing it on.
#[derive(Debug, Clone)]
pub struct MaskingMakeWriter<M> {
    inner: M,
}

impl<M> MaskingMakeWriter<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M> MakeWriter<'a> for MaskingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = MaskingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        MaskingWriter::new(self.inner.make_writer())
    }
}

/// Buffers everything written to it and emits the masked text on flush or
/// drop. Patterns can span `write` calls, so nothing is masked piecemeal.
#[derive(Debug)]
pub struct MaskingWriter<W: Write> {
    inner: W,
    buf: Vec<u8>,
}

impl<W: Write> MaskingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    fn emit(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let raw = std::mem::take(&mut self.buf);
        let masked = detect::mask(&String::from_utf8_lossy(&raw));
        self.inner.write_all(masked.as_bytes())
    }
}

impl<W: Write> Write for MaskingWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit()?;
        self.inner.flush()
    }
}

impl<W: Write> Drop for MaskingWriter<W> {
    fn drop(&mut self) {
        // Nowhere to report a failed log write.
        let _ = self.emit();
        let _ = self.inner.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Sink {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Sink {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn masks_across_split_writes() {
        let sink = Sink::default();
        {
            let mut writer = MaskingWriter::new(sink.clone());
            writer.write_all(b"contact jane.doe@exa").unwrap();
            writer.write_all(b"mple.com today\n").unwrap();
            assert_eq!(sink.contents(), "");
        }
        assert_eq!(sink.contents(), "contact [MASKED_EMAIL] today\n");
    }

    #[test]
    fn subscriber_output_is_masked() {
        let sink = Sink::default();
        let make = {
            let sink = sink.clone();
            move || sink.clone()
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(MaskingMakeWriter::new(make))
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(contact = "jane@example.com", "callback requested at 555-123-4567");
        });

        let out = sink.contents();
        assert!(out.contains("[MASKED_EMAIL]"), "{out}");
        assert!(out.contains("[MASKED_PHONE]"), "{out}");
        assert!(!out.contains("jane@example.com"));
        assert!(!out.contains("555-123-4567"));
        let line: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(line["level"], "INFO");
    }
}

//! Rolling buffer of the most recent downloader stderr output.

/// Keeps at most `cap` bytes of the latest stderr lines.
#[derive(Debug)]
pub struct StderrTail {
    buf: String,
    cap: usize,
}

impl StderrTail {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: String::new(),
            cap: cap.max(1),
        }
    }

    pub fn push(&mut self, line: &str) {
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        if !self.buf.is_empty() {
            self.buf.push('\n');
        }
        self.buf.push_str(line);
        if self.buf.len() > self.cap {
            let mut cut = self.buf.len() - self.cap;
            while !self.buf.is_char_boundary(cut) {
                cut += 1;
            }
            self.buf.drain(..cut);
        }
    }

    pub fn as_str(&self) -> &str {
        self.buf.trim()
    }
}

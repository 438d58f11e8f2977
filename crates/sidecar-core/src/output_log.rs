//! Bounded capture of a child process's output

use crate::types::OutputStream;

/// Maximum combined lines held before the log is reset
pub const MAX_APP_MONITOR_ENTRIES: usize = 300;

/// Stdout/stderr buffers with a shared line budget.
///
/// When a line would exceed the budget both buffers are cleared and counting
/// restarts with that line. This is a reset, not a sliding window.
#[derive(Debug, Clone)]
pub struct OutputLog {
    stdout: Vec<String>,
    stderr: Vec<String>,
    count: usize,
    max_entries: usize,
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::new(MAX_APP_MONITOR_ENTRIES)
    }
}

impl OutputLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            count: 0,
            max_entries: max_entries.max(1),
        }
    }

    /// Append a line to the given stream's buffer
    pub fn push(&mut self, stream: OutputStream, line: impl Into<String>) {
        if self.count >= self.max_entries {
            self.clear();
        }
        self.count += 1;
        match stream {
            OutputStream::Stdout => self.stdout.push(line.into()),
            OutputStream::Stderr => self.stderr.push(line.into()),
        }
    }

    pub fn clear(&mut self) {
        self.stdout.clear();
        self.stderr.clear();
        self.count = 0;
    }

    /// Combined lines currently held
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn stdout(&self) -> &[String] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[String] {
        &self.stderr
    }

    /// Combined text republished to observers: stdout first, then stderr
    pub fn monitor(&self) -> String {
        let mut text = String::new();
        for line in self.stdout.iter().chain(self.stderr.iter()) {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_splits_streams() {
        let mut log = OutputLog::default();
        log.push(OutputStream::Stdout, "out");
        log.push(OutputStream::Stderr, "err");
        assert_eq!(log.stdout(), ["out".to_string()]);
        assert_eq!(log.stderr(), ["err".to_string()]);
        assert_eq!(log.len(), 2);
        assert_eq!(log.monitor(), "out\nerr\n");
    }

    #[test]
    fn test_overflow_resets_both_buffers() {
        let mut log = OutputLog::default();
        for i in 0..MAX_APP_MONITOR_ENTRIES {
            let stream = if i % 2 == 0 {
                OutputStream::Stdout
            } else {
                OutputStream::Stderr
            };
            log.push(stream, format!("line {}", i));
        }
        assert_eq!(log.len(), MAX_APP_MONITOR_ENTRIES);

        log.push(OutputStream::Stderr, "line 300");
        assert_eq!(log.len(), 1);
        assert!(log.stdout().is_empty());
        assert_eq!(log.stderr(), ["line 300".to_string()]);
    }

    #[test]
    fn test_clear() {
        let mut log = OutputLog::new(5);
        log.push(OutputStream::Stdout, "a");
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.monitor(), "");
    }
}

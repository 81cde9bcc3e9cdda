// Captured standard streams for the traced program

/// Appended once when a stream reaches its size limit
pub const TRUNCATION_MARKER: &str = "\n[output truncated]\n";

/// In-memory stdin/stdout/stderr for one program run
#[derive(Debug, Clone)]
pub struct Terminal {
    stdin: String,
    stdin_offset: usize,
    stdout: String,
    stderr: String,
    max_output_bytes: usize,
    stdout_truncated: bool,
    stderr_truncated: bool,
}

impl Terminal {
    pub fn new(stdin: impl Into<String>, max_output_bytes: usize) -> Self {
        Terminal {
            stdin: stdin.into(),
            stdin_offset: 0,
            stdout: String::new(),
            stderr: String::new(),
            max_output_bytes,
            stdout_truncated: false,
            stderr_truncated: false,
        }
    }

    pub fn write_stdout(&mut self, text: &str) {
        append_bounded(
            &mut self.stdout,
            &mut self.stdout_truncated,
            text,
            self.max_output_bytes,
        );
    }

    pub fn write_stderr(&mut self, text: &str) {
        append_bounded(
            &mut self.stderr,
            &mut self.stderr_truncated,
            text,
            self.max_output_bytes,
        );
    }

    /// Next line of input without its line terminator; `None` at end of input
    pub fn read_line(&mut self) -> Option<String> {
        let rest = &self.stdin[self.stdin_offset..];
        if rest.is_empty() {
            return None;
        }
        let (line, consumed) = match rest.find('\n') {
            Some(end) => (&rest[..end], end + 1),
            None => (rest, rest.len()),
        };
        let line = line.strip_suffix('\r').unwrap_or(line).to_string();
        self.stdin_offset += consumed;
        Some(line)
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Consume the terminal, returning `(stdout, stderr)`
    pub fn into_output(self) -> (String, String) {
        (self.stdout, self.stderr)
    }
}

fn append_bounded(buffer: &mut String, truncated: &mut bool, text: &str, limit: usize) {
    if *truncated {
        return;
    }
    let room = limit.saturating_sub(buffer.len());
    if text.len() <= room {
        buffer.push_str(text);
        return;
    }
    let mut cut = room;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    buffer.push_str(&text[..cut]);
    buffer.push_str(TRUNCATION_MARKER);
    *truncated = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_lines() {
        let mut terminal = Terminal::new("a\r\nb\nc", 100);
        assert_eq!(terminal.read_line().as_deref(), Some("a"));
        assert_eq!(terminal.read_line().as_deref(), Some("b"));
        assert_eq!(terminal.read_line().as_deref(), Some("c"));
        assert_eq!(terminal.read_line(), None);
    }

    #[test]
    fn test_output_limit() {
        let mut terminal = Terminal::new("", 4);
        terminal.write_stdout("abc");
        terminal.write_stdout("défg");
        terminal.write_stdout("more");
        assert_eq!(terminal.stdout(), format!("abcd{}", TRUNCATION_MARKER));
        assert!(terminal.stderr().is_empty());
    }
}

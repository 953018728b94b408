/// Cap on the in-progress line buffer; anything past this is dropped.
const MAX_LINE_LENGTH: usize = 4096;

/// ANSI escape sequence parsing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscapeState {
    /// Normal input mode
    Normal,
    /// Received ESC byte, waiting for '[' or other
    GotEsc,
    /// Received ESC+[, waiting for final byte (CSI sequence)
    GotCsi,
}

/// Minimal line discipline for SSH clients in pty mode: the server owns
/// echo, backspace and line assembly. Arrow keys and other CSI sequences
/// are swallowed rather than edited — scripted clients never send them and
/// interactive attackers get a plausibly dumb remote terminal.
pub struct TerminalState {
    line_buffer: Vec<u8>,
    esc_state: EscapeState,
}

impl Default for TerminalState {
    fn default() -> Self {
        Self {
            line_buffer: Vec::new(),
            esc_state: EscapeState::Normal,
        }
    }
}

impl TerminalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_is_empty(&self) -> bool {
        self.line_buffer.is_empty()
    }

    /// Process a byte of input, returns (echo_bytes, completed_line)
    pub fn process_byte(&mut self, byte: u8) -> (Vec<u8>, Option<String>) {
        if self.esc_state == EscapeState::GotEsc {
            self.esc_state = EscapeState::Normal;
            if byte == b'[' {
                self.esc_state = EscapeState::GotCsi;
            }
            return (Vec::new(), None);
        }
        if self.esc_state == EscapeState::GotCsi {
            self.esc_state = EscapeState::Normal;
            return (Vec::new(), None);
        }

        match byte {
            b'\r' => {
                let line = String::from_utf8_lossy(&self.line_buffer).to_string();
                self.line_buffer.clear();
                (b"\r\n".to_vec(), Some(line))
            }
            // Clients in pty mode send CR; a stray LF after it is noise.
            b'\n' => (Vec::new(), None),
            0x7f | 0x08 => {
                if self.line_buffer.pop().is_some() {
                    (b"\x08 \x08".to_vec(), None)
                } else {
                    (Vec::new(), None)
                }
            }
            // Ctrl-C: discard the current line, hand back an empty one so
            // the session loop redraws the prompt.
            0x03 => {
                self.line_buffer.clear();
                (b"^C\r\n".to_vec(), Some(String::new()))
            }
            0x1b => {
                self.esc_state = EscapeState::GotEsc;
                (Vec::new(), None)
            }
            _ => {
                if self.line_buffer.len() < MAX_LINE_LENGTH {
                    self.line_buffer.push(byte);
                    (vec![byte], None)
                } else {
                    (Vec::new(), None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(terminal: &mut TerminalState, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if let (_, Some(line)) = terminal.process_byte(b) {
                lines.push(line);
            }
        }
        lines
    }

    #[test]
    fn assembles_line_on_cr() {
        let mut terminal = TerminalState::new();
        let lines = feed(&mut terminal, b"ls -la\r");
        assert_eq!(lines, vec!["ls -la"]);
        assert!(terminal.buffer_is_empty());
    }

    #[test]
    fn echoes_printable_bytes() {
        let mut terminal = TerminalState::new();
        let (echo, line) = terminal.process_byte(b'x');
        assert_eq!(echo, vec![b'x']);
        assert!(line.is_none());
    }

    #[test]
    fn backspace_erases() {
        let mut terminal = TerminalState::new();
        let lines = feed(&mut terminal, b"lsx\x7f\r");
        assert_eq!(lines, vec!["ls"]);
    }

    #[test]
    fn backspace_on_empty_buffer_is_silent() {
        let mut terminal = TerminalState::new();
        let (echo, line) = terminal.process_byte(0x7f);
        assert!(echo.is_empty());
        assert!(line.is_none());
    }

    #[test]
    fn ctrl_c_discards_line() {
        let mut terminal = TerminalState::new();
        let lines = feed(&mut terminal, b"rm -rf /\x03ls\r");
        assert_eq!(lines, vec!["", "ls"]);
    }

    #[test]
    fn csi_sequences_are_swallowed() {
        let mut terminal = TerminalState::new();
        // Up arrow between two commands
        let lines = feed(&mut terminal, b"pw\x1b[Ad\r");
        assert_eq!(lines, vec!["pwd"]);
    }

    #[test]
    fn lf_is_ignored() {
        let mut terminal = TerminalState::new();
        let lines = feed(&mut terminal, b"ls\r\n");
        assert_eq!(lines, vec!["ls"]);
    }

    #[test]
    fn line_length_is_capped() {
        let mut terminal = TerminalState::new();
        for _ in 0..(MAX_LINE_LENGTH + 100) {
            terminal.process_byte(b'a');
        }
        let (_, line) = terminal.process_byte(b'\r');
        assert_eq!(line.unwrap().len(), MAX_LINE_LENGTH);
    }
}

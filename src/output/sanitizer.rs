//! Output sanitization for stripping ANSI escape codes.

use vte::{Params, Parser, Perform};

/// Output sanitizer using VTE parser.
pub struct OutputSanitizer;

impl OutputSanitizer {
    /// Strip ANSI escape codes, keeping every printable character.
    pub fn strip_ansi(input: &str) -> String {
        Self::run(input, false)
    }

    /// Strip ANSI escape codes and apply carriage returns and backspaces
    /// the way a terminal would, so progress bars collapse to their final
    /// state.
    pub fn clean(input: &str) -> String {
        Self::run(input, true)
    }

    fn run(input: &str, overwrite: bool) -> String {
        let mut extractor = PlainTextExtractor::new(overwrite);
        let mut parser = Parser::new();
        parser.advance(&mut extractor, input.as_bytes());
        extractor.into_string()
    }
}

/// VTE performer that extracts plain text.
struct PlainTextExtractor {
    done: String,
    line: Vec<char>,
    cursor: usize,
    overwrite: bool,
}

impl PlainTextExtractor {
    fn new(overwrite: bool) -> Self {
        Self {
            done: String::new(),
            line: Vec::new(),
            cursor: 0,
            overwrite,
        }
    }

    fn put_char(&mut self, c: char) {
        if self.cursor < self.line.len() {
            self.line[self.cursor] = c;
        } else {
            self.line.push(c);
        }
        self.cursor += 1;
    }

    fn end_line(&mut self) {
        self.done.extend(self.line.drain(..));
        self.done.push('\n');
        self.cursor = 0;
    }

    fn into_string(mut self) -> String {
        self.done.extend(self.line.drain(..));
        self.done
    }
}

impl Perform for PlainTextExtractor {
    fn print(&mut self, c: char) {
        self.put_char(c);
    }

    fn execute(&mut self, byte: u8) {
        match (byte, self.overwrite) {
            (b'\n', _) => self.end_line(),
            (b'\t', _) => self.put_char('\t'),
            (b'\r', true) => self.cursor = 0,
            (b'\r', false) => self.put_char('\r'),
            (0x08, true) => self.cursor = self.cursor.saturating_sub(1),
            // Bell and other controls carry no text.
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(
        &mut self,
        _params: &Params,
        _intermediates: &[u8],
        _ignore: bool,
        _action: char,
    ) {
        // Colors, cursor movement and erase sequences are dropped.
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        assert_eq!(OutputSanitizer::strip_ansi("hello world"), "hello world");
    }

    #[test]
    fn test_strip_color_codes() {
        assert_eq!(OutputSanitizer::strip_ansi("\x1b[31mred\x1b[0m"), "red");
    }

    #[test]
    fn test_complex_sequence() {
        let input = "\x1b[32m\x1b[1mGreen Bold\x1b[0m Normal \x1b[34mBlue\x1b[0m";
        assert_eq!(OutputSanitizer::strip_ansi(input), "Green Bold Normal Blue");
    }

    #[test]
    fn test_osc_title() {
        let input = "\x1b]0;Window Title\x07actual content";
        assert_eq!(OutputSanitizer::strip_ansi(input), "actual content");
    }

    #[test]
    fn test_preserve_newlines_and_tabs() {
        assert_eq!(
            OutputSanitizer::strip_ansi("a\tb\nc\n"),
            "a\tb\nc\n"
        );
    }

    #[test]
    fn test_strip_keeps_carriage_returns() {
        assert_eq!(OutputSanitizer::strip_ansi("a\r\nb"), "a\r\nb");
    }

    #[test]
    fn test_clean_collapses_progress() {
        let input = "Downloading  10%\rDownloading  55%\rDownloading 100%\ndone\n";
        assert_eq!(OutputSanitizer::clean(input), "Downloading 100%\ndone\n");
    }

    #[test]
    fn test_clean_crlf_and_backspace() {
        assert_eq!(OutputSanitizer::clean("line\r\nabc\x08\x08XY\n"), "line\naXY\n");
    }

    #[test]
    fn test_unicode_survives() {
        assert_eq!(OutputSanitizer::clean("\x1b[1mhéllo ✓\x1b[0m"), "héllo ✓");
    }

    #[test]
    fn test_only_escape_codes() {
        assert_eq!(OutputSanitizer::strip_ansi("\x1b[31m\x1b[0m\x1b[2J"), "");
    }
}

//! Top-level statement splitter.
//!
//! The scanner works line by line and only treats a newline as a statement
//! boundary when no heredoc body, compound block, quote or line
//! continuation is open.

/// Split a script into its top-level statements, preserving source order.
///
/// Blank lines and comment lines between statements are dropped. A
/// construct left open at the end of the script is returned as the final
/// statement so the shell can report the syntax error itself.
pub fn split_commands(script: &str) -> Vec<String> {
    let mut splitter = Splitter::default();
    for line in script.lines() {
        splitter.push_line(line);
    }
    splitter.finish()
}

/// An open heredoc waiting for its terminator line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Heredoc {
    terminator: String,
    /// `<<-` form: leading tabs are stripped before matching.
    strip_tabs: bool,
    /// Quoted delimiter: the body is literal and never expands.
    quoted: bool,
}

impl Heredoc {
    fn closes_on(&self, line: &str) -> bool {
        let candidate = if self.strip_tabs {
            line.trim_start_matches('\t')
        } else {
            line
        };
        candidate == self.terminator
    }
}

#[derive(Debug, Default)]
struct Splitter {
    statements: Vec<String>,
    current: Vec<String>,
    /// Open heredocs; the top of the stack is the one whose body is being read.
    heredocs: Vec<Heredoc>,
    quote: Option<char>,
    /// Compound keyword and brace group nesting.
    depth: usize,
    parens: usize,
    /// Open parentheses inside a `((` or `$((` arithmetic expression.
    arith: usize,
    case_depth: usize,
    continuation: bool,
    escaped_newline: bool,
}

impl Splitter {
    fn push_line(&mut self, line: &str) {
        if let Some(top) = self.heredocs.last().cloned() {
            self.current.push(line.to_string());
            if top.closes_on(line) {
                self.heredocs.pop();
            } else if !top.quoted && (line.contains("$(") || line.contains('`')) {
                let chars: Vec<char> = line.chars().collect();
                let nested = scan_nested_openers(&chars);
                self.heredocs.extend(nested.into_iter().rev());
            }
            self.flush_if_complete();
            return;
        }

        if self.is_idle() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                return;
            }
        }

        self.current.push(line.to_string());
        let openers = self.scan(line);
        // First declared heredoc is read first, so it goes on top.
        self.heredocs.extend(openers.into_iter().rev());
        self.flush_if_complete();
    }

    fn is_idle(&self) -> bool {
        self.current.is_empty() && self.quote.is_none()
    }

    fn is_complete(&self) -> bool {
        self.heredocs.is_empty()
            && self.quote.is_none()
            && self.depth == 0
            && self.parens == 0
            && self.arith == 0
            && !self.continuation
    }

    fn flush_if_complete(&mut self) {
        if self.is_complete() && !self.current.is_empty() {
            let statement = self.current.join("\n").trim().to_string();
            self.current.clear();
            if !statement.is_empty() {
                self.statements.push(statement);
            }
        }
    }

    fn finish(mut self) -> Vec<String> {
        if !self.current.is_empty() {
            let statement = self.current.join("\n").trim().to_string();
            if !statement.is_empty() {
                self.statements.push(statement);
            }
        }
        self.statements
    }

    /// Scan one line outside any heredoc body, updating quote and nesting
    /// state. Returns the heredocs opened on this line in declaration order.
    fn scan(&mut self, line: &str) -> Vec<Heredoc> {
        let chars: Vec<char> = line.chars().collect();
        let mut openers = Vec::new();
        let mut word = String::new();
        // A backslash-newline joins words; `a |` and `a &&` start a new command.
        let mut command_start = !self.escaped_newline;
        // Everything from here on is a comment.
        let mut code_end = chars.len();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if self.arith > 0 {
                // Arithmetic: `<<` is a shift and nothing else nests.
                match c {
                    '(' => self.arith += 1,
                    ')' => self.arith -= 1,
                    _ => {}
                }
                word.push(c);
                i += 1;
                continue;
            }

            if let Some(q) = self.quote {
                if q != '\'' && c == '\\' {
                    i += 2;
                    continue;
                }
                if c == q {
                    self.quote = None;
                }
                word.push(c);
                i += 1;
                continue;
            }

            match c {
                '\\' => {
                    word.push(c);
                    if let Some(&next) = chars.get(i + 1) {
                        word.push(next);
                    }
                    i += 2;
                    continue;
                }
                '\'' | '"' | '`' => {
                    self.quote = Some(c);
                    word.push(c);
                }
                '#' if word.is_empty() => {
                    code_end = i;
                    break;
                }
                '(' if chars.get(i + 1) == Some(&'(')
                    && (word.is_empty() || word.ends_with('$')) =>
                {
                    self.arith = 2;
                    word.push_str("((");
                    i += 2;
                    continue;
                }
                '<' if chars.get(i + 1) == Some(&'<') => {
                    self.end_word(&mut word, &mut command_start);
                    if chars.get(i + 2) == Some(&'<') {
                        // Here-string: single line, nothing to track.
                        i += 3;
                        continue;
                    }
                    let strip_tabs = chars.get(i + 2) == Some(&'-');
                    let start = if strip_tabs { i + 3 } else { i + 2 };
                    let (heredoc, next) = read_heredoc_word(&chars, start, strip_tabs);
                    openers.extend(heredoc);
                    i = next;
                    continue;
                }
                ';' | '&' | '|' => {
                    self.end_word(&mut word, &mut command_start);
                    command_start = true;
                }
                '(' => {
                    self.end_word(&mut word, &mut command_start);
                    if self.case_depth == 0 {
                        self.parens += 1;
                    }
                    command_start = true;
                }
                ')' => {
                    self.end_word(&mut word, &mut command_start);
                    if self.case_depth == 0 {
                        self.parens = self.parens.saturating_sub(1);
                    }
                    command_start = true;
                }
                c if c.is_whitespace() => self.end_word(&mut word, &mut command_start),
                _ => word.push(c),
            }
            i += 1;
        }
        self.end_word(&mut word, &mut command_start);

        let code: String = chars[..code_end].iter().collect();
        let open = self.quote.is_none() && self.arith == 0;
        self.escaped_newline = open && ends_with_escape(&code);
        self.continuation = self.escaped_newline || (open && ends_with_operator(&code));
        openers
    }

    fn end_word(&mut self, word: &mut String, command_start: &mut bool) {
        if word.is_empty() {
            return;
        }
        let at_command = *command_start;
        *command_start = false;

        match word.as_str() {
            "{" => {
                self.depth += 1;
                *command_start = true;
            }
            "}" => self.depth = self.depth.saturating_sub(1),
            "for" | "while" | "until" | "if" | "select" if at_command => self.depth += 1,
            "case" if at_command => {
                self.depth += 1;
                self.case_depth += 1;
            }
            "done" | "fi" if at_command => self.depth = self.depth.saturating_sub(1),
            "esac" if at_command => {
                self.depth = self.depth.saturating_sub(1);
                self.case_depth = self.case_depth.saturating_sub(1);
            }
            "do" | "then" | "else" | "elif" | "!" | "time" if at_command => {
                *command_start = true;
            }
            _ => {}
        }
        word.clear();
    }
}

/// Read the delimiter word following `<<` / `<<-`.
///
/// Returns the heredoc (if a delimiter was present) and the index just past it.
fn read_heredoc_word(chars: &[char], start: usize, strip_tabs: bool) -> (Option<Heredoc>, usize) {
    let mut i = start;
    while i < chars.len() && matches!(chars[i], ' ' | '\t') {
        i += 1;
    }

    let mut terminator = String::new();
    let mut quoted = false;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                quoted = true;
                i += 1;
                while i < chars.len() && chars[i] != c {
                    terminator.push(chars[i]);
                    i += 1;
                }
                i += 1;
            }
            '\\' => {
                quoted = true;
                if let Some(&next) = chars.get(i + 1) {
                    terminator.push(next);
                }
                i += 2;
            }
            c if c.is_whitespace() || matches!(c, ';' | '|' | '&' | '<' | '>' | '(' | ')') => {
                break
            }
            _ => {
                terminator.push(c);
                i += 1;
            }
        }
    }

    let heredoc = (!terminator.is_empty()).then_some(Heredoc {
        terminator,
        strip_tabs,
        quoted,
    });
    (heredoc, i.min(chars.len()))
}

/// Heredoc openers inside an expanding heredoc body, such as
/// `$(cat <<INNER`. Quotes are not tracked since the body is not parsed
/// as shell syntax until expansion.
fn scan_nested_openers(chars: &[char]) -> Vec<Heredoc> {
    let mut openers = Vec::new();
    let mut arith = 0usize;
    let mut i = 0;
    while i + 1 < chars.len() {
        if arith > 0 {
            match chars[i] {
                '(' => arith += 1,
                ')' => arith -= 1,
                _ => {}
            }
            i += 1;
        } else if chars[i] == '$' && chars[i + 1] == '(' && chars.get(i + 2) == Some(&'(') {
            arith = 2;
            i += 3;
        } else if chars[i] == '<' && chars[i + 1] == '<' {
            if chars.get(i + 2) == Some(&'<') {
                i += 3;
                continue;
            }
            let strip_tabs = chars.get(i + 2) == Some(&'-');
            let start = if strip_tabs { i + 3 } else { i + 2 };
            let (heredoc, next) = read_heredoc_word(chars, start, strip_tabs);
            openers.extend(heredoc);
            i = next;
        } else {
            i += 1;
        }
    }
    openers
}

fn ends_with_escape(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn ends_with_operator(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed.ends_with('|') || trimmed.ends_with("&&")
}

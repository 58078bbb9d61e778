//! Shortening long command output before it is shown to the agent.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
        .expect("valid regex")
});

/// How displayed output is shortened. Quiet-mode files always hold the
/// full output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shortening {
    /// Remove ISO-8601 timestamps from every line.
    pub strip_dates: bool,
    /// Strip the prefix shared by every line once the output has at least
    /// this many lines. `0` disables it.
    pub strip_common_prefix_lines: usize,
    /// Lines kept from the start of long output.
    pub head_lines: usize,
    /// Lines kept from the end of long output.
    pub tail_lines: usize,
}

impl Default for Shortening {
    fn default() -> Self {
        Self {
            strip_dates: false,
            strip_common_prefix_lines: 10,
            head_lines: 200,
            tail_lines: 800,
        }
    }
}

impl Shortening {
    /// Show output exactly as produced.
    pub fn none() -> Self {
        Self {
            strip_dates: false,
            strip_common_prefix_lines: 0,
            head_lines: 0,
            tail_lines: 0,
        }
    }

    pub fn apply(&self, text: &str) -> String {
        let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();

        if self.strip_dates {
            for line in &mut lines {
                if let std::borrow::Cow::Owned(stripped) = TIMESTAMP.replace_all(line, "") {
                    *line = stripped;
                }
            }
        }

        if self.strip_common_prefix_lines > 0 && lines.len() >= self.strip_common_prefix_lines {
            let len = common_prefix_len(&lines);
            let prefix_is_indent = lines[0][..len].chars().all(char::is_whitespace);
            if len > 0 && !prefix_is_indent && lines.iter().all(|line| line.len() > len) {
                for line in &mut lines {
                    line.drain(..len);
                }
            }
        }

        let budget = self.head_lines + self.tail_lines;
        if budget > 0 && lines.len() > budget {
            let omitted = lines.len() - budget;
            let tail = lines.split_off(lines.len() - self.tail_lines);
            lines.truncate(self.head_lines);
            lines.push(format!("... ({omitted} lines omitted) ..."));
            lines.extend(tail);
        }

        lines.join("\n")
    }
}

/// Byte length of the prefix shared by all lines, on a char boundary.
fn common_prefix_len(lines: &[String]) -> usize {
    let Some(first) = lines.first() else {
        return 0;
    };
    let mut len = first.len();
    for line in &lines[1..] {
        len = first[..len]
            .char_indices()
            .zip(line.chars())
            .find(|((_, a), b)| a != b)
            .map(|((i, _), _)| i)
            .unwrap_or_else(|| len.min(line.len()));
        if len == 0 {
            break;
        }
    }
    len
}

//! Read-only command classification.
//!
//! A command is read-only when it is a single pipeline whose every stage
//! is a known inspection command, with no redirection, command
//! substitution, or sequencing. Such commands can be run without asking.

/// Commands that only inspect files or the environment.
pub const READ_ONLY_COMMANDS: &[&str] = &[
    "ag", "cat", "cut", "du", "df", "file", "find", "grep", "head", "ls", "pwd", "rg", "sort",
    "stat", "tail", "tree", "uniq", "wc", "which",
];

/// `find` actions that write or run other programs.
const FIND_ACTIONS: &[&str] = &[
    "-delete", "-exec", "-execdir", "-ok", "-okdir", "-fprint", "-fprint0", "-fprintf", "-fls",
];

/// Whether `command` is a pipeline of read-only commands.
///
/// ```
/// use shell_tether::validation::is_read_only_command;
///
/// assert!(is_read_only_command("cat README.md | head -50"));
/// assert!(!is_read_only_command("cat file > copy.txt"));
/// ```
pub fn is_read_only_command(command: &str) -> bool {
    pipeline_stages(command).is_some_and(|stages| {
        !stages.is_empty() && stages.iter().all(|words| is_read_only_stage(words))
    })
}

fn is_read_only_stage(words: &[String]) -> bool {
    let Some(program) = words.first() else {
        return false;
    };
    let args = &words[1..];
    match program.as_str() {
        "find" => !args.iter().any(|a| FIND_ACTIONS.contains(&a.as_str())),
        "sort" => !args.iter().any(|a| a.starts_with("-o") || a.starts_with("--output")),
        other => READ_ONLY_COMMANDS.contains(&other),
    }
}

/// Split a pipeline into the words of each stage.
///
/// Returns `None` when the command contains anything other than plain
/// words and single `|` separators.
fn pipeline_stages(command: &str) -> Option<Vec<Vec<String>>> {
    let mut stages = Vec::new();
    let mut words = Vec::new();
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let mut chars = command.trim().chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some('\'') => {
                if c == '\'' {
                    quote = None;
                } else {
                    word.push(c);
                }
                continue;
            }
            Some(_) => {
                match c {
                    '"' => quote = None,
                    '`' => return None,
                    '$' if chars.peek() == Some(&'(') => return None,
                    '\\' => word.extend(chars.next()),
                    _ => word.push(c),
                }
                continue;
            }
            None => {}
        }

        match c {
            '\'' | '"' => quote = Some(c),
            '\\' => word.extend(chars.next()),
            '|' => {
                if chars.peek() == Some(&'|') || chars.peek() == Some(&'&') {
                    return None;
                }
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
                if words.is_empty() {
                    return None;
                }
                stages.push(std::mem::take(&mut words));
            }
            ';' | '&' | '>' | '<' | '`' | '\n' | '(' | ')' | '{' | '}' => return None,
            '$' if chars.peek() == Some(&'(') => return None,
            c if c.is_whitespace() => {
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
            }
            _ => word.push(c),
        }
    }

    if quote.is_some() {
        return None;
    }
    if !word.is_empty() {
        words.push(word);
    }
    if words.is_empty() {
        // Empty command or a trailing `|`.
        return if stages.is_empty() { Some(stages) } else { None };
    }
    stages.push(words);
    Some(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_read_only_commands() {
        assert!(is_read_only_command("cat README.md"));
        assert!(is_read_only_command("head -100 file.txt"));
        assert!(is_read_only_command("ls"));
        assert!(is_read_only_command("ls -la /tmp"));
        assert!(is_read_only_command("pwd"));
        assert!(is_read_only_command("rg pattern file.txt"));
        assert!(is_read_only_command("find . -name '*.py'"));
        assert!(is_read_only_command("tree -L 2"));
    }

    #[test]
    fn test_read_only_pipelines() {
        assert!(is_read_only_command("cat src/cli.rs | head -100"));
        assert!(is_read_only_command("grep pattern file | sort | head -10"));
        assert!(is_read_only_command("grep 'a|b' file"));
    }

    #[test]
    fn test_redirection_is_not_read_only() {
        assert!(!is_read_only_command("cat file > output.txt"));
        assert!(!is_read_only_command("ls >> listing.txt"));
        assert!(!is_read_only_command("cat < input.txt"));
        assert!(!is_read_only_command("sort -o sorted.txt file"));
        assert!(!is_read_only_command("sort --output=sorted.txt file"));
    }

    #[test]
    fn test_other_commands_are_not_read_only() {
        assert!(!is_read_only_command("rm -rf /tmp/foo"));
        assert!(!is_read_only_command("cat file | xargs rm"));
        assert!(!is_read_only_command("python3 script.py"));
        assert!(!is_read_only_command("find . -name '*.tmp' -delete"));
        assert!(!is_read_only_command("find . -exec rm {} ;"));
    }

    #[test]
    fn test_sequencing_and_substitution_are_not_read_only() {
        assert!(!is_read_only_command("ls && rm foo"));
        assert!(!is_read_only_command("ls || echo fail"));
        assert!(!is_read_only_command("ls; rm foo"));
        assert!(!is_read_only_command("ls &"));
        assert!(!is_read_only_command("cat $(which rm)"));
        assert!(!is_read_only_command("cat \"$(rm -rf x)\""));
        assert!(!is_read_only_command("cat `which ls`"));
        assert!(!is_read_only_command("ls\nrm foo"));
        assert!(!is_read_only_command("ls |"));
        assert!(!is_read_only_command("| ls"));
        assert!(!is_read_only_command(""));
        assert!(!is_read_only_command("cat 'unterminated"));
    }

    #[test]
    fn test_quoted_arguments_are_plain_words() {
        assert!(is_read_only_command("grep \"a; b > c\" notes.txt"));
        assert!(is_read_only_command("grep '$(not run)' notes.txt"));
        assert!(is_read_only_command("cat 'my file.txt'"));
    }
}

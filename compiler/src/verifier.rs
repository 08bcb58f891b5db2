use crate::error::{Artifact, ShimError};

/// Lightweight syntax check run on every rendered artifact before it is
/// handed back. Catches unbalanced delimiters and a missing preamble; it does
/// not type-check.
pub fn verify_artifact(artifact: Artifact, code: &str) -> Result<(), ShimError> {
    check_preamble(artifact, code)?;
    check_delimiters(artifact, code)
}

fn syntax_error(artifact: Artifact, line: usize, msg: String) -> ShimError {
    ShimError::SyntaxError { artifact, line, msg }
}

fn check_preamble(artifact: Artifact, code: &str) -> Result<(), ShimError> {
    let (expected, what) = match artifact {
        Artifact::NativeShim => ("#include", "an #include directive"),
        Artifact::HostWrapper => ("package ", "a package clause"),
    };
    let mut in_block = false;
    for (i, line) in code.lines().enumerate() {
        let line = line.trim();
        if in_block {
            if let Some(end) = line.find("*/") {
                in_block = false;
                if line[end + 2..].trim().is_empty() {
                    continue;
                }
                return check_first(artifact, line[end + 2..].trim(), expected, what, i + 1);
            }
            continue;
        }
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        if line.starts_with("/*") {
            if !line.contains("*/") {
                in_block = true;
            }
            continue;
        }
        return check_first(artifact, line, expected, what, i + 1);
    }
    Err(syntax_error(artifact, 1, format!("expected {} but the output is empty", what)))
}

fn check_first(artifact: Artifact, line: &str, expected: &str, what: &str, lineno: usize) -> Result<(), ShimError> {
    if line.starts_with(expected) {
        Ok(())
    } else {
        Err(syntax_error(artifact, lineno, format!("expected {} first, found {:?}", what, line)))
    }
}

#[derive(PartialEq)]
enum State {
    Code,
    LineComment,
    BlockComment,
    Quoted(char),
    Raw,
}

fn check_delimiters(artifact: Artifact, code: &str) -> Result<(), ShimError> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut state = State::Code;
    let mut line = 1;
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
        }
        match state {
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                }
            }
            State::Quoted(quote) => {
                if c == '\\' {
                    chars.next();
                } else if c == quote {
                    state = State::Code;
                } else if c == '\n' {
                    return Err(syntax_error(artifact, line - 1, "unterminated literal".to_string()));
                }
            }
            State::Raw => {
                if c == '`' {
                    state = State::Code;
                }
            }
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                }
                '"' | '\'' => state = State::Quoted(c),
                '`' if artifact == Artifact::HostWrapper => state = State::Raw,
                '(' | '[' | '{' => stack.push((c, line)),
                ')' | ']' | '}' => {
                    let open = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        Some((top, _)) if top == open => {}
                        Some((top, at)) => {
                            return Err(syntax_error(
                                artifact,
                                line,
                                format!("{:?} closes {:?} opened at line {}", c, top, at),
                            ))
                        }
                        None => return Err(syntax_error(artifact, line, format!("unmatched {:?}", c))),
                    }
                }
                _ => {}
            },
        }
    }

    match state {
        State::BlockComment => return Err(syntax_error(artifact, line, "unterminated block comment".to_string())),
        State::Quoted(_) | State::Raw => return Err(syntax_error(artifact, line, "unterminated literal".to_string())),
        _ => {}
    }
    if let Some((open, at)) = stack.pop() {
        return Err(syntax_error(artifact, at, format!("{:?} is never closed", open)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_balanced_c() {
        let code = "// banner\n\n#include <stdint.h>\n\nint f(int a) { return a[\"}\"]; } /* ) */\nchar c = '{';\n";
        assert!(verify_artifact(Artifact::NativeShim, code).is_ok());
    }

    #[test]
    fn accepts_go_raw_strings() {
        let code = "// banner\n\npackage bridge\n\nvar s = `{(`\n\nfunc f() {}\n";
        assert!(verify_artifact(Artifact::HostWrapper, code).is_ok());
    }

    #[test]
    fn reports_unclosed_brace_at_its_line() {
        let code = "package bridge\n\nfunc f() {\n\treturn\n";
        match verify_artifact(Artifact::HostWrapper, code) {
            Err(ShimError::SyntaxError { artifact, line, .. }) => {
                assert_eq!(artifact, Artifact::HostWrapper);
                assert_eq!(line, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn reports_mismatched_close() {
        let code = "#include <x.h>\nint f(void] {}\n";
        assert!(matches!(
            verify_artifact(Artifact::NativeShim, code),
            Err(ShimError::SyntaxError { line: 2, .. })
        ));
    }

    #[test]
    fn requires_preamble() {
        assert!(verify_artifact(Artifact::HostWrapper, "// x\nfunc f() {}\n").is_err());
        assert!(verify_artifact(Artifact::NativeShim, "int x;\n").is_err());
        assert!(verify_artifact(Artifact::NativeShim, "").is_err());
        assert!(verify_artifact(Artifact::NativeShim, "/* a\n b */\n#include <a.h>\n").is_ok());
    }
}

use regex::Regex;
use lazy_static::lazy_static;
use crate::utils::{quote, error};
use crate::error::ShimError;

lazy_static! {
    pub static ref TOKEN_REGEX: Regex = Regex::new(
        r#"("(?:[^"\\\n]|\\.)*"|-?\d+(?:\.\d+)?\b|[=;{}\[\]:,]|\.?[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*|//[^\n]*|/\*(?s:.*?)\*/|\s+)"#
    ).unwrap();
    pub static ref WHITESPACE_RX: Regex = Regex::new(r"^\s+$").unwrap();
}

#[derive(Debug, PartialEq)]
pub struct Token {
    pub text:   String,
    pub line:   usize,
    pub column: usize,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_string_literal(&self) -> bool {
        self.text.len() >= 2 && self.text.starts_with('"') && self.text.ends_with('"')
    }
}

/// Splits `.shim` source text into tokens, dropping whitespace and comments.
/// The returned list always ends with an empty EOF token.
pub fn tokenize_schema(file: &str, text: &str) -> Result<Vec<Token>, ShimError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut column = 1;
    let mut last_end = 0;

    for mat in TOKEN_REGEX.find_iter(text) {
        let start = mat.start();
        let end   = mat.end();
        let part  = mat.as_str();

        if start > last_end {
            let unexpected = &text[last_end..start];
            return Err(error(
                file,
                &format!("Syntax error: {}", quote(unexpected)),
                line,
                column,
            ));
        }

        if !WHITESPACE_RX.is_match(part) && !part.starts_with("//") && !part.starts_with("/*") {
            tokens.push(Token {
                text:   part.to_string(),
                line,
                column,
            });
        }

        let newline_count = part.matches('\n').count();
        if newline_count > 0 {
            line += newline_count;
            if let Some(last_line_part) = part.split('\n').last() {
                column = last_line_part.len() + 1;
            }
        } else {
            column += part.len();
        }

        last_end = end;
    }

    if last_end != text.len() {
        let unexpected = &text[last_end..];
        return Err(error(
            file,
            &format!("Syntax error: {}", quote(unexpected)),
            line,
            column,
        ));
    }

    tokens.push(Token {
        text:   "".to_string(),
        line,
        column,
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_simple() {
        let input = "int32 x = 10;";
        let expected = vec![
            Token { text: "int32".into(), line: 1, column: 1 },
            Token { text: "x".into(),     line: 1, column: 7 },
            Token { text: "=".into(),     line: 1, column: 9 },
            Token { text: "10".into(),    line: 1, column: 11 },
            Token { text: ";".into(),     line: 1, column: 13 },
            Token { text: "".into(),      line: 1, column: 14 },
        ];
        let got = tokenize_schema("t.shim", input).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_tokenize_option_payload() {
        let input = r#"option message = {"alias": "Agraph_t", "n": [1, -2]};"#;
        let texts: Vec<String> = tokenize_schema("t.shim", input)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(
            texts,
            vec![
                "option", "message", "=", "{", "\"alias\"", ":", "\"Agraph_t\"", ",", "\"n\"",
                ":", "[", "1", ",", "-2", "]", "}", ";", "",
            ]
        );
    }

    #[test]
    fn test_tokenize_dotted_names_and_comments() {
        let input = "// header\n.cdt.Dict d = 1; /* multi\nline */ x";
        let got = tokenize_schema("t.shim", input).unwrap();
        assert_eq!(got[0].text, ".cdt.Dict");
        assert_eq!(got[0].line, 2);
        assert_eq!(got[5].text, "x");
        assert_eq!(got[5].line, 3);
    }

    #[test]
    fn test_tokenize_escaped_quotes() {
        let got = tokenize_schema("t.shim", r#""a \"b\"""#).unwrap();
        assert_eq!(got[0].text, r#""a \"b\"""#);
        assert!(got[0].is_string_literal());
    }

    #[test]
    fn test_tokenize_unexpected_text() {
        let input = "int32 x = 10 @";
        let err = tokenize_schema("t.shim", input).unwrap_err();
        assert!(
            matches!(err, ShimError::ParseError { line: 1, .. }),
            "expected a ParseError but got {:?}",
            err
        );
    }
}

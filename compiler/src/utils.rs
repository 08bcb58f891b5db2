use crate::error::ShimError;

pub fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

pub fn error(file: &str, msg: &str, line: usize, column: usize) -> ShimError {
    ShimError::ParseError {
        file: file.to_string(),
        msg: msg.to_string(),
        line,
        column,
    }
}

/// `agnode` -> `Agnode`, `out_edge` -> `OutEdge`.
pub fn to_public_go_variable(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => to_go_variable(&(first.to_uppercase().to_string() + chars.as_str())),
    }
}

/// Drops underscores and upper-cases the character that followed each one.
fn to_go_variable(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper = false;
    for c in s.chars() {
        if c == '_' {
            upper = true;
            continue;
        }
        if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[test]
fn public_go_variable() {
    assert_eq!(to_public_go_variable("agnode"), "Agnode");
    assert_eq!(to_public_go_variable("out_edge"), "OutEdge");
    assert_eq!(to_public_go_variable("Graph_Desc"), "GraphDesc");
    assert_eq!(to_public_go_variable("x"), "X");
    assert_eq!(to_public_go_variable(""), "");
}

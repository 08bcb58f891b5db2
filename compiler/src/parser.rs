use crate::{
    tokenizer::Token,
    utils::{error, quote},
    error::ShimError,
};
use shimwright_schema::{
    EnumDescriptor, EnumValueDescriptor, FieldDescriptor, FieldLabel, FieldType, FileDescriptor,
    MessageDescriptor, RuleSource,
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IDENTIFIER:      Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref TYPE_NAME:       Regex = Regex::new(r"^\.?[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap();
    static ref STRING:          Regex = Regex::new(r#"^"(?:[^"\\]|\\.)*"$"#).unwrap();
    static ref EQUALS:          Regex = Regex::new(r"^=$").unwrap();
    static ref SEMICOLON:       Regex = Regex::new(r"^;$").unwrap();
    static ref INTEGER:         Regex = Regex::new(r"^-?\d+$").unwrap();
    static ref LEFT_BRACE:      Regex = Regex::new(r"^\{$").unwrap();
    static ref RIGHT_BRACE:     Regex = Regex::new(r"^\}$").unwrap();
    static ref LEFT_BRACKET:    Regex = Regex::new(r"^\[$").unwrap();
    static ref RIGHT_BRACKET:   Regex = Regex::new(r"^\]$").unwrap();
    static ref PACKAGE_KEYWORD: Regex = Regex::new(r"^package$").unwrap();
    static ref IMPORT_KEYWORD:  Regex = Regex::new(r"^import$").unwrap();
    static ref OPTION_KEYWORD:  Regex = Regex::new(r"^option$").unwrap();
    static ref MESSAGE_KEYWORD: Regex = Regex::new(r"^message$").unwrap();
    static ref ENUM_KEYWORD:    Regex = Regex::new(r"^enum$").unwrap();
    static ref ONEOF_KEYWORD:   Regex = Regex::new(r"^oneof$").unwrap();
    static ref REPEATED_TOKEN:  Regex = Regex::new(r"^repeated$").unwrap();
    static ref EOF:             Regex = Regex::new(r"^$").unwrap();
}

/// Parses the tokens of one `.shim` file into a descriptor.
///
/// Rule payloads are not interpreted here; they are kept as
/// `RuleSource::Dynamic` bytes for the normalization step.
pub fn parse_schema(file: &str, tokens: &[Token]) -> Result<FileDescriptor, ShimError> {
    if tokens.is_empty() {
        return Err(error(file, "Unexpected end of input", 0, 0));
    }
    let mut parser = Parser { file, tokens, index: 0 };
    parser.parse_file()
}

struct Parser<'a> {
    file:   &'a str,
    tokens: &'a [Token],
    index:  usize,
}

impl<'a> Parser<'a> {
    fn current_token(&self) -> &'a Token {
        let tokens = self.tokens;
        &tokens[self.index.min(tokens.len() - 1)]
    }

    fn eat(&mut self, test: &Regex) -> bool {
        if test.is_match(&self.current_token().text) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, test: &Regex, expected: &str) -> Result<&'a Token, ShimError> {
        let tok = self.current_token();
        if !self.eat(test) {
            return Err(error(
                self.file,
                &format!("Expected {} but found {}", expected, quote(&tok.text)),
                tok.line,
                tok.column,
            ));
        }
        Ok(tok)
    }

    fn unexpected_token(&self) -> ShimError {
        let tok = self.current_token();
        error(
            self.file,
            &format!("Unexpected token {}", quote(&tok.text)),
            tok.line,
            tok.column,
        )
    }

    fn parse_file(&mut self) -> Result<FileDescriptor, ShimError> {
        let mut desc = FileDescriptor {
            name: self.file.to_string(),
            ..Default::default()
        };

        if self.eat(&PACKAGE_KEYWORD) {
            let pkg_tok = self.expect(&TYPE_NAME, "package name")?;
            desc.package = pkg_tok.text.trim_start_matches('.').to_string();
            self.expect(&SEMICOLON, "\";\"")?;
        }

        while !self.eat(&EOF) {
            if self.eat(&IMPORT_KEYWORD) {
                let path_tok = self.expect(&STRING, "import path")?;
                desc.dependencies.push(unquote(&path_tok.text));
                self.expect(&SEMICOLON, "\";\"")?;
            } else if self.eat(&OPTION_KEYWORD) {
                if desc.rule.is_some() {
                    return Err(self.duplicate_option("file"));
                }
                let payload = self.parse_option("file")?;
                desc.rule = Some(RuleSource::Dynamic(payload));
                self.expect(&SEMICOLON, "\";\"")?;
            } else if self.eat(&MESSAGE_KEYWORD) {
                desc.messages.push(self.parse_message()?);
            } else if self.eat(&ENUM_KEYWORD) {
                desc.enums.push(self.parse_enum()?);
            } else {
                return Err(self.unexpected_token());
            }
        }

        Ok(desc)
    }

    fn parse_message(&mut self) -> Result<MessageDescriptor, ShimError> {
        let name_tok = self.expect(&IDENTIFIER, "identifier")?;
        self.expect(&LEFT_BRACE, "\"{\"")?;

        let mut message = MessageDescriptor {
            name: name_tok.text.clone(),
            ..Default::default()
        };

        while !self.eat(&RIGHT_BRACE) {
            if self.current_token().is_eof() {
                return Err(self.unexpected_token());
            }
            if self.eat(&OPTION_KEYWORD) {
                if message.rule.is_some() {
                    return Err(self.duplicate_option("message"));
                }
                let payload = self.parse_option("message")?;
                message.rule = Some(RuleSource::Dynamic(payload));
                self.expect(&SEMICOLON, "\";\"")?;
            } else if self.eat(&MESSAGE_KEYWORD) {
                message.nested_messages.push(self.parse_message()?);
            } else if self.eat(&ENUM_KEYWORD) {
                message.enums.push(self.parse_enum()?);
            } else if self.eat(&ONEOF_KEYWORD) {
                let oneof_tok = self.expect(&IDENTIFIER, "identifier")?;
                let oneof_index = message.oneofs.len();
                message.oneofs.push(oneof_tok.text.clone());
                self.expect(&LEFT_BRACE, "\"{\"")?;
                while !self.eat(&RIGHT_BRACE) {
                    if self.current_token().is_eof() {
                        return Err(self.unexpected_token());
                    }
                    let mut field = self.parse_field()?;
                    if field.label == FieldLabel::Repeated {
                        let tok = self.current_token();
                        return Err(error(self.file, "Repeated fields are not allowed in a oneof", tok.line, tok.column));
                    }
                    field.oneof_index = Some(oneof_index);
                    message.fields.push(field);
                }
            } else {
                message.fields.push(self.parse_field()?);
            }
        }

        Ok(message)
    }

    fn parse_field(&mut self) -> Result<FieldDescriptor, ShimError> {
        let label = if self.eat(&REPEATED_TOKEN) {
            FieldLabel::Repeated
        } else {
            FieldLabel::Optional
        };

        let type_tok = self.expect(&TYPE_NAME, "type name")?;
        let (kind, type_name) = match FieldType::from_keyword(&type_tok.text) {
            Some(kind) => (kind, String::new()),
            None => (FieldType::Named, type_tok.text.clone()),
        };

        let name_tok = self.expect(&IDENTIFIER, "identifier")?;
        self.expect(&EQUALS, "\"=\"")?;
        let number = self.parse_integer()?;

        let mut rule = None;
        if self.eat(&LEFT_BRACKET) {
            let payload = self.parse_option("field")?;
            rule = Some(RuleSource::Dynamic(payload));
            self.expect(&RIGHT_BRACKET, "\"]\"")?;
        }
        self.expect(&SEMICOLON, "\";\"")?;

        Ok(FieldDescriptor {
            name: name_tok.text.clone(),
            number,
            label,
            kind,
            type_name,
            oneof_index: None,
            rule,
        })
    }

    fn parse_enum(&mut self) -> Result<EnumDescriptor, ShimError> {
        let name_tok = self.expect(&IDENTIFIER, "identifier")?;
        self.expect(&LEFT_BRACE, "\"{\"")?;

        let mut enum_ = EnumDescriptor {
            name: name_tok.text.clone(),
            ..Default::default()
        };

        while !self.eat(&RIGHT_BRACE) {
            if self.current_token().is_eof() {
                return Err(self.unexpected_token());
            }
            if self.eat(&OPTION_KEYWORD) {
                if enum_.rule.is_some() {
                    return Err(self.duplicate_option("enum"));
                }
                let payload = self.parse_option("enum")?;
                enum_.rule = Some(RuleSource::Dynamic(payload));
                self.expect(&SEMICOLON, "\";\"")?;
                continue;
            }

            let value_tok = self.expect(&IDENTIFIER, "identifier")?;
            self.expect(&EQUALS, "\"=\"")?;
            let number = self.parse_integer()?;

            let mut rule = None;
            if self.eat(&LEFT_BRACKET) {
                let payload = self.parse_option("enum_value")?;
                rule = Some(RuleSource::Dynamic(payload));
                self.expect(&RIGHT_BRACKET, "\"]\"")?;
            }
            self.expect(&SEMICOLON, "\";\"")?;

            enum_.values.push(EnumValueDescriptor {
                name: value_tok.text.clone(),
                number,
                rule,
            });
        }

        Ok(enum_)
    }

    fn parse_integer(&mut self) -> Result<i32, ShimError> {
        let tok = self.expect(&INTEGER, "integer")?;
        tok.text.parse::<i32>().map_err(|_| {
            error(
                self.file,
                &format!("Invalid integer {}", quote(&tok.text)),
                tok.line,
                tok.column,
            )
        })
    }

    /// Parses `<name> = { ... }` and returns the payload as JSON bytes.
    /// One rule per entity; a second `option` would silently replace the first.
    fn duplicate_option(&self, name: &str) -> ShimError {
        let tok = self.current_token();
        error(self.file, &format!("option {} already set", name), tok.line, tok.column)
    }

    fn parse_option(&mut self, expected_name: &str) -> Result<Vec<u8>, ShimError> {
        let name_tok = self.expect(&IDENTIFIER, "option name")?;
        if name_tok.text != expected_name {
            return Err(error(
                self.file,
                &format!(
                    "Unknown option {} here, expected {}",
                    quote(&name_tok.text),
                    quote(expected_name)
                ),
                name_tok.line,
                name_tok.column,
            ));
        }
        self.expect(&EQUALS, "\"=\"")?;

        let open = self.expect(&LEFT_BRACE, "\"{\"")?;
        let mut payload = open.text.clone();
        let mut depth = 1usize;
        while depth > 0 {
            let tok = self.current_token();
            if tok.is_eof() {
                return Err(error(self.file, "Unterminated option value", open.line, open.column));
            }
            match tok.text.as_str() {
                "{" | "[" => depth += 1,
                "}" | "]" => depth -= 1,
                ";" | "=" => return Err(self.unexpected_token()),
                _ => {}
            }
            payload.push_str(&tok.text);
            self.index += 1;
        }

        Ok(payload.into_bytes())
    }
}

fn unquote(text: &str) -> String {
    serde_json::from_str::<String>(text).unwrap_or_else(|_| text.trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize_schema;
    use shimwright_schema::MessageRule;

    fn parse(text: &str) -> Result<FileDescriptor, ShimError> {
        let tokens = tokenize_schema("test.shim", text)?;
        parse_schema("test.shim", &tokens)
    }

    #[test]
    fn parses_package_imports_and_messages() {
        let desc = parse(
            r#"
            package graph;
            import "cdt.shim";

            message Point {
              option message = { "alias": "point_t" };
              int32 x = 1;
              repeated .cdt.Dict dicts = 2 [field = { "alias": "dict" }];
              message Inner { bool flag = 1; }
              enum Side { LEFT = 0; }
            }
            "#,
        )
        .unwrap();

        assert_eq!(desc.name, "test.shim");
        assert_eq!(desc.package, "graph");
        assert_eq!(desc.dependencies, vec!["cdt.shim".to_string()]);

        let point = &desc.messages[0];
        assert_eq!(point.name, "Point");
        assert_eq!(point.fields.len(), 2);
        assert_eq!(point.fields[0].kind, FieldType::Int32);
        assert_eq!(point.fields[1].kind, FieldType::Named);
        assert_eq!(point.fields[1].type_name, ".cdt.Dict");
        assert_eq!(point.fields[1].label, FieldLabel::Repeated);
        assert_eq!(point.nested_messages[0].name, "Inner");
        assert_eq!(point.enums[0].values[0].name, "LEFT");

        let mut rule = point.rule.clone().unwrap();
        assert!(rule.is_dynamic());
        rule.normalize("graph.Point").unwrap();
        let typed: &MessageRule = rule.typed().unwrap();
        assert_eq!(typed.alias, "point_t");
    }

    #[test]
    fn parses_oneof_members() {
        let desc = parse("message Shape { int32 kind = 1; oneof u { double radius = 2; float side = 3; } }").unwrap();
        let shape = &desc.messages[0];
        assert_eq!(shape.oneofs, vec!["u".to_string()]);
        assert_eq!(shape.fields[0].oneof_index, None);
        assert_eq!(shape.fields[1].oneof_index, Some(0));
        assert_eq!(shape.fields[2].oneof_index, Some(0));
    }

    #[test]
    fn parses_enum_value_rules() {
        let desc = parse(r#"enum Color { RED = 0 [enum_value = { "alias": "RED" }]; BLUE = 1; }"#).unwrap();
        let color = &desc.enums[0];
        assert!(color.values[0].rule.is_some());
        assert!(color.values[1].rule.is_none());
        assert_eq!(color.values[1].number, 1);
    }

    #[test]
    fn option_payload_keeps_json_shape() {
        let desc = parse(r#"option file = { "exports": [ { "headers": ["a.h", "b.h"] } ] };"#).unwrap();
        match desc.rule.unwrap() {
            RuleSource::Dynamic(bytes) => {
                assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"exports":[{"headers":["a.h","b.h"]}]}"#);
            }
            RuleSource::Typed(_) => panic!("expected a dynamic payload"),
        }
    }

    #[test]
    fn rejects_misplaced_option_name() {
        let err = parse(r#"message A { option field = { }; }"#).unwrap_err();
        assert!(matches!(err, ShimError::ParseError { .. }), "{:?}", err);
    }

    #[test]
    fn rejects_second_option_on_one_entity() {
        let cases = [
            (r#"package p; option file = {}; option file = {"exports":[]};"#, "option file already set"),
            (r#"message A { option message = {"alias":"a"}; option message = {"alias":"b"}; }"#, "option message already set"),
            (r#"enum E { option enum = {}; option enum = {}; A = 0; }"#, "option enum already set"),
        ];
        for (text, expected) in cases {
            match parse(text).unwrap_err() {
                ShimError::ParseError { msg, .. } => assert_eq!(msg, expected),
                err => panic!("unexpected error {:?}", err),
            }
        }
    }

    #[test]
    fn rejects_unterminated_message() {
        let err = parse("message A { int32 x = 1;").unwrap_err();
        assert!(matches!(err, ShimError::ParseError { .. }), "{:?}", err);
    }

    #[test]
    fn rejects_missing_field_number() {
        let err = parse("message A { int32 x; }").unwrap_err();
        match err {
            ShimError::ParseError { msg, line, column, .. } => {
                assert_eq!(msg, "Expected \"=\" but found \";\"");
                assert_eq!((line, column), (1, 20));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}

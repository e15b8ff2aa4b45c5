//! The built-in parser for `.ckg` declaration files.
//!
//! Language-specific parsers are external collaborators behind
//! [`engine::parser::SourceParser`]; this one handles the declarative
//! format the CLI ships with, one declaration per line:
//!
//! ```text
//! fn name
//! class Name
//! interface Name
//! method Owner.name
//! call from -> to
//! import from -> to
//! extends from -> to
//! implements from -> to
//! ```
//!
//! Comment lines start with `#`. Anything else is a parse error, reported
//! with whatever declarations were already recognized.

use engine::parser::{
    ParsedFile, ParsedReference, ParsedSymbol, ReferenceKind, SourceParser, SymbolKind,
};

pub const SOURCE_EXTENSION: &str = "ckg";

#[derive(Debug, Default, Clone, Copy)]
pub struct DeclarativeParser;

impl SourceParser for DeclarativeParser {
    fn parse(&self, _file_path: &str, content: &str) -> ParsedFile {
        let mut parsed = ParsedFile::default();
        for (index, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            let line_number = index as i64 + 1;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((keyword, rest)) = line.split_once(' ') else {
                parsed.error = Some(format!("malformed line {line_number}: {line}"));
                continue;
            };
            let rest = rest.trim();
            match keyword {
                "fn" => parsed.symbols.push(symbol(rest, SymbolKind::Function, line_number, line)),
                "class" => parsed.symbols.push(symbol(rest, SymbolKind::Class, line_number, line)),
                "interface" => {
                    parsed.symbols.push(symbol(rest, SymbolKind::Interface, line_number, line))
                }
                "method" => parsed.symbols.push(symbol(rest, SymbolKind::Method, line_number, line)),
                "call" => push_reference(&mut parsed, rest, ReferenceKind::Calls, line_number),
                "import" => push_reference(&mut parsed, rest, ReferenceKind::Imports, line_number),
                "extends" => push_reference(&mut parsed, rest, ReferenceKind::Extends, line_number),
                "implements" => {
                    push_reference(&mut parsed, rest, ReferenceKind::Implements, line_number)
                }
                other => {
                    parsed.error =
                        Some(format!("unknown keyword `{other}` on line {line_number}"));
                }
            }
        }
        parsed
    }
}

fn symbol(name: &str, kind: SymbolKind, line: i64, body: &str) -> ParsedSymbol {
    ParsedSymbol {
        name: name.to_string(),
        kind,
        start_line: line,
        end_line: line,
        body: body.to_string(),
    }
}

fn push_reference(parsed: &mut ParsedFile, rest: &str, kind: ReferenceKind, line_number: i64) {
    match rest.split_once("->") {
        Some((from, to)) => parsed.references.push(ParsedReference {
            from_symbol: from.trim().to_string(),
            to_name: to.trim().to_string(),
            kind,
        }),
        None => {
            parsed.error = Some(format!("malformed reference on line {line_number}: {rest}"));
        }
    }
}

//! A fixture parser over a toy line-oriented language, so engine and sync
//! tests can exercise ingestion without a real language grammar.
//!
//! Grammar, one declaration per line:
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
//! !message          (parse error marker)
//! ```

use crate::parser::{ParsedFile, ParsedReference, ParsedSymbol, ReferenceKind, SourceParser, SymbolKind};

#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureParser;

impl SourceParser for FixtureParser {
    fn parse(&self, _file_path: &str, content: &str) -> ParsedFile {
        let mut parsed = ParsedFile::default();
        for (index, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            let line_number = index as i64 + 1;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(message) = line.strip_prefix('!') {
                parsed.error = Some(message.trim().to_string());
                continue;
            }
            if let Some((keyword, rest)) = line.split_once(' ') {
                let rest = rest.trim();
                match keyword {
                    "fn" => parsed.symbols.push(symbol(rest, SymbolKind::Function, line_number, line)),
                    "class" => parsed.symbols.push(symbol(rest, SymbolKind::Class, line_number, line)),
                    "interface" => {
                        parsed.symbols.push(symbol(rest, SymbolKind::Interface, line_number, line))
                    }
                    "method" => parsed.symbols.push(symbol(rest, SymbolKind::Method, line_number, line)),
                    "call" => push_reference(&mut parsed, rest, ReferenceKind::Calls),
                    "import" => push_reference(&mut parsed, rest, ReferenceKind::Imports),
                    "extends" => push_reference(&mut parsed, rest, ReferenceKind::Extends),
                    "implements" => push_reference(&mut parsed, rest, ReferenceKind::Implements),
                    _ => parsed.error = Some(format!("unknown keyword on line {line_number}")),
                }
            } else {
                parsed.error = Some(format!("malformed line {line_number}"));
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

fn push_reference(parsed: &mut ParsedFile, rest: &str, kind: ReferenceKind) {
    match rest.split_once("->") {
        Some((from, to)) => parsed.references.push(ParsedReference {
            from_symbol: from.trim().to_string(),
            to_name: to.trim().to_string(),
            kind,
        }),
        None => parsed.error = Some(format!("malformed reference: {rest}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_symbols_and_references() {
        let content = "fn main\nfn helper\ncall main -> helper\n";
        let parsed = FixtureParser.parse("src/m.ckg", content);
        assert_eq!(parsed.symbols.len(), 2);
        assert_eq!(parsed.references.len(), 1);
        assert!(parsed.error.is_none());
        assert_eq!(parsed.symbols[0].start_line, 1);
        assert_eq!(parsed.references[0].to_name, "helper");
    }

    #[test]
    fn error_marker_is_surfaced_with_partial_symbols() {
        let content = "fn main\n!unexpected token\n";
        let parsed = FixtureParser.parse("src/m.ckg", content);
        assert_eq!(parsed.symbols.len(), 1);
        assert_eq!(parsed.error.as_deref(), Some("unexpected token"));
    }
}

//! The parser seam. The engine never inspects source text itself; it
//! consumes whatever symbol and reference set a [`SourceParser`] reports
//! for a file and is agnostic to the language behind it.

use graph_store::{NodeLabel, RelationType};

/// Symbol kinds a parser may report, mapped onto graph node labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Method,
}

impl SymbolKind {
    pub fn label(&self) -> NodeLabel {
        match self {
            SymbolKind::Function => NodeLabel::Function,
            SymbolKind::Class => NodeLabel::Class,
            SymbolKind::Interface => NodeLabel::Interface,
            SymbolKind::Method => NodeLabel::Method,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub start_line: i64,
    pub end_line: i64,
    pub body: String,
}

/// Reference kinds a parser may report, mapped onto edge types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Calls,
    Imports,
    Extends,
    Implements,
}

impl ReferenceKind {
    pub fn relation(&self) -> RelationType {
        match self {
            ReferenceKind::Calls => RelationType::Calls,
            ReferenceKind::Imports => RelationType::Imports,
            ReferenceKind::Extends => RelationType::Extends,
            ReferenceKind::Implements => RelationType::Implements,
        }
    }
}

/// A reference from a symbol in this file to a named target that may live
/// anywhere in the repository.
#[derive(Debug, Clone)]
pub struct ParsedReference {
    pub from_symbol: String,
    pub to_name: String,
    pub kind: ReferenceKind,
}

/// Parser output for one file. A parser must tolerate partial input:
/// whatever symbols were recognized are returned alongside an error
/// marker, never a silent failure.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub symbols: Vec<ParsedSymbol>,
    pub references: Vec<ParsedReference>,
    pub error: Option<String>,
}

pub trait SourceParser: Send + Sync {
    fn parse(&self, file_path: &str, content: &str) -> ParsedFile;
}

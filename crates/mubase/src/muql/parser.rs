//! MUQL grammar and recursive-descent parser.
//!
//! Statements:
//!
//! ```text
//! SELECT * FROM <functions|classes|modules|nodes> [WHERE <cond> [AND <cond>]*]
//! FIND <function|class|module|node> MATCHING <pattern>
//! SHOW <dependencies|dependents> OF <node-ref> [DEPTH <n>]
//! DESCRIBE <type>
//! ANALYZE <circular|complexity|coupling|unused|hotspots>
//! ```
//!
//! Conditions compare an allow-listed field with `=`, `>`, `<`, `LIKE`,
//! `CONTAINS`, or `IN (...)`. Field names form a closed set: identifiers
//! cannot be parameterized downstream, so anything outside the allow-list
//! is rejected here.

use crate::error::{Error, Result};
use crate::types::NodeType;

use super::token::{Token, TokenKind, tokenize};

/// The node population a statement runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Function nodes.
    Functions,
    /// Class nodes.
    Classes,
    /// Module nodes.
    Modules,
    /// All nodes, no type filter.
    Nodes,
}

impl Source {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "functions" | "function" => Some(Self::Functions),
            "classes" | "class" => Some(Self::Classes),
            "modules" | "module" => Some(Self::Modules),
            "nodes" | "node" => Some(Self::Nodes),
            _ => None,
        }
    }

    /// The implicit type filter, `None` for the unfiltered `nodes` source.
    #[must_use]
    pub fn node_type(self) -> Option<NodeType> {
        match self {
            Self::Functions => Some(NodeType::Function),
            Self::Classes => Some(NodeType::Class),
            Self::Modules => Some(NodeType::Module),
            Self::Nodes => None,
        }
    }
}

/// Filterable fields. Closed allow-list; column names come from
/// [`Field::column`], never from input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Node id.
    Id,
    /// Node type.
    Type,
    /// Short name.
    Name,
    /// Dotted qualified name.
    QualifiedName,
    /// Source file path.
    FilePath,
    /// First source line.
    LineStart,
    /// Last source line.
    LineEnd,
    /// Cyclomatic complexity.
    Complexity,
}

impl Field {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "id" => Some(Self::Id),
            "type" => Some(Self::Type),
            "name" => Some(Self::Name),
            "qualified_name" => Some(Self::QualifiedName),
            "file_path" => Some(Self::FilePath),
            "line_start" => Some(Self::LineStart),
            "line_end" => Some(Self::LineEnd),
            "complexity" => Some(Self::Complexity),
            _ => None,
        }
    }

    /// The column this field maps to.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Type => "type",
            Self::Name => "name",
            Self::QualifiedName => "qualified_name",
            Self::FilePath => "file_path",
            Self::LineStart => "line_start",
            Self::LineEnd => "line_end",
            Self::Complexity => "complexity",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `LIKE` (substring, planner wraps the value in `%`)
    Like,
    /// `CONTAINS` (alias of `LIKE`)
    Contains,
    /// `IN (a, b, c)`
    In,
}

/// A parsed literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// A quoted string or bare word.
    Text(String),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
}

/// One `WHERE` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Field on the left-hand side.
    pub field: Field,
    /// Operator.
    pub op: CompareOp,
    /// Right-hand values: one entry except for `IN`, which keeps input order.
    pub values: Vec<Literal>,
}

/// Traversal direction for `SHOW`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Outgoing edges: what the node depends on.
    Dependencies,
    /// Incoming edges: what depends on the node.
    Dependents,
}

/// Built-in analyses for `ANALYZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analysis {
    /// Import/inheritance cycles.
    Circular,
    /// Most complex functions and classes.
    Complexity,
    /// Nodes ranked by total degree.
    Coupling,
    /// Functions with no incoming CALLS edges.
    Unused,
    /// Complexity weighted by fan-in.
    Hotspots,
}

/// A parsed MUQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `SELECT * FROM <source> [WHERE ...]`
    Select {
        /// Node population.
        source: Source,
        /// Conjunction of comparisons; empty for no `WHERE` clause.
        conditions: Vec<Condition>,
    },
    /// `FIND <type> MATCHING <pattern>`
    Find {
        /// Node population.
        source: Source,
        /// Name pattern (`*` wildcards allowed).
        pattern: String,
    },
    /// `SHOW dependencies|dependents OF <node> [DEPTH <n>]`
    Show {
        /// Traversal direction.
        direction: Direction,
        /// Free-form node reference.
        reference: String,
        /// Hop bound.
        depth: u32,
    },
    /// `DESCRIBE <type>`
    Describe {
        /// Node population.
        source: Source,
    },
    /// `ANALYZE <analysis>`
    Analyze {
        /// Which built-in analysis to run.
        analysis: Analysis,
    },
}

/// Parse a query into a statement.
pub fn parse(input: &str) -> Result<Statement> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let statement = parser.statement()?;
    parser.expect_end()?;
    Ok(statement)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn statement(&mut self) -> Result<Statement> {
        let keyword = self.word("a statement keyword")?;
        match keyword.to_ascii_uppercase().as_str() {
            "SELECT" => self.select(),
            "FIND" => self.find(),
            "SHOW" => self.show(),
            "DESCRIBE" => Ok(Statement::Describe {
                source: self.source()?,
            }),
            "ANALYZE" => self.analyze(),
            _ => Err(self.error_at_prev(format!("unknown statement '{keyword}'"))),
        }
    }

    fn select(&mut self) -> Result<Statement> {
        self.expect_symbol('*')?;
        self.expect_keyword("FROM")?;
        let source = self.source()?;

        let mut conditions = Vec::new();
        if self.peek_keyword("WHERE") {
            self.pos += 1;
            conditions.push(self.condition()?);
            while self.peek_keyword("AND") {
                self.pos += 1;
                conditions.push(self.condition()?);
            }
        }

        Ok(Statement::Select { source, conditions })
    }

    fn find(&mut self) -> Result<Statement> {
        let source = self.source()?;
        self.expect_keyword("MATCHING")?;
        let pattern = self.text_value("a pattern")?;
        Ok(Statement::Find { source, pattern })
    }

    fn show(&mut self) -> Result<Statement> {
        let word = self.word("'dependencies' or 'dependents'")?;
        let direction = match word.to_ascii_lowercase().as_str() {
            "dependencies" => Direction::Dependencies,
            "dependents" => Direction::Dependents,
            _ => {
                return Err(
                    self.error_at_prev(format!("expected 'dependencies' or 'dependents', got '{word}'"))
                );
            }
        };
        self.expect_keyword("OF")?;
        let reference = self.text_value("a node reference")?;

        let mut depth = 1;
        if self.peek_keyword("DEPTH") {
            self.pos += 1;
            depth = self.number_u32()?;
        }

        Ok(Statement::Show {
            direction,
            reference,
            depth,
        })
    }

    fn analyze(&mut self) -> Result<Statement> {
        let word = self.word("an analysis name")?;
        let analysis = match word.to_ascii_lowercase().as_str() {
            "circular" => Analysis::Circular,
            "complexity" => Analysis::Complexity,
            "coupling" => Analysis::Coupling,
            "unused" => Analysis::Unused,
            "hotspots" => Analysis::Hotspots,
            _ => return Err(self.error_at_prev(format!("unknown analysis '{word}'"))),
        };
        Ok(Statement::Analyze { analysis })
    }

    fn condition(&mut self) -> Result<Condition> {
        let word = self.word("a field name")?;
        let Some(field) = Field::parse(&word) else {
            return Err(self.error_at_prev(format!("unknown field '{word}'")));
        };

        let op = self.compare_op()?;
        let values = if op == CompareOp::In {
            self.expect_symbol('(')?;
            let mut values = vec![self.literal()?];
            while self.peek_symbol(',') {
                self.pos += 1;
                values.push(self.literal()?);
            }
            self.expect_symbol(')')?;
            values
        } else {
            vec![self.literal()?]
        };

        Ok(Condition { field, op, values })
    }

    fn compare_op(&mut self) -> Result<CompareOp> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Symbol('='),
                ..
            }) => Ok(CompareOp::Eq),
            Some(Token {
                kind: TokenKind::Symbol('>'),
                ..
            }) => Ok(CompareOp::Gt),
            Some(Token {
                kind: TokenKind::Symbol('<'),
                ..
            }) => Ok(CompareOp::Lt),
            Some(Token {
                kind: TokenKind::Word(w),
                position,
            }) => match w.to_ascii_uppercase().as_str() {
                "LIKE" => Ok(CompareOp::Like),
                "CONTAINS" => Ok(CompareOp::Contains),
                "IN" => Ok(CompareOp::In),
                _ => Err(Error::Syntax {
                    message: format!("expected a comparison operator, got '{w}'"),
                    position,
                }),
            },
            other => Err(self.error_at(other, "a comparison operator")),
        }
    }

    fn literal(&mut self) -> Result<Literal> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Str(s),
                ..
            }) => Ok(Literal::Text(s)),
            Some(Token {
                kind: TokenKind::Word(w),
                ..
            }) => Ok(Literal::Text(w)),
            Some(Token {
                kind: TokenKind::Number(n),
                position,
            }) => {
                if let Ok(i) = n.parse::<i64>() {
                    Ok(Literal::Int(i))
                } else if let Ok(f) = n.parse::<f64>() {
                    Ok(Literal::Float(f))
                } else {
                    Err(Error::Syntax {
                        message: format!("malformed number '{n}'"),
                        position,
                    })
                }
            }
            other => Err(self.error_at(other, "a value")),
        }
    }

    fn source(&mut self) -> Result<Source> {
        let word = self.word("a node type")?;
        Source::parse(&word)
            .ok_or_else(|| self.error_at_prev(format!("unknown node type '{word}'")))
    }

    /// A quoted string or a bare word, as plain text.
    fn text_value(&mut self, expected: &str) -> Result<String> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Str(s),
                ..
            }) => Ok(s),
            Some(Token {
                kind: TokenKind::Word(w),
                ..
            }) => Ok(w),
            other => Err(self.error_at(other, expected)),
        }
    }

    fn number_u32(&mut self) -> Result<u32> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Number(n),
                position,
            }) => n.parse::<u32>().map_err(|_| Error::Syntax {
                message: format!("expected a depth, got '{n}'"),
                position,
            }),
            other => Err(self.error_at(other, "a depth")),
        }
    }

    fn word(&mut self, expected: &str) -> Result<String> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Word(w),
                ..
            }) => Ok(w),
            other => Err(self.error_at(other, expected)),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        let word = self.word(keyword)?;
        if word.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(self.error_at_prev(format!("expected '{keyword}', got '{word}'")))
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<()> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Symbol(c),
                ..
            }) if c == symbol => Ok(()),
            other => Err(self.error_at(other, &format!("'{symbol}'"))),
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        match self.tokens.get(self.pos) {
            None => Ok(()),
            Some(token) => Err(Error::Syntax {
                message: "unexpected trailing input".to_string(),
                position: token.position,
            }),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.tokens.get(self.pos),
            Some(Token { kind: TokenKind::Word(w), .. }) if w.eq_ignore_ascii_case(keyword)
        )
    }

    fn peek_symbol(&self, symbol: char) -> bool {
        matches!(
            self.tokens.get(self.pos),
            Some(Token { kind: TokenKind::Symbol(c), .. }) if *c == symbol
        )
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, token: Option<Token>, expected: &str) -> Error {
        match token {
            Some(token) => Error::Syntax {
                message: format!("expected {expected}"),
                position: token.position,
            },
            None => Error::Syntax {
                message: format!("expected {expected}, found end of input"),
                position: self.end,
            },
        }
    }

    fn error_at_prev(&self, message: String) -> Error {
        let position = self
            .pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(self.end, |t| t.position);
        Error::Syntax { message, position }
    }
}

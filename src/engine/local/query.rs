//! The query subset the local engine understands:
//!
//! ```text
//! SELECT item [, item]* [FROM table] [LIMIT n] [;]
//! item  := * | column [[AS] alias] | literal [[AS] alias]
//! table := ident | ident . ident
//! ```
//!
//! Unquoted identifiers fold to lower case; `"..."` identifiers are taken
//! verbatim with `""` as an escaped quote. String literals use `'...'` with
//! `''` as an escaped quote.

use std::sync::Arc;

use crate::engine::wire;
use crate::engine::{ColumnDefinition, EngineError, RowChunk, RowSet};
use crate::types::storage::MAX_NUMERIC_PRECISION;
use crate::types::{StorageType, TableName};

use super::LocalConnection;

/// Rows per chunk when the caller does not ask for a size.
pub const DEFAULT_CHUNK_ROWS: usize = 65_536;

/// Result name of an unaliased literal.
const ANONYMOUS_COLUMN: &str = "?column?";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Str(String),
    Number(String),
    Star,
    Comma,
    Dot,
    Minus,
    Semicolon,
}

fn syntax(msg: impl Into<String>) -> EngineError {
    EngineError::Query(format!("syntax error: {}", msg.into()))
}

fn tokenize(sql: &str) -> Result<Vec<Token>, EngineError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                i += 1;
            }
            '.' if !chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '"' | '\'' => {
                let (text, next) = quoted(&chars, i, c)?;
                tokens.push(if c == '"' {
                    Token::Quoted(text)
                } else {
                    Token::Str(text)
                });
                i = next;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                let mut seen_dot = false;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || (chars[i] == '.' && !seen_dot))
                {
                    seen_dot |= chars[i] == '.';
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            other => return Err(syntax(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

/// Read a quoted run starting at `start`, where a doubled quote stands for
/// one literal quote. Returns the text and the index after the closing quote.
fn quoted(chars: &[char], start: usize, quote: char) -> Result<(String, usize), EngineError> {
    let mut out = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err(syntax("unterminated quoted string")),
            Some(&c) if c == quote => {
                if chars.get(i + 1) == Some(&quote) {
                    out.push(quote);
                    i += 2;
                } else {
                    return Ok((out, i + 1));
                }
            }
            Some(&c) => {
                out.push(c);
                i += 1;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Literal {
    Int(i64),
    Decimal { unscaled: i128, precision: u8, scale: u8 },
    Text(String),
    Bool(bool),
    Null,
}

impl Literal {
    fn encode(&self) -> Result<(StorageType, Option<Vec<u8>>), EngineError> {
        Ok(match self {
            Literal::Int(v) => match i32::try_from(*v) {
                Ok(narrow) => (StorageType::Int, Some(narrow.to_le_bytes().to_vec())),
                Err(_) => (StorageType::BigInt, Some(v.to_le_bytes().to_vec())),
            },
            Literal::Decimal {
                unscaled,
                precision,
                scale,
            } => {
                let bytes = wire::encode_numeric(*unscaled, *precision)
                    .ok_or_else(|| EngineError::Query("numeric literal out of range".into()))?;
                (
                    StorageType::Numeric {
                        precision: *precision,
                        scale: *scale,
                    },
                    Some(bytes),
                )
            }
            Literal::Text(s) => (StorageType::Text, Some(s.as_bytes().to_vec())),
            Literal::Bool(b) => (StorageType::Bool, Some(vec![u8::from(*b)])),
            Literal::Null => (StorageType::Text, None),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SelectItem {
    Star,
    Column { name: String, alias: Option<String> },
    Literal { value: Literal, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Select {
    items: Vec<SelectItem>,
    from: Option<TableName>,
    limit: Option<u64>,
}

const RESERVED: [&str; 7] = ["select", "from", "as", "limit", "true", "false", "null"];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(kw))
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_identifier(&self) -> bool {
        match self.peek() {
            Some(Token::Quoted(_)) => true,
            Some(Token::Word(w)) => !RESERVED.contains(&w.to_ascii_lowercase().as_str()),
            _ => false,
        }
    }

    fn identifier(&mut self) -> Result<String, EngineError> {
        if !self.at_identifier() {
            return Err(syntax(format!("expected identifier, found {:?}", self.peek())));
        }
        match self.next() {
            Some(Token::Quoted(q)) => Ok(q),
            Some(Token::Word(w)) => Ok(w.to_lowercase()),
            _ => Err(syntax("expected identifier")),
        }
    }

    fn alias(&mut self) -> Result<Option<String>, EngineError> {
        if self.eat_keyword("as") {
            return self.identifier().map(Some);
        }
        if self.at_identifier() {
            return self.identifier().map(Some);
        }
        Ok(None)
    }

    fn select(&mut self) -> Result<Select, EngineError> {
        if !self.eat_keyword("select") {
            return Err(syntax("expected SELECT"));
        }
        let mut items = vec![self.item()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            items.push(self.item()?);
        }

        let from = if self.eat_keyword("from") {
            let first = self.identifier()?;
            if self.peek() == Some(&Token::Dot) {
                self.pos += 1;
                Some(TableName::with_schema(first, self.identifier()?))
            } else {
                Some(TableName::new(first))
            }
        } else {
            None
        };

        let limit = if self.eat_keyword("limit") {
            match self.next() {
                Some(Token::Number(n)) => Some(
                    n.parse::<u64>()
                        .map_err(|_| syntax(format!("invalid LIMIT {n}")))?,
                ),
                other => return Err(syntax(format!("invalid LIMIT {other:?}"))),
            }
        } else {
            None
        };

        if self.peek() == Some(&Token::Semicolon) {
            self.pos += 1;
        }
        if let Some(extra) = self.peek() {
            return Err(syntax(format!("unexpected {extra:?} at end of query")));
        }
        Ok(Select { items, from, limit })
    }

    fn item(&mut self) -> Result<SelectItem, EngineError> {
        if self.peek() == Some(&Token::Star) {
            self.pos += 1;
            return Ok(SelectItem::Star);
        }
        if let Some(value) = self.literal()? {
            let alias = self.alias()?;
            return Ok(SelectItem::Literal { value, alias });
        }
        let name = self.identifier()?;
        let alias = self.alias()?;
        Ok(SelectItem::Column { name, alias })
    }

    fn literal(&mut self) -> Result<Option<Literal>, EngineError> {
        if self.eat_keyword("true") {
            return Ok(Some(Literal::Bool(true)));
        }
        if self.eat_keyword("false") {
            return Ok(Some(Literal::Bool(false)));
        }
        if self.eat_keyword("null") {
            return Ok(Some(Literal::Null));
        }
        let negative = self.peek() == Some(&Token::Minus);
        if negative {
            self.pos += 1;
        }
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.pos += 1;
                number_literal(&n, negative).map(Some)
            }
            Some(Token::Str(s)) if !negative => {
                self.pos += 1;
                Ok(Some(Literal::Text(s)))
            }
            _ if negative => Err(syntax("expected number after '-'")),
            _ => Ok(None),
        }
    }
}

fn number_literal(text: &str, negative: bool) -> Result<Literal, EngineError> {
    let out_of_range = || EngineError::Query(format!("numeric literal {text} out of range"));
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text, None),
    };

    let Some(frac) = frac_part else {
        let magnitude: i128 = int_part.parse().map_err(|_| out_of_range())?;
        let value = if negative { -magnitude } else { magnitude };
        return i64::try_from(value).map(Literal::Int).map_err(|_| out_of_range());
    };

    let significant = int_part.trim_start_matches('0');
    let digits = format!("{significant}{frac}");
    let scale = u8::try_from(frac.len()).map_err(|_| out_of_range())?;
    let precision = u8::try_from(significant.len() + frac.len())
        .map_err(|_| out_of_range())?
        .max(1);
    if precision > MAX_NUMERIC_PRECISION {
        return Err(out_of_range());
    }
    let magnitude: i128 = if digits.is_empty() {
        0
    } else {
        digits.parse().map_err(|_| out_of_range())?
    };
    Ok(Literal::Decimal {
        unscaled: if negative { -magnitude } else { magnitude },
        precision,
        scale,
    })
}

fn parse(sql: &str) -> Result<Select, EngineError> {
    let tokens = tokenize(sql)?;
    Parser { tokens, pos: 0 }.select()
}

#[derive(Debug, Clone)]
enum Output {
    Column(usize),
    Constant(Option<Vec<u8>>),
}

#[derive(Debug)]
enum Source {
    Table(Arc<Vec<RowChunk>>),
    SingleRow,
}

/// A fully owned result; rows are copied out of the shared table data one
/// chunk at a time.
#[derive(Debug)]
pub struct LocalRowSet {
    columns: Vec<ColumnDefinition>,
    outputs: Vec<Output>,
    source: Source,
    chunk_size: usize,
    remaining: usize,
    chunk: usize,
    row: usize,
}

impl RowSet for LocalRowSet {
    fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    fn next_chunk(&mut self) -> Result<Option<RowChunk>, EngineError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let n = self.remaining.min(self.chunk_size);
        let mut out = RowChunk::new(self.outputs.len());
        for _ in 0..n {
            match &self.source {
                Source::Table(chunks) => {
                    while chunks
                        .get(self.chunk)
                        .is_some_and(|c| self.row >= c.num_rows())
                    {
                        self.chunk += 1;
                        self.row = 0;
                    }
                    let src = chunks.get(self.chunk).ok_or_else(|| {
                        EngineError::Query("table data ended early".into())
                    })?;
                    for output in &self.outputs {
                        match output {
                            Output::Column(i) => out.push_cell(src.cell(self.row, *i)),
                            Output::Constant(bytes) => out.push_cell(bytes.as_deref()),
                        }
                    }
                    self.row += 1;
                }
                Source::SingleRow => {
                    for output in &self.outputs {
                        match output {
                            Output::Constant(bytes) => out.push_cell(bytes.as_deref()),
                            Output::Column(_) => {
                                return Err(EngineError::Query(
                                    "column reference without FROM".into(),
                                ))
                            }
                        }
                    }
                }
            }
            out.end_row();
        }
        self.remaining -= n;
        Ok(Some(out))
    }
}

#[tracing::instrument(level = "debug", skip(conn))]
pub(super) fn execute(
    conn: &mut LocalConnection,
    sql: &str,
    chunk_size: Option<usize>,
) -> Result<LocalRowSet, EngineError> {
    let select = parse(sql)?;

    let table = match &select.from {
        Some(name) => Some(conn.scan(name)?),
        None => None,
    };

    let mut columns = Vec::with_capacity(select.items.len());
    let mut outputs = Vec::with_capacity(select.items.len());
    for item in select.items {
        match item {
            SelectItem::Star => {
                let (def, _) = table
                    .as_ref()
                    .ok_or_else(|| EngineError::Query("SELECT * requires a FROM clause".into()))?;
                for (i, col) in def.columns.iter().enumerate() {
                    columns.push(col.clone());
                    outputs.push(Output::Column(i));
                }
            }
            SelectItem::Column { name, alias } => {
                let def = table.as_ref().map(|(def, _)| def);
                let (i, col) = def
                    .and_then(|d| d.columns.iter().enumerate().find(|(_, c)| c.name == name))
                    .ok_or_else(|| {
                        EngineError::Query(format!("column \"{name}\" does not exist"))
                    })?;
                columns.push(ColumnDefinition {
                    name: alias.unwrap_or(name),
                    ..col.clone()
                });
                outputs.push(Output::Column(i));
            }
            SelectItem::Literal { value, alias } => {
                let (storage_type, bytes) = value.encode()?;
                columns.push(ColumnDefinition::new(
                    alias.unwrap_or_else(|| ANONYMOUS_COLUMN.to_string()),
                    storage_type,
                    true,
                ));
                outputs.push(Output::Constant(bytes));
            }
        }
    }

    let (source, available) = match table {
        Some((_, rows)) => {
            let total = rows.iter().map(RowChunk::num_rows).sum();
            (Source::Table(rows), total)
        }
        None => (Source::SingleRow, 1),
    };
    let remaining = match select.limit {
        Some(limit) => available.min(usize::try_from(limit).unwrap_or(usize::MAX)),
        None => available,
    };

    Ok(LocalRowSet {
        columns,
        outputs,
        source,
        chunk_size: chunk_size.filter(|n| *n > 0).unwrap_or(DEFAULT_CHUNK_ROWS),
        remaining,
        chunk: 0,
        row: 0,
    })
}

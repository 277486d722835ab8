//! Tokenizer for the built-in script language.
//!
//! Produces a flat token stream with explicit `Newline`, `Indent` and
//! `Dedent` tokens so the parser never has to look at whitespace.  Blank and
//! comment-only lines are dropped, newlines inside brackets are ignored
//! (implicit line joining), and a trailing backslash joins physical lines.

use super::fault::{Fault, FaultKind};

/// Deepest block nesting accepted.
const MAX_INDENT: usize = 100;

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),

    // Keywords
    True,
    False,
    None,
    And,
    Or,
    Not,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Is,
    Def,
    Return,
    Break,
    Continue,
    Pass,
    Global,
    Del,
    Import,
    From,

    // Operators
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,

    // Comparison
    Eq, // ==
    Ne, // !=
    Lt,
    Le,
    Gt,
    Ge,

    // Assignment
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    DoubleSlashAssign,
    PercentAssign,
    DoubleStarAssign,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    Semicolon,

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl Token {
    fn keyword(word: &str) -> Option<Token> {
        Some(match word {
            "True" => Token::True,
            "False" => Token::False,
            "None" => Token::None,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "if" => Token::If,
            "elif" => Token::Elif,
            "else" => Token::Else,
            "while" => Token::While,
            "for" => Token::For,
            "in" => Token::In,
            "is" => Token::Is,
            "def" => Token::Def,
            "return" => Token::Return,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "pass" => Token::Pass,
            "global" => Token::Global,
            "del" => Token::Del,
            "import" => Token::Import,
            "from" => Token::From,
            _ => return None,
        })
    }
}

/// A token and the 1-based source line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub tok: Token,
    pub line: usize,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

pub struct Lexer<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    /// Bracket nesting depth; newlines are insignificant while > 0.
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<Spanned>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            depth: 0,
            indents: vec![0],
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if let Some(c) = ch {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
            }
        }
        ch
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn push(&mut self, tok: Token, line: usize) {
        self.tokens.push(Spanned { tok, line });
    }

    fn error(&self, kind: FaultKind, msg: impl Into<String>, line: usize) -> Fault {
        Fault::syntax(kind, msg, line, self.src)
    }

    /// Tokenize the whole source.
    pub fn tokenize(mut self) -> Result<Vec<Spanned>, Fault> {
        let mut at_line_start = true;
        loop {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                if !self.handle_indentation()? {
                    break;
                }
            }
            let Some(ch) = self.peek() else { break };
            match ch {
                ' ' | '\t' | '\x0c' | '\r' => {
                    self.pos += 1;
                }
                '#' => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.pos += 1;
                    }
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                '\\' if self.peek_at(1) == Some('\r') && self.peek_at(2) == Some('\n') => {
                    self.pos += 1;
                    self.advance();
                    self.advance();
                }
                '\n' => {
                    let line = self.line;
                    self.advance();
                    if self.depth == 0 {
                        self.push(Token::Newline, line);
                        at_line_start = true;
                    }
                }
                _ => self.lex_token()?,
            }
        }

        if self.depth > 0 {
            let line = self.line;
            return Err(self.error(FaultKind::SyntaxError, "unexpected EOF while parsing", line));
        }
        let line = self.line;
        if !matches!(self.tokens.last().map(|t| &t.tok), None | Some(Token::Newline)) {
            self.push(Token::Newline, line);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Token::Dedent, line);
        }
        self.push(Token::Eof, line);
        Ok(self.tokens)
    }

    /// Measure leading whitespace of a logical line and emit `Indent`/`Dedent`.
    /// Blank and comment-only lines are consumed whole.  Returns `false` at EOF.
    fn handle_indentation(&mut self) -> Result<bool, Fault> {
        loop {
            let mut width = 0usize;
            while let Some(c) = self.peek() {
                match c {
                    ' ' => width += 1,
                    '\t' => width = (width / 8 + 1) * 8,
                    '\x0c' | '\r' => {}
                    _ => break,
                }
                self.pos += 1;
            }
            match self.peek() {
                None => return Ok(false),
                Some('\n') => {
                    self.advance();
                    continue;
                }
                Some('#') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.pos += 1;
                    }
                    continue;
                }
                Some(_) => {}
            }

            let line = self.line;
            let current = self.indents.last().copied().unwrap_or(0);
            if width > current {
                if self.indents.len() > MAX_INDENT {
                    return Err(self.error(
                        FaultKind::IndentationError,
                        "too many levels of indentation",
                        line,
                    ));
                }
                self.indents.push(width);
                self.push(Token::Indent, line);
            } else if width < current {
                while self.indents.last().is_some_and(|&w| w > width) {
                    self.indents.pop();
                    self.push(Token::Dedent, line);
                }
                if self.indents.last().copied() != Some(width) {
                    return Err(self.error(
                        FaultKind::IndentationError,
                        "unindent does not match any outer indentation level",
                        line,
                    ));
                }
            }
            return Ok(true);
        }
    }

    fn lex_token(&mut self) -> Result<(), Fault> {
        let line = self.line;
        let Some(ch) = self.advance() else { return Ok(()) };
        let tok = match ch {
            '0'..='9' => self.read_number(ch, line)?,
            '.' if matches!(self.peek(), Some('0'..='9')) => self.read_number(ch, line)?,
            '"' | '\'' => self.read_string(ch, line)?,
            c if c == '_' || c.is_alphabetic() => self.read_name(c, line)?,
            '+' => self.with_assign(Token::Plus, Token::PlusAssign),
            '-' => self.with_assign(Token::Minus, Token::MinusAssign),
            '%' => self.with_assign(Token::Percent, Token::PercentAssign),
            '*' => {
                if self.eat('*') {
                    self.with_assign(Token::DoubleStar, Token::DoubleStarAssign)
                } else {
                    self.with_assign(Token::Star, Token::StarAssign)
                }
            }
            '/' => {
                if self.eat('/') {
                    self.with_assign(Token::DoubleSlash, Token::DoubleSlashAssign)
                } else {
                    self.with_assign(Token::Slash, Token::SlashAssign)
                }
            }
            '=' => self.with_assign(Token::Assign, Token::Eq),
            '<' => self.with_assign(Token::Lt, Token::Le),
            '>' => self.with_assign(Token::Gt, Token::Ge),
            '!' => {
                if self.eat('=') {
                    Token::Ne
                } else {
                    return Err(self.error(FaultKind::SyntaxError, "invalid syntax", line));
                }
            }
            '(' | '[' => {
                self.depth += 1;
                if ch == '(' {
                    Token::LParen
                } else {
                    Token::LBracket
                }
            }
            ')' | ']' => {
                if self.depth == 0 {
                    return Err(self.error(
                        FaultKind::SyntaxError,
                        format!("unmatched '{ch}'"),
                        line,
                    ));
                }
                self.depth -= 1;
                if ch == ')' {
                    Token::RParen
                } else {
                    Token::RBracket
                }
            }
            ',' => Token::Comma,
            ':' => Token::Colon,
            '.' => Token::Dot,
            ';' => Token::Semicolon,
            c => {
                return Err(self.error(
                    FaultKind::SyntaxError,
                    format!("invalid character '{c}' (U+{:04X})", c as u32),
                    line,
                ))
            }
        };
        self.push(tok, line);
        Ok(())
    }

    fn with_assign(&mut self, plain: Token, assign: Token) -> Token {
        if self.eat('=') {
            assign
        } else {
            plain
        }
    }

    fn read_digits(&mut self, s: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                s.push(c);
            } else if c != '_' {
                break;
            }
            self.pos += 1;
        }
    }

    fn read_number(&mut self, first: char, line: usize) -> Result<Token, Fault> {
        let mut s = String::new();
        s.push(first);
        let mut is_float = first == '.';
        self.read_digits(&mut s);
        if !is_float && self.peek() == Some('.') && !matches!(self.peek_at(1), Some('.')) {
            is_float = true;
            s.push('.');
            self.pos += 1;
            self.read_digits(&mut s);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if matches!(self.peek_at(digit_at), Some('0'..='9')) {
                is_float = true;
                s.push('e');
                self.pos += 1;
                if sign {
                    s.push(self.chars[self.pos]);
                    self.pos += 1;
                }
                self.read_digits(&mut s);
            }
        }
        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(self.error(FaultKind::SyntaxError, "invalid decimal literal", line));
        }

        if is_float {
            s.parse()
                .map(Token::Float)
                .map_err(|_| self.error(FaultKind::SyntaxError, "invalid decimal literal", line))
        } else {
            s.parse().map(Token::Int).map_err(|_| {
                self.error(FaultKind::SyntaxError, "integer literal is too large", line)
            })
        }
    }

    fn read_string(&mut self, quote: char, line: usize) -> Result<Token, Fault> {
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.pos += 2;
        }
        let mut s = String::new();
        loop {
            let Some(c) = self.advance() else {
                let msg = if triple {
                    format!("unterminated triple-quoted string literal (detected at line {})", self.line)
                } else {
                    format!("unterminated string literal (detected at line {line})")
                };
                return Err(self.error(FaultKind::SyntaxError, msg, line));
            };
            match c {
                '\n' if !triple => {
                    return Err(self.error(
                        FaultKind::SyntaxError,
                        format!("unterminated string literal (detected at line {line})"),
                        line,
                    ));
                }
                '\\' => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some('\\') => s.push('\\'),
                    Some('\'') => s.push('\''),
                    Some('"') => s.push('"'),
                    Some('\n') => {}
                    Some(other) => {
                        s.push('\\');
                        s.push(other);
                    }
                    None => {}
                },
                c if c == quote => {
                    if !triple {
                        break;
                    }
                    if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                        self.pos += 2;
                        break;
                    }
                    s.push(c);
                }
                c => s.push(c),
            }
        }
        Ok(Token::Str(s))
    }

    fn read_name(&mut self, first: char, line: usize) -> Result<Token, Fault> {
        let mut s = String::new();
        s.push(first);
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                s.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        // String prefixes the language does not support.
        if matches!(self.peek(), Some('"' | '\''))
            && matches!(s.to_ascii_lowercase().as_str(), "f" | "r" | "b" | "rb" | "br" | "fr" | "rf")
        {
            return Err(self.error(
                FaultKind::SyntaxError,
                format!("string prefix '{s}' is not supported"),
                line,
            ));
        }
        Ok(Token::keyword(&s).unwrap_or(Token::Name(s)))
    }
}

/// Tokenize `src`.
pub fn tokenize(src: &str) -> Result<Vec<Spanned>, Fault> {
    Lexer::new(src).tokenize()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

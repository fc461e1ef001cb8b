use lazy_static::lazy_static;
use regex::Regex;

use crate::{errors::errors::{Error, ErrorImpl}, Position, Span, MK_DEFAULT_HANDLER, MK_TOKEN};

use super::tokens::{Token, TokenKind, RESERVED_LOOKUP};

pub type RegexHandler = fn(&mut Lexer, &Regex);

pub struct RegexPattern {
    regex: Regex,
    handler: RegexHandler,
}

lazy_static! {
    static ref PATTERNS: Vec<RegexPattern> = vec![
        RegexPattern { regex: Regex::new("^\\\\\\r?\\n").unwrap(), handler: continuation_handler },
        RegexPattern { regex: Regex::new("^\\r?\\n").unwrap(), handler: newline_handler },
        RegexPattern { regex: Regex::new("^[ \\t\\x0C]+").unwrap(), handler: skip_handler },
        RegexPattern { regex: Regex::new("^#[^\\n]*").unwrap(), handler: skip_handler },
        RegexPattern {
            regex: Regex::new(r#"^(?i:rb|br|r|b|u|f|rf|fr)?("""(?s:.*?)"""|'''(?s:.*?)'''|"(?:\\.|[^"\\\n])*"|'(?:\\.|[^'\\\n])*')"#).unwrap(),
            handler: string_handler,
        },
        RegexPattern { regex: Regex::new("^[\\p{L}_][\\p{L}\\p{N}_]*").unwrap(), handler: symbol_handler },
        RegexPattern {
            regex: Regex::new("^(0[xX][0-9a-fA-F_]+|0[oO][0-7_]+|0[bB][01_]+|([0-9][0-9_]*)?\\.[0-9][0-9_]*([eE][+-]?[0-9]+)?|[0-9][0-9_]*\\.([eE][+-]?[0-9]+)?|[0-9][0-9_]*[eE][+-]?[0-9]+|[0-9][0-9_]*)[jJlL]?").unwrap(),
            handler: number_handler,
        },
        RegexPattern { regex: Regex::new("^[\\[\\](){}]").unwrap(), handler: bracket_handler },
        RegexPattern { regex: Regex::new("^\\.\\.\\.").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Ellipsis, "...") },
        RegexPattern { regex: Regex::new("^\\*\\*=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::PowerEquals, "**=") },
        RegexPattern { regex: Regex::new("^//=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::DoubleSlashEquals, "//=") },
        RegexPattern { regex: Regex::new("^<<=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::ShiftLeftEquals, "<<=") },
        RegexPattern { regex: Regex::new("^>>=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::ShiftRightEquals, ">>=") },
        RegexPattern { regex: Regex::new("^\\*\\*").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::DoubleStar, "**") },
        RegexPattern { regex: Regex::new("^//").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::DoubleSlash, "//") },
        RegexPattern { regex: Regex::new("^<<").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::ShiftLeft, "<<") },
        RegexPattern { regex: Regex::new("^>>").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::ShiftRight, ">>") },
        RegexPattern { regex: Regex::new("^==").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Equals, "==") },
        RegexPattern { regex: Regex::new("^!=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::NotEquals, "!=") },
        RegexPattern { regex: Regex::new("^<=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::LessEquals, "<=") },
        RegexPattern { regex: Regex::new("^>=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::GreaterEquals, ">=") },
        RegexPattern { regex: Regex::new("^->").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Arrow, "->") },
        RegexPattern { regex: Regex::new("^\\+=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::PlusEquals, "+=") },
        RegexPattern { regex: Regex::new("^-=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::MinusEquals, "-=") },
        RegexPattern { regex: Regex::new("^\\*=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::StarEquals, "*=") },
        RegexPattern { regex: Regex::new("^/=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::SlashEquals, "/=") },
        RegexPattern { regex: Regex::new("^%=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::PercentEquals, "%=") },
        RegexPattern { regex: Regex::new("^&=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::AmpersandEquals, "&=") },
        RegexPattern { regex: Regex::new("^\\|=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::PipeEquals, "|=") },
        RegexPattern { regex: Regex::new("^\\^=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::CaretEquals, "^=") },
        RegexPattern { regex: Regex::new("^<").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Less, "<") },
        RegexPattern { regex: Regex::new("^>").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Greater, ">") },
        RegexPattern { regex: Regex::new("^=").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Assignment, "=") },
        RegexPattern { regex: Regex::new("^\\.").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Dot, ".") },
        RegexPattern { regex: Regex::new("^;").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Semicolon, ";") },
        RegexPattern { regex: Regex::new("^:").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Colon, ":") },
        RegexPattern { regex: Regex::new("^,").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Comma, ",") },
        RegexPattern { regex: Regex::new("^@").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::At, "@") },
        RegexPattern { regex: Regex::new("^\\+").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Plus, "+") },
        RegexPattern { regex: Regex::new("^-").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Dash, "-") },
        RegexPattern { regex: Regex::new("^\\*").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Star, "*") },
        RegexPattern { regex: Regex::new("^/").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Slash, "/") },
        RegexPattern { regex: Regex::new("^%").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Percent, "%") },
        RegexPattern { regex: Regex::new("^&").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Ampersand, "&") },
        RegexPattern { regex: Regex::new("^\\|").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Pipe, "|") },
        RegexPattern { regex: Regex::new("^\\^").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Caret, "^") },
        RegexPattern { regex: Regex::new("^~").unwrap(), handler: MK_DEFAULT_HANDLER!(TokenKind::Tilde, "~") },
    ];
}

pub struct Lexer {
    tokens: Vec<Token>,
    source: String,
    pos: usize,
    line: u32,
    line_start: usize,
    /// Open brackets; newlines and indentation inside them are not significant.
    depth: u32,
    at_line_start: bool,
    indents: Vec<usize>,
}

impl Lexer {
    pub fn new(source: String) -> Lexer {
        Lexer {
            tokens: vec![],
            source,
            pos: 0,
            line: 1,
            line_start: 0,
            depth: 0,
            at_line_start: true,
            indents: vec![0],
        }
    }

    pub fn advance_n(&mut self, n: usize) {
        self.pos += n;
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, (self.pos - self.line_start) as u32, self.pos as u32)
    }

    /// Span of the next `len` bytes, which must not contain a newline.
    pub fn span_for(&self, len: usize) -> Span {
        let start = self.position();
        Span {
            start,
            end: Position::new(start.line, start.column + len as u32, start.offset + len as u32),
        }
    }

    pub fn at(&self) -> char {
        self.remainder().chars().next().unwrap_or('\0')
    }

    pub fn remainder(&self) -> &str {
        &self.source[self.pos..]
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn last_kind(&self) -> Option<TokenKind> {
        self.tokens.last().map(|token| token.kind)
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.line_start = self.pos;
    }

    /// Measures the indentation of a logical line start and emits
    /// `Indent`/`Dedent` tokens. Blank and comment-only lines are skipped.
    fn handle_indentation(&mut self) -> Result<(), Error> {
        let mut width = 0;
        let mut length = 0;
        for ch in self.remainder().chars() {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0C' => width = 0,
                _ => break,
            }
            length += 1;
        }

        let rest = &self.remainder()[length..];
        if rest.is_empty() || rest.starts_with('\n') || rest.starts_with("\r\n") || rest.starts_with('#') {
            self.advance_n(length);
            return Ok(());
        }

        self.at_line_start = false;
        let current = *self.indents.last().unwrap_or(&0);

        if width > current {
            self.indents.push(width);
            let span = Span::new(self.position(), self.position());
            self.push(MK_TOKEN!(TokenKind::Indent, String::new(), span));
        } else {
            while width < *self.indents.last().unwrap_or(&0) {
                self.indents.pop();
                let span = Span::new(self.position(), self.position());
                self.push(MK_TOKEN!(TokenKind::Dedent, String::new(), span));
            }

            if width != *self.indents.last().unwrap_or(&0) {
                return Err(Error::new(ErrorImpl::InconsistentIndentation, self.position()));
            }
        }

        self.advance_n(length);
        Ok(())
    }
}

fn newline_handler(lexer: &mut Lexer, regex: &Regex) {
    let matched = regex.find(lexer.remainder()).map_or(1, |m| m.end());

    if lexer.depth == 0 && !matches!(lexer.last_kind(), None | Some(TokenKind::Newline)) {
        let span = lexer.span_for(matched);
        lexer.push(MK_TOKEN!(TokenKind::Newline, String::from("\n"), span));
    }

    lexer.advance_n(matched);
    lexer.new_line();
    lexer.at_line_start = lexer.depth == 0;
}

fn continuation_handler(lexer: &mut Lexer, regex: &Regex) {
    let matched = regex.find(lexer.remainder()).map_or(2, |m| m.end());
    lexer.advance_n(matched);
    lexer.new_line();
}

fn skip_handler(lexer: &mut Lexer, regex: &Regex) {
    let matched = regex.find(lexer.remainder()).map_or(1, |m| m.end());
    lexer.advance_n(matched);
}

fn bracket_handler(lexer: &mut Lexer, _regex: &Regex) {
    let kind = match lexer.at() {
        '[' => TokenKind::OpenBracket,
        ']' => TokenKind::CloseBracket,
        '(' => TokenKind::OpenParen,
        ')' => TokenKind::CloseParen,
        '{' => TokenKind::OpenCurly,
        _ => TokenKind::CloseCurly,
    };

    match kind {
        TokenKind::OpenBracket | TokenKind::OpenParen | TokenKind::OpenCurly => lexer.depth += 1,
        _ => lexer.depth = lexer.depth.saturating_sub(1),
    }

    let span = lexer.span_for(1);
    lexer.push(MK_TOKEN!(kind, lexer.at().to_string(), span));
    lexer.advance_n(1);
}

fn number_handler(lexer: &mut Lexer, regex: &Regex) {
    let Some(matched) = regex.find(lexer.remainder()) else {
        return;
    };
    let text = matched.as_str().to_string();

    let is_hex = text.starts_with("0x") || text.starts_with("0X");
    let kind = if text.contains('.') || text.ends_with('j') || text.ends_with('J') || (!is_hex && text.contains(['e', 'E'])) {
        TokenKind::Float
    } else {
        TokenKind::Number
    };

    let span = lexer.span_for(text.len());
    lexer.advance_n(text.len());
    lexer.push(MK_TOKEN!(kind, text.trim_end_matches(['l', 'L']).replace('_', ""), span));
}

fn string_handler(lexer: &mut Lexer, regex: &Regex) {
    let Some(matched) = regex.find(lexer.remainder()) else {
        return;
    };
    let text = matched.as_str().to_string();

    let prefix_len = text.find(['"', '\'']).unwrap_or(0);
    let prefix = text[..prefix_len].to_ascii_lowercase();
    let quote_len = if text[prefix_len..].starts_with("\"\"\"") || text[prefix_len..].starts_with("'''") {
        3
    } else {
        1
    };
    let body = &text[prefix_len + quote_len..text.len() - quote_len];

    let value = if prefix.contains('r') { body.to_string() } else { unescape(body) };
    let kind = if prefix.contains('b') { TokenKind::Bytes } else { TokenKind::String };

    let start = lexer.position();
    for (index, ch) in text.char_indices() {
        if ch == '\n' {
            lexer.line += 1;
            lexer.line_start = lexer.pos + index + 1;
        }
    }
    lexer.advance_n(text.len());

    let span = Span::new(start, lexer.position());
    lexer.push(MK_TOKEN!(kind, value, span));
}

fn unescape(string_literal: &str) -> String {
    let mut result = String::new();
    let mut chars = string_literal.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }

        match chars.peek() {
            Some('n') => {
                result.push('\n');
                chars.next();
            }
            Some('t') => {
                result.push('\t');
                chars.next();
            }
            Some('r') => {
                result.push('\r');
                chars.next();
            }
            Some('0') => {
                result.push('\0');
                chars.next();
            }
            Some(quote @ ('\\' | '"' | '\'')) => {
                result.push(*quote);
                chars.next();
            }
            Some('\n') => {
                chars.next();
            }
            Some('x') => {
                chars.next();
                let mut hex = String::new();

                for _ in 0..2 {
                    match chars.peek() {
                        Some(ch) if ch.is_ascii_hexdigit() => {
                            hex.push(*ch);
                            chars.next();
                        }
                        _ => break,
                    }
                }

                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => result.push(decoded),
                    None => {
                        result.push_str("\\x");
                        result.push_str(&hex);
                    }
                }
            }
            // Unknown escapes keep their backslash.
            _ => result.push(ch),
        }
    }

    result
}

fn symbol_handler(lexer: &mut Lexer, regex: &Regex) {
    let Some(value) = regex.find(lexer.remainder()) else {
        return;
    };
    let value = value.as_str().to_string();
    let span = lexer.span_for(value.len());

    if let Some(kind) = RESERVED_LOOKUP.get(value.as_str()) {
        lexer.push(MK_TOKEN!(*kind, value.clone(), span));
    } else {
        lexer.push(MK_TOKEN!(TokenKind::Identifier, value.clone(), span));
    }

    lexer.advance_n(value.len());
}

/// Splits `source` into tokens, including the layout tokens
/// `Newline`, `Indent` and `Dedent`.
///
/// Every stream ends with a `Newline` (unless empty), the dedents that close
/// all open blocks, and a final `EOF`.
pub fn tokenize(source: String) -> Result<Vec<Token>, Error> {
    let mut lex = Lexer::new(source);

    while !lex.at_eof() {
        if lex.at_line_start && lex.depth == 0 {
            lex.handle_indentation()?;
            if lex.at_eof() || lex.at_line_start && !lex.remainder().starts_with(['\n', '\r', '#']) {
                continue;
            }
        }

        let mut matched = false;

        for pattern in PATTERNS.iter() {
            if pattern.regex.is_match(lex.remainder()) {
                (pattern.handler)(&mut lex, &pattern.regex);
                matched = true;
                break;
            }
        }

        if !matched {
            return Err(Error::new(ErrorImpl::UnrecognisedToken { token: lex.at().to_string() }, lex.position()));
        }
    }

    if !matches!(lex.last_kind(), None | Some(TokenKind::Newline)) {
        let span = Span::new(lex.position(), lex.position());
        lex.push(MK_TOKEN!(TokenKind::Newline, String::from("\n"), span));
    }

    while lex.indents.len() > 1 {
        lex.indents.pop();
        let span = Span::new(lex.position(), lex.position());
        lex.push(MK_TOKEN!(TokenKind::Dedent, String::new(), span));
    }

    let span = Span::new(lex.position(), lex.position());
    lex.push(MK_TOKEN!(TokenKind::EOF, String::from("EOF"), span));
    Ok(lex.tokens)
}

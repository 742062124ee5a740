use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    And,
    Class,
    Else,
    False,
    Fun,
    For,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    Error,
    Eof,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A token borrowed from the source buffer.
///
/// For [`TokenType::Error`] the lexeme is the error message rather than a
/// slice of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub token_type: TokenType,
    pub lexeme: &'a str,
    pub line: usize,
}

pub struct Tokenizer<'a> {
    source: &'a str,
    start: usize,
    current: usize,
    line: usize,
    finished: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
            finished: false,
        }
    }

    /// Scans the next token. Once the end of input is reached every further
    /// call returns another [`TokenType::Eof`].
    pub fn token(&mut self) -> Token<'a> {
        self.skip_whitespace();
        self.start = self.current;

        let Some(c) = self.advance() else {
            return self.make(TokenType::Eof);
        };

        match c {
            b'(' => self.make(TokenType::LeftParen),
            b')' => self.make(TokenType::RightParen),
            b'{' => self.make(TokenType::LeftBrace),
            b'}' => self.make(TokenType::RightBrace),
            b';' => self.make(TokenType::Semicolon),
            b',' => self.make(TokenType::Comma),
            b'.' => self.make(TokenType::Dot),
            b'-' => self.make(TokenType::Minus),
            b'+' => self.make(TokenType::Plus),
            b'/' => self.make(TokenType::Slash),
            b'*' => self.make(TokenType::Star),
            b'!' => self.make_if_next(b'=', TokenType::BangEqual, TokenType::Bang),
            b'=' => self.make_if_next(b'=', TokenType::EqualEqual, TokenType::Equal),
            b'<' => self.make_if_next(b'=', TokenType::LessEqual, TokenType::Less),
            b'>' => self.make_if_next(b'=', TokenType::GreaterEqual, TokenType::Greater),
            b'\'' | b'"' => self.string(c),
            c if c.is_ascii_digit() => self.number(),
            c if is_alpha(c) => self.identifier(),
            _ => {
                // Keep the cursor on a char boundary so lexemes stay valid str slices.
                while !self.source.is_char_boundary(self.current) {
                    self.current += 1;
                }
                self.error("Unexpected character.")
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.current += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                b' ' | b'\r' | b'\t' => {
                    self.current += 1;
                }
                b'\n' => {
                    self.line += 1;
                    self.current += 1;
                }
                b'/' if self.peek_next() == Some(b'/') => {
                    while self.peek().is_some_and(|c| c != b'\n') {
                        self.current += 1;
                    }
                }
                _ => return,
            }
        }
    }

    fn make(&self, token_type: TokenType) -> Token<'a> {
        Token {
            token_type,
            lexeme: &self.source[self.start..self.current],
            line: self.line,
        }
    }

    fn make_if_next(&mut self, expected: u8, matched: TokenType, otherwise: TokenType) -> Token<'a> {
        if self.peek() == Some(expected) {
            self.current += 1;
            self.make(matched)
        } else {
            self.make(otherwise)
        }
    }

    fn error(&self, message: &'static str) -> Token<'a> {
        Token {
            token_type: TokenType::Error,
            lexeme: message,
            line: self.line,
        }
    }

    fn string(&mut self, quote: u8) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c == quote {
                break;
            }
            if c == b'\n' {
                self.line += 1;
            }
            self.current += 1;
        }

        if self.peek().is_none() {
            return self.error("Unterminated string.");
        }

        // The closing quote.
        self.current += 1;
        self.make(TokenType::String)
    }

    fn number(&mut self) -> Token<'a> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.current += 1;
        }

        if self.peek() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.current += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.current += 1;
            }
        }

        self.make(TokenType::Number)
    }

    fn identifier(&mut self) -> Token<'a> {
        while self.peek().is_some_and(|c| is_alpha(c) || c.is_ascii_digit()) {
            self.current += 1;
        }
        let token_type = keyword(&self.source[self.start..self.current]);
        self.make(token_type)
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    /// Yields every token up to and including the first `Eof`, then `None`.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let token = self.token();
        if token.token_type == TokenType::Eof {
            self.finished = true;
        }
        Some(token)
    }
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn keyword(lexeme: &str) -> TokenType {
    match lexeme {
        "and" => TokenType::And,
        "class" => TokenType::Class,
        "else" => TokenType::Else,
        "false" => TokenType::False,
        "for" => TokenType::For,
        "fun" => TokenType::Fun,
        "if" => TokenType::If,
        "nil" => TokenType::Nil,
        "or" => TokenType::Or,
        "print" => TokenType::Print,
        "return" => TokenType::Return,
        "super" => TokenType::Super,
        "this" => TokenType::This,
        "true" => TokenType::True,
        "var" => TokenType::Var,
        "while" => TokenType::While,
        _ => TokenType::Identifier,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn token_types(source: &str) -> Vec<TokenType> {
        Tokenizer::new(source).map(|t| t.token_type).collect()
    }

    #[test]
    fn test_tokens() {
        let source = "var x = 1;";
        let expected = vec![
            TokenType::Var,
            TokenType::Identifier,
            TokenType::Equal,
            TokenType::Number,
            TokenType::Semicolon,
            TokenType::Eof,
        ];
        assert_eq!(token_types(source), expected);
    }

    #[test]
    fn test_tokens_with_comments() {
        let source = "var x = 1; // comment\nprint x;";
        let tokens: Vec<_> = Tokenizer::new(source).collect();
        assert_eq!(tokens.len(), 9);
        assert_eq!(tokens[5].token_type, TokenType::Print);
        assert_eq!(tokens[5].line, 2);
    }

    #[test]
    fn test_compound_operators() {
        let source = "! != = == < <= > >=";
        let expected = vec![
            TokenType::Bang,
            TokenType::BangEqual,
            TokenType::Equal,
            TokenType::EqualEqual,
            TokenType::Less,
            TokenType::LessEqual,
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Eof,
        ];
        assert_eq!(token_types(source), expected);
    }

    #[test]
    fn test_double_equal() {
        let tokens: Vec<_> = Tokenizer::new("a==b").collect();
        let lexemes: Vec<_> = tokens.iter().map(|t| t.lexeme).collect();
        assert_eq!(lexemes, vec!["a", "==", "b", ""]);
        assert_eq!(tokens[1].token_type, TokenType::EqualEqual);
    }

    #[test]
    fn test_keywords_need_exact_match() {
        let source = "and andy class classy nil nil_ orchid or this";
        let expected = vec![
            TokenType::And,
            TokenType::Identifier,
            TokenType::Class,
            TokenType::Identifier,
            TokenType::Nil,
            TokenType::Identifier,
            TokenType::Identifier,
            TokenType::Or,
            TokenType::This,
            TokenType::Eof,
        ];
        assert_eq!(token_types(source), expected);
    }

    #[test]
    fn test_numbers() {
        let tokens: Vec<_> = Tokenizer::new("12 3.25 4. .5").collect();
        let lexemes: Vec<_> = tokens.iter().map(|t| (t.token_type, t.lexeme)).collect();
        assert_eq!(
            lexemes,
            vec![
                (TokenType::Number, "12"),
                (TokenType::Number, "3.25"),
                (TokenType::Number, "4"),
                (TokenType::Dot, "."),
                (TokenType::Dot, "."),
                (TokenType::Number, "5"),
                (TokenType::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_multiline_string_counts_lines() {
        let tokens: Vec<_> = Tokenizer::new("'a\nb\nc' x").collect();
        assert_eq!(tokens[0].token_type, TokenType::String);
        assert_eq!(tokens[0].lexeme, "'a\nb\nc'");
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn test_string_keeps_escapes_raw() {
        let token = Tokenizer::new(r#""a\nb""#).token();
        assert_eq!(token.token_type, TokenType::String);
        assert_eq!(token.lexeme, r#""a\nb""#);
    }

    #[test]
    fn test_unterminated_string() {
        let token = Tokenizer::new("'never closed").token();
        assert_eq!(token.token_type, TokenType::Error);
        assert_eq!(token.lexeme, "Unterminated string.");
    }

    #[test]
    fn test_unexpected_character() {
        let tokens: Vec<_> = Tokenizer::new("@ é 1").collect();
        assert_eq!(tokens[0].token_type, TokenType::Error);
        assert_eq!(tokens[0].lexeme, "Unexpected character.");
        assert_eq!(tokens[1].token_type, TokenType::Error);
        assert_eq!(tokens[2].token_type, TokenType::Number);
    }

    #[test]
    fn test_iterator_stops_after_eof() {
        let mut tokenizer = Tokenizer::new("");
        assert_eq!(tokenizer.next().map(|t| t.token_type), Some(TokenType::Eof));
        assert_eq!(tokenizer.next(), None);
        assert_eq!(tokenizer.token().token_type, TokenType::Eof);
    }
}

use std::fmt::Display;

use tracing::debug;

use crate::{
    bytecode::{Chunk, OpCode},
    object::Heap,
    tokenizer::{Token, TokenType, Tokenizer},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn higher(&self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

/// Where in the source a diagnostic points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    EndOfFile,
    Lexeme(String),
    /// Scanner errors, whose message already says what went wrong.
    Unspecified,
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::EndOfFile => write!(f, " at end of file"),
            Location::Lexeme(lexeme) => write!(f, " at '{}'", lexeme),
            Location::Unspecified => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[line {line}] Error{location}: {message}")]
pub struct Diagnostic {
    pub line: usize,
    pub location: Location,
    pub message: String,
}

/// Every diagnostic reported while compiling one unit of source.
#[derive(Debug)]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

impl std::error::Error for CompileError {}

impl Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

/// Compiles `source` into a chunk, interning string literals and global names
/// into `heap`.
pub fn compile(source: &str, heap: &mut Heap) -> Result<Chunk, CompileError> {
    let compiler = Compiler::new(Tokenizer::new(source), heap);
    compiler.compile()
}

type ParseFn<'src, 'h> = fn(&mut Compiler<'src, 'h>, bool);

struct ParseRule<'src, 'h> {
    prefix: Option<ParseFn<'src, 'h>>,
    infix: Option<ParseFn<'src, 'h>>,
    precedence: Precedence,
}

struct Compiler<'src, 'h> {
    tokenizer: Tokenizer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    chunk: Chunk,
    heap: &'h mut Heap,
    diagnostics: Vec<Diagnostic>,
}

impl<'src, 'h> Compiler<'src, 'h> {
    fn new(tokenizer: Tokenizer<'src>, heap: &'h mut Heap) -> Self {
        // Replaced by the first call to `advance`.
        let placeholder = Token {
            token_type: TokenType::Eof,
            lexeme: "",
            line: 0,
        };
        Self {
            tokenizer,
            current: placeholder,
            previous: placeholder,
            had_error: false,
            panic_mode: false,
            chunk: Chunk::new(),
            heap,
            diagnostics: Vec::new(),
        }
    }

    fn compile(mut self) -> Result<Chunk, CompileError> {
        self.advance();
        while !self.matches(TokenType::Eof) {
            self.declaration();
        }
        self.end();

        if self.had_error {
            Err(CompileError {
                diagnostics: self.diagnostics,
            })
        } else {
            #[cfg(feature = "disassemble")]
            debug!("\n{}", self.chunk.disassemble("code", self.heap));
            Ok(self.chunk)
        }
    }

    fn end(&mut self) {
        self.emit_byte(OpCode::Return);
    }

    // Token handling

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.tokenizer.token();
            if self.current.token_type != TokenType::Error {
                break;
            }
            self.error_at(self.current, self.current.lexeme);
        }
    }

    fn consume(&mut self, token_type: TokenType, message: &str) {
        if self.current.token_type == token_type {
            self.advance();
            return;
        }
        self.error_at(self.current, message);
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current.token_type == token_type
    }

    fn matches(&mut self, token_type: TokenType) -> bool {
        if !self.check(token_type) {
            return false;
        }
        self.advance();
        true
    }

    // Diagnostics

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at(&mut self, token: Token<'_>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;

        let location = match token.token_type {
            TokenType::Eof => Location::EndOfFile,
            TokenType::Error => Location::Unspecified,
            _ => Location::Lexeme(token.lexeme.to_string()),
        };
        let diagnostic = Diagnostic {
            line: token.line,
            location,
            message: message.to_string(),
        };
        debug!(%diagnostic, "compile error");
        self.diagnostics.push(diagnostic);
    }

    /// Leaves panic mode and skips tokens until just past a semicolon or just
    /// before a token that starts a statement.
    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.token_type != TokenType::Eof {
            if self.previous.token_type == TokenType::Semicolon {
                return;
            }
            match self.current.token_type {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // Emission

    fn emit_byte(&mut self, byte: impl Into<u8>) {
        self.chunk.add_bytecode(byte, self.previous.line);
    }

    fn emit_bytes(&mut self, first: impl Into<u8>, second: impl Into<u8>) {
        self.emit_byte(first);
        self.emit_byte(second);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.chunk.add_constant(value) {
            Ok(index) => index,
            Err(e) => {
                self.error(&e.to_string());
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_bytes(OpCode::Constant, index);
    }

    fn identifier_constant(&mut self, name: Token<'_>) -> u8 {
        let name = self.heap.intern(name.lexeme);
        self.make_constant(Value::Object(name))
    }

    // Declarations and statements

    fn declaration(&mut self) {
        if self.matches(TokenType::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        self.consume(TokenType::Identifier, "Expect variable name.");
        let global = self.identifier_constant(self.previous);

        if self.matches(TokenType::Equal) {
            self.expression();
        } else {
            self.emit_byte(OpCode::Nil);
        }
        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        );

        self.emit_bytes(OpCode::DefineGlobal, global);
    }

    fn statement(&mut self) {
        if self.matches(TokenType::Print) {
            self.print_statement();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after value.");
        self.emit_byte(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expect ';' after expression.");
        self.emit_byte(OpCode::Pop);
    }

    // Expressions

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = Self::rule(self.previous.token_type).prefix else {
            self.error("Expect expression.");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= Self::rule(self.current.token_type).precedence {
            self.advance();
            match Self::rule(self.previous.token_type).infix {
                Some(infix) => infix(self, can_assign),
                None => self.error("Expect expression."),
            }
        }

        if can_assign && self.matches(TokenType::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenType::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.token_type;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenType::Minus => self.emit_byte(OpCode::Negate),
            TokenType::Bang => self.emit_byte(OpCode::Not),
            _ => unreachable!("unary called for {operator}"),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.token_type;
        let precedence = Self::rule(operator).precedence;
        self.parse_precedence(precedence.higher());

        match operator {
            TokenType::Plus => self.emit_byte(OpCode::Add),
            TokenType::Minus => self.emit_byte(OpCode::Subtract),
            TokenType::Star => self.emit_byte(OpCode::Multiply),
            TokenType::Slash => self.emit_byte(OpCode::Divide),
            TokenType::BangEqual => self.emit_bytes(OpCode::Equal, OpCode::Not),
            TokenType::EqualEqual => self.emit_byte(OpCode::Equal),
            TokenType::Greater => self.emit_byte(OpCode::Greater),
            TokenType::GreaterEqual => self.emit_bytes(OpCode::Less, OpCode::Not),
            TokenType::Less => self.emit_byte(OpCode::Less),
            TokenType::LessEqual => self.emit_bytes(OpCode::Greater, OpCode::Not),
            _ => unreachable!("binary called for {operator}"),
        }
    }

    fn number(&mut self, _can_assign: bool) {
        match self.previous.lexeme.parse::<f64>() {
            Ok(number) => self.emit_constant(Value::Number(number)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    fn string(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme;
        let string = self.heap.intern(&lexeme[1..lexeme.len() - 1]);
        self.emit_constant(Value::Object(string));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.token_type {
            TokenType::True => self.emit_byte(OpCode::True),
            TokenType::False => self.emit_byte(OpCode::False),
            TokenType::Nil => self.emit_byte(OpCode::Nil),
            t => unreachable!("literal called for {t}"),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let global = self.identifier_constant(self.previous);

        if can_assign && self.matches(TokenType::Equal) {
            self.expression();
            self.emit_bytes(OpCode::SetGlobal, global);
        } else {
            self.emit_bytes(OpCode::GetGlobal, global);
        }
    }

    fn rule(token_type: TokenType) -> ParseRule<'src, 'h> {
        let (prefix, infix, precedence): (
            Option<ParseFn<'src, 'h>>,
            Option<ParseFn<'src, 'h>>,
            Precedence,
        ) = match token_type {
            TokenType::LeftParen => (Some(Self::grouping), None, Precedence::None),
            TokenType::Minus => (Some(Self::unary), Some(Self::binary), Precedence::Term),
            TokenType::Plus => (None, Some(Self::binary), Precedence::Term),
            TokenType::Slash | TokenType::Star => (None, Some(Self::binary), Precedence::Factor),
            TokenType::Bang => (Some(Self::unary), None, Precedence::None),
            TokenType::BangEqual | TokenType::EqualEqual => {
                (None, Some(Self::binary), Precedence::Equality)
            }
            TokenType::Greater
            | TokenType::GreaterEqual
            | TokenType::Less
            | TokenType::LessEqual => (None, Some(Self::binary), Precedence::Comparison),
            TokenType::Identifier => (Some(Self::variable), None, Precedence::None),
            TokenType::String => (Some(Self::string), None, Precedence::None),
            TokenType::Number => (Some(Self::number), None, Precedence::None),
            TokenType::False | TokenType::True | TokenType::Nil => {
                (Some(Self::literal), None, Precedence::None)
            }
            TokenType::RightParen
            | TokenType::LeftBrace
            | TokenType::RightBrace
            | TokenType::Comma
            | TokenType::Dot
            | TokenType::Semicolon
            | TokenType::Equal
            | TokenType::And
            | TokenType::Class
            | TokenType::Else
            | TokenType::Fun
            | TokenType::For
            | TokenType::If
            | TokenType::Or
            | TokenType::Print
            | TokenType::Return
            | TokenType::Super
            | TokenType::This
            | TokenType::Var
            | TokenType::While
            | TokenType::Error
            | TokenType::Eof => (None, None, Precedence::None),
        };

        ParseRule {
            prefix,
            infix,
            precedence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(source: &str) -> (Chunk, Heap) {
        let mut heap = Heap::new();
        let chunk = compile(source, &mut heap).unwrap();
        (chunk, heap)
    }

    fn diagnostics(source: &str) -> Vec<String> {
        let mut heap = Heap::new();
        compile(source, &mut heap)
            .unwrap_err()
            .diagnostics
            .iter()
            .map(|d| d.to_string())
            .collect()
    }

    fn ops(ops: &[OpCode]) -> Vec<u8> {
        ops.iter().map(|op| *op as u8).collect()
    }

    #[test]
    fn test_compile() {
        let (chunk, _) = compile_ok("1 + 2 * 3 - 4 / 5;");
        let expected = vec![
            OpCode::Constant as u8,
            0,
            OpCode::Constant as u8,
            1,
            OpCode::Constant as u8,
            2,
            OpCode::Multiply as u8,
            OpCode::Add as u8,
            OpCode::Constant as u8,
            3,
            OpCode::Constant as u8,
            4,
            OpCode::Divide as u8,
            OpCode::Subtract as u8,
            OpCode::Pop as u8,
            OpCode::Return as u8,
        ];
        assert_eq!(chunk.code(), expected.as_slice());
    }

    #[test]
    fn test_greater_equal_is_less_not() {
        let (chunk, _) = compile_ok("2 >= 1;");
        let mut expected = vec![OpCode::Constant as u8, 0, OpCode::Constant as u8, 1];
        expected.extend(ops(&[OpCode::Less, OpCode::Not, OpCode::Pop, OpCode::Return]));
        assert_eq!(chunk.code(), expected.as_slice());
    }

    #[test]
    fn test_synthesized_comparisons() {
        let (chunk, _) = compile_ok("true != false; nil <= nil;");
        let mut expected = ops(&[OpCode::True, OpCode::False, OpCode::Equal, OpCode::Not]);
        expected.extend(ops(&[OpCode::Pop, OpCode::Nil, OpCode::Nil]));
        expected.extend(ops(&[OpCode::Greater, OpCode::Not, OpCode::Pop, OpCode::Return]));
        assert_eq!(chunk.code(), expected.as_slice());
    }

    #[test]
    fn test_unary_binds_tighter_than_binary() {
        let (chunk, _) = compile_ok("print -1 + !true;");
        let mut expected = vec![OpCode::Constant as u8, 0];
        expected.extend(ops(&[OpCode::Negate, OpCode::True, OpCode::Not, OpCode::Add]));
        expected.extend(ops(&[OpCode::Print, OpCode::Return]));
        assert_eq!(chunk.code(), expected.as_slice());
    }

    #[test]
    fn test_grouping_emits_no_code() {
        let (grouped, _) = compile_ok("((1));");
        let (bare, _) = compile_ok("1;");
        assert_eq!(grouped.code(), bare.code());
    }

    #[test]
    fn test_var_declaration_without_initializer() {
        let (chunk, heap) = compile_ok("var x;");
        let mut expected = ops(&[OpCode::Nil, OpCode::DefineGlobal]);
        expected.push(0);
        expected.push(OpCode::Return as u8);
        assert_eq!(chunk.code(), expected.as_slice());
        let name = chunk.constants()[0].as_object().unwrap();
        assert_eq!(heap.as_str(name), "x");
    }

    #[test]
    fn test_assignment_and_get() {
        let (chunk, _) = compile_ok("x = y;");
        let expected = vec![
            OpCode::GetGlobal as u8,
            1,
            OpCode::SetGlobal as u8,
            0,
            OpCode::Pop as u8,
            OpCode::Return as u8,
        ];
        assert_eq!(chunk.code(), expected.as_slice());
    }

    #[test]
    fn test_string_literals_are_interned() {
        let (chunk, heap) = compile_ok("'ab' == \"ab\";");
        let constants = chunk.constants();
        assert_eq!(constants.len(), 2);
        assert_eq!(constants[0], constants[1]);
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.as_str(constants[0].as_object().unwrap()), "ab");
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let source = "var a = 'x' + 'y'; print a >= 1 == !nil;";
        let mut heap = Heap::new();
        let first = compile(source, &mut heap).unwrap();
        let second = compile(source, &mut heap).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_lines_follow_tokens() {
        let (chunk, _) = compile_ok("print\n1;\nprint 2;");
        assert_eq!(chunk.line(0), 2);
        assert_eq!(chunk.line(2), 2);
        assert_eq!(chunk.line(3), 3);
    }

    #[test]
    fn test_expect_expression() {
        assert_eq!(
            diagnostics("print ;"),
            vec!["[line 1] Error at ';': Expect expression."]
        );
    }

    #[test]
    fn test_error_at_end_of_file() {
        assert_eq!(
            diagnostics("print 1"),
            vec!["[line 1] Error at end of file: Expect ';' after value."]
        );
    }

    #[test]
    fn test_scanner_error_has_no_location() {
        assert_eq!(
            diagnostics("print 'oops;"),
            vec!["[line 1] Error: Unterminated string."]
        );
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert_eq!(
            diagnostics("var a; var b; a + b = 1;"),
            vec!["[line 1] Error at '=': Invalid assignment target."]
        );
    }

    #[test]
    fn test_synchronize_reports_once_per_statement() {
        assert_eq!(
            diagnostics("print 1 +;\nprint 2;"),
            vec!["[line 1] Error at ';': Expect expression."]
        );
        assert_eq!(
            diagnostics("var = 1 2 3;\nprint ;"),
            vec![
                "[line 1] Error at '=': Expect variable name.",
                "[line 2] Error at ';': Expect expression.",
            ]
        );
    }

    #[test]
    fn test_too_many_constants() {
        let source: String = (0..257).map(|i| format!("{i};")).collect();
        assert_eq!(
            diagnostics(&source),
            vec!["[line 1] Error at '256': Too many constants in one chunk."]
        );
    }

    #[test]
    fn test_compile_error_display() {
        let mut heap = Heap::new();
        let error = compile("1 +;\n)", &mut heap).unwrap_err();
        assert_eq!(
            error.to_string(),
            "[line 1] Error at ';': Expect expression.\n[line 2] Error at ')': Expect expression.\n"
        );
    }
}

use logos::Logos;
use thiserror::Error;

/// Span in source code (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// A token with its span
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

fn parse_radix(digits: &str, radix: u32) -> Option<i64> {
    let cleaned = digits.replace('_', "");
    u64::from_str_radix(&cleaned, radix).ok().map(|v| v as i64)
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]  // Skip whitespace
#[logos(skip r"//[^\n]*")]     // Skip line comments
pub enum Token {
    // === Keywords ===
    #[token("class")]
    Class,
    #[token("interface")]
    Interface,
    #[token("fn")]
    Fn,
    #[token("loop")]
    Loop,
    #[token("while")]
    While,
    #[token("break")]
    Break,
    #[token("return")]
    Return,
    #[token("this")]
    This,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("int")]
    Int,
    #[token("double")]
    Double,
    #[token("bool")]
    Bool,
    #[token("module")]
    Module,
    #[token("using")]
    Using,

    // === Literals ===
    #[regex(r"[0-9][0-9_]*", |lex| parse_radix(lex.slice(), 10))]
    #[regex(r"0x[0-9a-fA-F_]+", |lex| parse_radix(&lex.slice()[2..], 16))]
    #[regex(r"0o[0-7_]+", |lex| parse_radix(&lex.slice()[2..], 8))]
    #[regex(r"0b[01_]+", |lex| parse_radix(&lex.slice()[2..], 2))]
    IntLiteral(i64),

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", |lex| lex.slice().replace('_', "").parse::<f64>().ok())]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+", |lex| lex.slice().replace('_', "").parse::<f64>().ok())]
    FloatLiteral(f64),

    // === Identifiers ===
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // === Operators ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Not,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("?")]
    Question,
    #[token("@")]
    At,
    #[token(":=")]
    ColonEq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    // === Punctuation ===
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,

    // === Special ===
    Eof,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Class => write!(f, "class"),
            Token::Interface => write!(f, "interface"),
            Token::Fn => write!(f, "fn"),
            Token::Loop => write!(f, "loop"),
            Token::While => write!(f, "while"),
            Token::Break => write!(f, "break"),
            Token::Return => write!(f, "return"),
            Token::This => write!(f, "this"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Int => write!(f, "int"),
            Token::Double => write!(f, "double"),
            Token::Bool => write!(f, "bool"),
            Token::Module => write!(f, "module"),
            Token::Using => write!(f, "using"),
            Token::IntLiteral(n) => write!(f, "{}", n),
            Token::FloatLiteral(n) => write!(f, "{}", n),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Eq => write!(f, "="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::LtEq => write!(f, "<="),
            Token::GtEq => write!(f, ">="),
            Token::Shl => write!(f, "<<"),
            Token::Shr => write!(f, ">>"),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Amp => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::Caret => write!(f, "^"),
            Token::Tilde => write!(f, "~"),
            Token::Question => write!(f, "?"),
            Token::At => write!(f, "@"),
            Token::ColonEq => write!(f, ":="),
            Token::PlusEq => write!(f, "+="),
            Token::MinusEq => write!(f, "-="),
            Token::StarEq => write!(f, "*="),
            Token::SlashEq => write!(f, "/="),
            Token::PercentEq => write!(f, "%="),
            Token::AmpEq => write!(f, "&="),
            Token::PipeEq => write!(f, "|="),
            Token::CaretEq => write!(f, "^="),
            Token::ShlEq => write!(f, "<<="),
            Token::ShrEq => write!(f, ">>="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::ColonColon => write!(f, "::"),
            Token::Semi => write!(f, ";"),
            Token::Dot => write!(f, "."),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

/// Lexer wrapper that produces SpannedTokens
pub struct Lexer<'src> {
    inner: logos::Lexer<'src, Token>,
    finished: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            inner: Token::lexer(source),
            finished: false,
        }
    }

    /// Tokenize the entire source into a Vec ending with `Token::Eof`
    pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, LexError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();

        loop {
            let spanned = lexer.next_token()?;
            let is_eof = spanned.token == Token::Eof;
            tokens.push(spanned);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<SpannedToken, LexError> {
        if self.finished {
            let len = self.inner.source().len();
            return Ok(SpannedToken {
                token: Token::Eof,
                span: Span::new(len, len),
            });
        }

        match self.inner.next() {
            Some(Ok(token)) => {
                let span = self.inner.span();
                Ok(SpannedToken {
                    token,
                    span: Span::new(span.start, span.end),
                })
            }
            Some(Err(())) => {
                let span = self.inner.span();
                Err(LexError {
                    message: format!("unexpected input: '{}'", self.inner.slice()),
                    span: Span::new(span.start, span.end),
                })
            }
            None => {
                self.finished = true;
                let len = self.inner.source().len();
                Ok(SpannedToken {
                    token: Token::Eof,
                    span: Span::new(len, len),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        Lexer::tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_class_header() {
        let toks = tokens("class Point(T: Node) { x = 0; }");
        assert_eq!(toks[0], Token::Class);
        assert_eq!(toks[1], Token::Ident("Point".into()));
        assert_eq!(toks[2], Token::LParen);
        assert_eq!(toks[4], Token::Colon);
        assert_eq!(toks[8], Token::Ident("x".into()));
        assert_eq!(toks[9], Token::Eq);
        assert_eq!(toks[10], Token::IntLiteral(0));
        assert_eq!(*toks.last().unwrap(), Token::Eof);
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(tokens("0x1F")[0], Token::IntLiteral(31));
        assert_eq!(tokens("0o17")[0], Token::IntLiteral(15));
        assert_eq!(tokens("0b1010")[0], Token::IntLiteral(10));
        assert_eq!(tokens("1_000")[0], Token::IntLiteral(1000));
        assert_eq!(tokens("1.5")[0], Token::FloatLiteral(1.5));
        assert_eq!(tokens("2e3")[0], Token::FloatLiteral(2000.0));
    }

    #[test]
    fn test_compound_operators() {
        let toks = tokens("a := b <<= c :: d ~ e");
        assert_eq!(toks[1], Token::ColonEq);
        assert_eq!(toks[3], Token::ShlEq);
        assert_eq!(toks[5], Token::ColonColon);
        assert_eq!(toks[7], Token::Tilde);
    }

    #[test]
    fn test_comments_skipped() {
        let toks = tokens("a // trailing\nb");
        assert_eq!(toks, vec![Token::Ident("a".into()), Token::Ident("b".into()), Token::Eof]);
    }

    #[test]
    fn test_unexpected_input() {
        let err = Lexer::tokenize("a $ b").unwrap_err();
        assert_eq!(err.span, Span::new(2, 3));
    }
}

//! Token types produced by the lexer

use std::fmt;

/// A single lexical token.
///
/// `line` and `column` are 1-indexed; `offset`..`end` is the byte range the
/// token covers in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub end: usize,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        text: impl Into<String>,
        line: usize,
        column: usize,
        offset: usize,
    ) -> Self {
        let text = text.into();
        let end = offset + text.len();
        Self {
            kind,
            text,
            line,
            column,
            offset,
            end,
        }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Indent,
    Dedent,
    Newline,
    Eof,

    /// String literal with no interpolation; `text` is the unescaped body
    Str,
    /// Opens an interpolated string
    StringStart,
    /// Literal text between interpolations
    StringFragment,
    /// `{` inside a string
    InterpStart,
    /// `}` inside a string
    InterpEnd,
    /// Closes an interpolated string
    StringEnd,

    Number,
    Boolean,
    Identifier,
    Keyword(Keyword),

    Colon,
    Dot,
    Comma,
    LBracket,
    RBracket,
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Indent => write!(f, "indent"),
            TokenKind::Dedent => write!(f, "dedent"),
            TokenKind::Newline => write!(f, "end of line"),
            TokenKind::Eof => write!(f, "end of file"),
            TokenKind::Str | TokenKind::StringStart => write!(f, "text"),
            TokenKind::StringFragment => write!(f, "text fragment"),
            TokenKind::InterpStart => write!(f, "'{{'"),
            TokenKind::InterpEnd => write!(f, "'}}'"),
            TokenKind::StringEnd => write!(f, "end of text"),
            TokenKind::Number => write!(f, "number"),
            TokenKind::Boolean => write!(f, "true or false"),
            TokenKind::Identifier => write!(f, "name"),
            TokenKind::Keyword(k) => write!(f, "'{}'", k.phrase()),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
        }
    }
}

/// Reserved words and phrases.
///
/// Multi-word variants are "compound" keywords: the lexer matches them as a
/// single token, always preferring the longest phrase available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    // Blocks
    Config,
    Services,
    Workflow,
    Trigger,

    // Statements
    Step,
    If,
    OtherwiseIf,
    Otherwise,
    ForEach,
    In,
    Set,
    To,
    Ask,
    Complete,
    CompleteWith,
    RejectWith,
    Log,

    // Service calls
    Using,
    At,
    With,
    WithHeaders,
    SaveResultAs,
    SaveStatusAs,
    SaveHeadersAs,
    OnFailure,
    Retry,
    Times,
    Waiting,
    IfStillFailing,

    // Operators
    Plus,
    Minus,
    DividedBy,
    RoundedTo,
    And,
    Or,
    Not,
    Is,
    IsNot,
    IsAbove,
    IsBelow,
    IsAtLeast,
    IsAtMost,
    IsEmpty,
    IsNotEmpty,
    Contains,
    DoesNotContain,
    Exists,
    DoesNotExist,
}

/// Every keyword phrase, in lowercase with single spaces between words.
pub static KEYWORDS: &[(&str, Keyword)] = &[
    ("config", Keyword::Config),
    ("services", Keyword::Services),
    ("workflow", Keyword::Workflow),
    ("trigger", Keyword::Trigger),
    ("step", Keyword::Step),
    ("if", Keyword::If),
    ("otherwise if", Keyword::OtherwiseIf),
    ("otherwise", Keyword::Otherwise),
    ("for each", Keyword::ForEach),
    ("in", Keyword::In),
    ("set", Keyword::Set),
    ("to", Keyword::To),
    ("ask", Keyword::Ask),
    ("complete", Keyword::Complete),
    ("complete with", Keyword::CompleteWith),
    ("reject with", Keyword::RejectWith),
    ("log", Keyword::Log),
    ("using", Keyword::Using),
    ("at", Keyword::At),
    ("with", Keyword::With),
    ("with headers", Keyword::WithHeaders),
    ("save the result as", Keyword::SaveResultAs),
    ("save the status as", Keyword::SaveStatusAs),
    ("save the headers as", Keyword::SaveHeadersAs),
    ("on failure", Keyword::OnFailure),
    ("retry", Keyword::Retry),
    ("times", Keyword::Times),
    ("waiting", Keyword::Waiting),
    ("if still failing", Keyword::IfStillFailing),
    ("plus", Keyword::Plus),
    ("minus", Keyword::Minus),
    ("divided by", Keyword::DividedBy),
    ("rounded to", Keyword::RoundedTo),
    ("and", Keyword::And),
    ("or", Keyword::Or),
    ("not", Keyword::Not),
    ("is", Keyword::Is),
    ("is not", Keyword::IsNot),
    ("is above", Keyword::IsAbove),
    ("is below", Keyword::IsBelow),
    ("is at least", Keyword::IsAtLeast),
    ("is at most", Keyword::IsAtMost),
    ("is empty", Keyword::IsEmpty),
    ("is not empty", Keyword::IsNotEmpty),
    ("contains", Keyword::Contains),
    ("does not contain", Keyword::DoesNotContain),
    ("exists", Keyword::Exists),
    ("does not exist", Keyword::DoesNotExist),
];

/// Longest keyword phrase, in words.
pub const MAX_KEYWORD_WORDS: usize = 4;

impl Keyword {
    /// Look up a lowercase, single-spaced phrase.
    pub fn from_phrase(phrase: &str) -> Option<Keyword> {
        KEYWORDS
            .iter()
            .find(|(p, _)| *p == phrase)
            .map(|(_, k)| *k)
    }

    /// Canonical spelling of this keyword.
    pub fn phrase(&self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|(_, k)| k == self)
            .map(|(p, _)| *p)
            .unwrap_or("?")
    }

    pub fn is_compound(&self) -> bool {
        self.phrase().contains(' ')
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phrase())
    }
}

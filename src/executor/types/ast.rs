//! Abstract Syntax Tree node types

use serde::{Deserialize, Serialize};

/// Source location span for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Start line (1-indexed)
    pub line: usize,
    /// Start column (1-indexed)
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Create a span that covers both self and other
    pub fn merge(&self, other: &Span) -> Span {
        let (line, column) = if self.start <= other.start {
            (self.line, self.column)
        } else {
            (other.line, other.column)
        };
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line,
            column,
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Span::default()
    }
}

/* ===================== Program ===================== */

/// A parsed source file.
///
/// Each top-level block appears at most once.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub config: Option<ConfigBlock>,
    pub services: Option<ServicesBlock>,
    pub workflow: Option<WorkflowBlock>,
}

impl Program {
    /// Statements of the workflow block, or nothing if the block is absent.
    pub fn statements(&self) -> &[Stmt] {
        self.workflow
            .as_ref()
            .map(|w| w.body.as_slice())
            .unwrap_or(&[])
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDecl> {
        self.services
            .as_ref()
            .and_then(|s| s.services.iter().find(|decl| decl.name == name))
    }

    pub fn config_entry(&self, key: &str) -> Option<&ConfigEntry> {
        self.config
            .as_ref()
            .and_then(|c| c.entries.iter().find(|entry| entry.key == key))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigBlock {
    pub entries: Vec<ConfigEntry>,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: Expr,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicesBlock {
    pub services: Vec<ServiceDecl>,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Api,
    Ai,
    Plugin,
    Webhook,
}

impl ServiceKind {
    pub fn from_word(word: &str) -> Option<ServiceKind> {
        match word.to_ascii_lowercase().as_str() {
            "api" => Some(ServiceKind::Api),
            "ai" => Some(ServiceKind::Ai),
            "plugin" => Some(ServiceKind::Plugin),
            "webhook" => Some(ServiceKind::Webhook),
            _ => None,
        }
    }

    /// How the kind is written in a declaration, article included.
    pub fn declaration_phrase(&self) -> &'static str {
        match self {
            ServiceKind::Api => "an API at",
            ServiceKind::Ai => "an AI using",
            ServiceKind::Plugin => "a plugin",
            ServiceKind::Webhook => "a webhook at",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServiceKind::Api => "api",
            ServiceKind::Ai => "ai",
            ServiceKind::Plugin => "plugin",
            ServiceKind::Webhook => "webhook",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDecl {
    pub name: String,
    pub kind: ServiceKind,
    pub target: String,
    pub headers: Vec<Header>,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

/// A header whose value is evaluated once when execution starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: Expr,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowBlock {
    pub trigger: Option<String>,
    pub body: Vec<Stmt>,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

/* ===================== Statements ===================== */

/// Statement AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    /// Named group of statements. Does not introduce a scope.
    Step {
        label: String,
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    Call(ServiceCall),
    Ask(AskCall),
    Set {
        name: String,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        name_span: Span,
        value: Expr,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    If {
        test: Expr,
        then_body: Vec<Stmt>,
        else_ifs: Vec<ElseIf>,
        else_body: Option<Vec<Stmt>>,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    ForEach {
        binding: String,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        binding_span: Span,
        iterable: Expr,
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    Log {
        message: Expr,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    Complete {
        outputs: Vec<OutputField>,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    Reject {
        message: Expr,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
}

impl Stmt {
    /// Get the span of this statement
    pub fn span(&self) -> Span {
        match self {
            Stmt::Step { span, .. } => *span,
            Stmt::Call(call) => call.span,
            Stmt::Ask(ask) => ask.span,
            Stmt::Set { span, .. } => *span,
            Stmt::If { span, .. } => *span,
            Stmt::ForEach { span, .. } => *span,
            Stmt::Log { span, .. } => *span,
            Stmt::Complete { span, .. } => *span,
            Stmt::Reject { span, .. } => *span,
        }
    }

    /// Whether this statement always ends the workflow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stmt::Complete { .. } | Stmt::Reject { .. })
    }
}

/// `<verb> <description> using <Service> [at <path>]` plus modifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub verb: String,
    pub description: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub service_span: Span,
    pub path: Option<Expr>,
    pub params: Vec<Param>,
    pub bindings: Bindings,
    pub on_failure: Option<ErrorHandler>,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

/// `ask <Agent> to <prompt>` plus modifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskCall {
    pub agent: String,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub agent_span: Span,
    pub prompt: Expr,
    pub params: Vec<Param>,
    pub bindings: Bindings,
    pub on_failure: Option<ErrorHandler>,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: Expr,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

/// Variables a call's response is saved into.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bindings {
    pub result: Option<Binding>,
    pub status: Option<Binding>,
    pub headers: Option<Binding>,
}

impl Bindings {
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        [&self.result, &self.status, &self.headers]
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

/// `on failure:` block attached to a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorHandler {
    pub retry: Option<RetryPolicy>,
    pub fallback: Option<Vec<Stmt>>,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub wait_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElseIf {
    pub test: Expr,
    pub body: Vec<Stmt>,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputField {
    pub name: String,
    pub value: Expr,
    #[serde(default, skip_serializing_if = "Span::is_default")]
    pub span: Span,
}

/* ===================== Expressions ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Plus,
    Minus,
    Times,
    DividedBy,
    /// Truncates the left operand to N decimal places
    RoundedTo,
}

impl ArithOp {
    pub fn phrase(&self) -> &'static str {
        match self {
            ArithOp::Plus => "plus",
            ArithOp::Minus => "minus",
            ArithOp::Times => "times",
            ArithOp::DividedBy => "divided by",
            ArithOp::RoundedTo => "rounded to",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Is,
    IsNot,
    Above,
    Below,
    AtLeast,
    AtMost,
    Contains,
    NotContains,
    IsEmpty,
    IsNotEmpty,
    Exists,
    NotExists,
}

impl CompareOp {
    /// Unary comparisons take no right operand.
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            CompareOp::IsEmpty | CompareOp::IsNotEmpty | CompareOp::Exists | CompareOp::NotExists
        )
    }

    pub fn phrase(&self) -> &'static str {
        match self {
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
            CompareOp::Above => "is above",
            CompareOp::Below => "is below",
            CompareOp::AtLeast => "is at least",
            CompareOp::AtMost => "is at most",
            CompareOp::Contains => "contains",
            CompareOp::NotContains => "does not contain",
            CompareOp::IsEmpty => "is empty",
            CompareOp::IsNotEmpty => "is not empty",
            CompareOp::Exists => "exists",
            CompareOp::NotExists => "does not exist",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

/// Piece of an interpolated string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum StrPart {
    Text(String),
    Expr(Expr),
}

/// Expression AST node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    LitStr {
        v: String,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    Interpolated {
        parts: Vec<StrPart>,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    LitNum {
        v: f64,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    LitBool {
        v: bool,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    LitList {
        elements: Vec<Expr>,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    Ident {
        name: String,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    /// `root.a.b`, always rooted at a name
    Field {
        root: String,
        path: Vec<String>,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        /// `None` exactly when `op` is unary
        right: Option<Box<Expr>>,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
    Not {
        inner: Box<Expr>,
        #[serde(default, skip_serializing_if = "Span::is_default")]
        span: Span,
    },
}

impl Expr {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::LitStr { span, .. } => *span,
            Expr::Interpolated { span, .. } => *span,
            Expr::LitNum { span, .. } => *span,
            Expr::LitBool { span, .. } => *span,
            Expr::LitList { span, .. } => *span,
            Expr::Ident { span, .. } => *span,
            Expr::Field { span, .. } => *span,
            Expr::Arith { span, .. } => *span,
            Expr::Compare { span, .. } => *span,
            Expr::Logical { span, .. } => *span,
            Expr::Not { span, .. } => *span,
        }
    }
}

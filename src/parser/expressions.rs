//! Expression parsing
//!
//! Precedence, loosest first:
//!
//! | Level      | Forms                                               |
//! |------------|-----------------------------------------------------|
//! | logical    | `and`, `or` (one tier, left-associative)            |
//! | negation   | `not`                                               |
//! | comparison | `is`, `is above`, `contains`, `is empty`, ...       |
//! | arithmetic | `plus`, `minus`, `times`, `divided by`, `rounded to`|
//! | primary    | literals, names, fields, lists, parentheses         |

use super::statements::token_span;
use super::token::{Keyword, TokenKind};
use super::Parser;
use crate::executor::types::ast::{ArithOp, CompareOp, Expr, LogicalOp, Span, StrPart};

fn logical_op(kind: TokenKind) -> Option<LogicalOp> {
    match kind {
        TokenKind::Keyword(Keyword::And) => Some(LogicalOp::And),
        TokenKind::Keyword(Keyword::Or) => Some(LogicalOp::Or),
        _ => None,
    }
}

fn compare_op(kind: TokenKind) -> Option<CompareOp> {
    let TokenKind::Keyword(keyword) = kind else {
        return None;
    };
    let op = match keyword {
        Keyword::Is => CompareOp::Is,
        Keyword::IsNot => CompareOp::IsNot,
        Keyword::IsAbove => CompareOp::Above,
        Keyword::IsBelow => CompareOp::Below,
        Keyword::IsAtLeast => CompareOp::AtLeast,
        Keyword::IsAtMost => CompareOp::AtMost,
        Keyword::Contains => CompareOp::Contains,
        Keyword::DoesNotContain => CompareOp::NotContains,
        Keyword::IsEmpty => CompareOp::IsEmpty,
        Keyword::IsNotEmpty => CompareOp::IsNotEmpty,
        Keyword::Exists => CompareOp::Exists,
        Keyword::DoesNotExist => CompareOp::NotExists,
        _ => return None,
    };
    Some(op)
}

fn arith_op(kind: TokenKind) -> Option<ArithOp> {
    match kind {
        TokenKind::Keyword(Keyword::Plus) => Some(ArithOp::Plus),
        TokenKind::Keyword(Keyword::Minus) => Some(ArithOp::Minus),
        TokenKind::Keyword(Keyword::Times) => Some(ArithOp::Times),
        TokenKind::Keyword(Keyword::DividedBy) => Some(ArithOp::DividedBy),
        TokenKind::Keyword(Keyword::RoundedTo) => Some(ArithOp::RoundedTo),
        _ => None,
    }
}

/// Optional unit word after `rounded to N`.
const PLACES_WORDS: &[&str] = &["place", "places", "decimal", "decimals"];

impl Parser {
    pub(super) fn parse_expression(&mut self) -> Expr {
        let mut left = self.parse_not();
        while let Some(op) = logical_op(self.peek_kind()) {
            self.advance();
            let right = self.parse_not();
            let span = left.span().merge(&right.span());
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        left
    }

    fn parse_not(&mut self) -> Expr {
        if let Some(start) = self.eat_keyword(Keyword::Not) {
            let inner = self.parse_not();
            let span = token_span(&start).merge(&inner.span());
            return Expr::Not {
                inner: Box::new(inner),
                span,
            };
        }
        self.parse_comparison()
    }

    /// At most one comparison per operand; `a is b is c` is rejected.
    fn parse_comparison(&mut self) -> Expr {
        let left = self.parse_arithmetic();
        let Some(op) = compare_op(self.peek_kind()) else {
            return left;
        };
        let op_token = self.advance();

        let right = if op.is_unary() {
            None
        } else {
            Some(Box::new(self.parse_arithmetic()))
        };
        let end = right
            .as_ref()
            .map(|r| r.span())
            .unwrap_or_else(|| token_span(&op_token));
        let expr = Expr::Compare {
            op,
            span: left.span().merge(&end),
            left: Box::new(left),
            right,
        };

        if compare_op(self.peek_kind()).is_some() {
            self.error_here(
                "Comparisons cannot be chained",
                Some("Join separate comparisons with 'and' or 'or'"),
            );
        }
        expr
    }

    /// Arithmetic operators share one precedence level and associate left.
    pub(super) fn parse_arithmetic(&mut self) -> Expr {
        let mut left = self.parse_primary();
        while let Some(op) = arith_op(self.peek_kind()) {
            self.advance();
            let right = self.parse_primary();
            if op == ArithOp::RoundedTo
                && self.check(TokenKind::Identifier)
                && PLACES_WORDS.contains(&self.peek().text.to_ascii_lowercase().as_str())
            {
                self.advance();
            }
            let span = left.span().merge(&right.span());
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        left
    }

    fn parse_primary(&mut self) -> Expr {
        match self.peek_kind() {
            TokenKind::Str => {
                let token = self.advance();
                Expr::LitStr {
                    span: token_span(&token),
                    v: token.text,
                }
            }
            TokenKind::StringStart => self.parse_interpolated(),
            TokenKind::Number => {
                let token = self.advance();
                let span = token_span(&token);
                match token.text.parse::<f64>() {
                    Ok(v) if v.is_finite() => Expr::LitNum { v, span },
                    _ => {
                        self.error_at_span(format!("Invalid number '{}'", token.text), span, None);
                        Expr::LitNum { v: 0.0, span }
                    }
                }
            }
            TokenKind::Boolean => {
                let token = self.advance();
                Expr::LitBool {
                    v: token.text.eq_ignore_ascii_case("true"),
                    span: token_span(&token),
                }
            }
            TokenKind::Identifier => self.parse_name(),
            TokenKind::LBracket => self.parse_list(),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression();
                self.expect(TokenKind::RParen, "')'");
                inner
            }
            _ => {
                self.error_expected("a value");
                let here = self.peek();
                Expr::LitStr {
                    v: String::new(),
                    span: Span::new(here.offset, here.offset, here.line, here.column),
                }
            }
        }
    }

    /// `name` or `name.field.field`. Field names may be single-word keywords
    /// (`request.to`).
    fn parse_name(&mut self) -> Expr {
        let root = self.advance();
        let mut path = Vec::new();

        while self.check(TokenKind::Dot) {
            self.advance();
            let token = self.peek().clone();
            let is_field_name = match token.kind {
                TokenKind::Identifier | TokenKind::Boolean => true,
                TokenKind::Keyword(keyword) => !keyword.is_compound(),
                _ => false,
            };
            if !is_field_name {
                self.error_expected("a field name after '.'");
                break;
            }
            self.advance();
            path.push(token.text);
        }

        let span = self.span_from(&root);
        if path.is_empty() {
            Expr::Ident {
                name: root.text,
                span,
            }
        } else {
            Expr::Field {
                root: root.text,
                path,
                span,
            }
        }
    }

    fn parse_list(&mut self) -> Expr {
        let start = self.advance();
        let mut elements = Vec::new();

        if !self.check(TokenKind::RBracket) {
            loop {
                elements.push(self.parse_expression());
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket, "']' to close the list");

        Expr::LitList {
            elements,
            span: self.span_from(&start),
        }
    }

    /// The lexer guarantees the fragment/interpolation layout, so only the
    /// reference inside each `{}` needs building.
    fn parse_interpolated(&mut self) -> Expr {
        let start = self.advance();
        let mut parts = Vec::new();

        loop {
            match self.peek_kind() {
                TokenKind::StringFragment => {
                    let token = self.advance();
                    parts.push(StrPart::Text(token.text));
                }
                TokenKind::InterpStart => {
                    self.advance();
                    if self.check(TokenKind::Identifier) {
                        parts.push(StrPart::Expr(self.parse_name()));
                    } else {
                        self.error_expected("a name inside '{}'");
                    }
                    self.expect(TokenKind::InterpEnd, "'}'");
                }
                TokenKind::StringEnd => {
                    self.advance();
                    break;
                }
                _ => {
                    self.error_expected("the end of the text");
                    break;
                }
            }
        }

        Expr::Interpolated {
            parts,
            span: self.span_from(&start),
        }
    }
}

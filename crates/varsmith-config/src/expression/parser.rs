//! Parser for the expression language, built from chumsky combinators over
//! the token stream produced by [`lexer`](super::lexer::lexer).

use chumsky::{input::ValueInput, pratt::*, prelude::*};
use varsmith_core::Value;

use super::ast::{BinaryOp, Expr, RefKind, Reference, TemplatePart, UnaryOp};
use super::lexer::{Segment, Span, Token, check_brace_depth, lexer, parse_error, split_template};
use super::{ExprError, MAX_NESTING};

type ParseExtra<'src> = extra::Err<Rich<'src, Token<'src>, Span>>;

/// Parse a complete expression, e.g. `upper(var.name)`.
pub fn parse(src: &str) -> Result<Expr, ExprError> {
    parse_at(src, 0, 0)
}

/// Parse bare template text, e.g. `${var.region}-image`.
///
/// Text without any interpolation parses to a string literal.
pub fn parse_template(src: &str) -> Result<Expr, ExprError> {
    template_from_segments(split_template(src)?, 0, 1)
}

/// Parse `src`, which starts at `base` in the outermost text and sits
/// `depth` levels deep in template interpolations.
fn parse_at(src: &str, base: usize, depth: usize) -> Result<Expr, ExprError> {
    check_brace_depth(src, depth).map_err(|error| shift(error, base))?;

    let (tokens, errors) = lexer().parse(src).into_output_errors();
    if let Some(error) = errors.first() {
        return Err(parse_error(error, base));
    }
    let tokens = tokens.unwrap_or_default();
    check_nesting(&tokens, depth, base)?;

    let len = src.len();
    let input = tokens.as_slice().map((len..len).into(), |(t, s)| (t, s));
    let (expr, errors) = expression(base, depth)
        .then_ignore(end())
        .parse(input)
        .into_output_errors();
    if let Some(error) = errors.first() {
        return Err(parse_error(error, base));
    }
    expr.ok_or_else(|| ExprError::Parse {
        offset: base,
        message: "empty expression".to_string(),
    })
}

fn shift(error: ExprError, base: usize) -> ExprError {
    match error {
        ExprError::Parse { offset, message } => ExprError::Parse {
            offset: base + offset,
            message,
        },
        other => other,
    }
}

fn template_from_segments(
    segments: Vec<Segment<'_>>,
    base: usize,
    depth: usize,
) -> Result<Expr, ExprError> {
    let mut parts = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            Segment::Literal(text) => parts.push(TemplatePart::Literal(text)),
            Segment::Interpolation(source, offset) => {
                parts.push(TemplatePart::Interpolation(parse_at(source, base + offset, depth)?));
            }
        }
    }

    match parts.as_slice() {
        [TemplatePart::Literal(text)] => Ok(Expr::Literal(Value::String(text.clone()))),
        _ => Ok(Expr::Template(parts)),
    }
}

/// Turn an error from a nested template back into one positioned in the
/// text currently being parsed, which starts at `base`.
fn relocate<'src>(error: ExprError, fallback: Span, base: usize) -> Rich<'src, Token<'src>, Span> {
    match error {
        ExprError::Parse { offset, message } => {
            let at = offset.saturating_sub(base);
            Rich::custom(Span::from(at..at), message)
        }
        other => Rich::custom(fallback, other.to_string()),
    }
}

/// Pending recursion in one bracket level: prefix operators waiting for
/// their operand and conditionals waiting for their branches.
#[derive(Default)]
struct Frame {
    prefixes: usize,
    conditionals: usize,
}

impl Frame {
    fn weight(&self) -> usize {
        self.prefixes + self.conditionals
    }
}

/// Reject token streams whose nesting, added to `outer`, exceeds
/// [`MAX_NESTING`] before handing them to the recursive parser.
fn check_nesting(tokens: &[(Token<'_>, Span)], outer: usize, base: usize) -> Result<(), ExprError> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut current = Frame::default();
    let mut operand_expected = true;

    for (token, span) in tokens {
        match token {
            Token::LParen | Token::LBracket | Token::LBrace => {
                stack.push(std::mem::take(&mut current));
            }
            Token::RParen | Token::RBracket | Token::RBrace => {
                current = stack.pop().unwrap_or_default();
                current.prefixes = 0;
            }
            Token::Not | Token::Minus if operand_expected => current.prefixes += 1,
            Token::Question => {
                current.prefixes = 0;
                current.conditionals += 1;
            }
            Token::Comma => current = Frame::default(),
            _ => current.prefixes = 0,
        }
        operand_expected = token.expects_operand();

        let depth =
            outer + stack.len() + current.weight() + stack.iter().map(Frame::weight).sum::<usize>();
        if depth > MAX_NESTING {
            return Err(ExprError::Parse {
                offset: base + span.start,
                message: "expression nested too deeply".to_string(),
            });
        }
    }
    Ok(())
}

enum Access {
    Index(Expr),
    Attr(String),
}

fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn expression<'src, I>(
    base: usize,
    depth: usize,
) -> impl Parser<'src, I, Expr, ParseExtra<'src>> + Clone
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
{
    recursive(move |expr| {
        let name = select! { Token::Ident(name) => name.to_string() };

        let number = select! { Token::Number(n) => Expr::Literal(Value::Number(n)) };

        let string = select! { Token::Str(segments) => segments }.validate(
            move |segments, extra, emitter| {
                template_from_segments(segments, base, depth + 1).unwrap_or_else(|error| {
                    emitter.emit(relocate(error, extra.span(), base));
                    Expr::Literal(Value::Null)
                })
            },
        );

        let keyword = select! {
            Token::Ident("true") => Expr::Literal(Value::Bool(true)),
            Token::Ident("false") => Expr::Literal(Value::Bool(false)),
            Token::Ident("null") => Expr::Literal(Value::Null),
        };

        let reference = select! {
            Token::Ident("var") => RefKind::Variable,
            Token::Ident("local") => RefKind::Local,
        }
        .then_ignore(just(Token::Dot))
        .then(name.clone())
        .map(|(kind, name)| Expr::Reference(Reference { kind, name }));

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let call = name
            .then(args)
            .map(|(name, args)| Expr::Call { name, args });

        let bare = select! {
            Token::Ident(name) if !matches!(name, "var" | "local") => name,
        }
        .then_ignore(just(Token::LParen).not())
        .validate(|name, extra, emitter| {
            emitter.emit(Rich::custom(
                extra.span(),
                format!("unknown identifier '{name}'; use var.{name} or local.{name}"),
            ));
            Expr::Literal(Value::Null)
        });

        let list = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(Expr::List);

        let key = select! {
            Token::Ident(name) => Some(name.to_string()),
            Token::Str(segments) => match segments.as_slice() {
                [Segment::Literal(text)] => Some(text.clone()),
                _ => None,
            },
        }
        .validate(|key, extra, emitter| {
            key.unwrap_or_else(|| {
                emitter.emit(Rich::custom(extra.span(), "map keys must be literal strings"));
                String::new()
            })
        })
        .map_with(|key, extra| (key, extra.span()));

        let map = key
            .then_ignore(just(Token::Assign).or(just(Token::Colon)))
            .then(expr.clone())
            .separated_by(just(Token::Comma).or_not())
            .allow_trailing()
            .collect::<Vec<((String, Span), Expr)>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .validate(|entries, _, emitter| {
                let mut seen: Vec<(String, Expr)> = Vec::with_capacity(entries.len());
                for ((key, span), value) in entries {
                    if seen.iter().any(|(existing, _)| *existing == key) {
                        emitter.emit(Rich::custom(span, format!("duplicate map key \"{key}\"")));
                        continue;
                    }
                    seen.push((key, value));
                }
                Expr::Map(seen)
            });

        let parens = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let atom = choice((number, string, keyword, reference, call, bare, list, map, parens));

        let access = choice((
            expr.clone()
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .map(Access::Index),
            just(Token::Dot).ignore_then(select! {
                Token::Ident(name) => Access::Attr(name.to_string()),
                Token::Number(n) if n.fract() == 0.0 => Access::Index(Expr::Literal(Value::Number(n))),
            }),
        ));

        let operators = atom.pratt((
            postfix(10, access, |target, access, _| match access {
                Access::Index(index) => Expr::Index {
                    target: Box::new(target),
                    index: Box::new(index),
                },
                Access::Attr(name) => Expr::GetAttr {
                    target: Box::new(target),
                    name,
                },
            }),
            prefix(
                9,
                select! { Token::Not => UnaryOp::Not, Token::Minus => UnaryOp::Negate },
                |op, operand, _| Expr::Unary {
                    op,
                    operand: Box::new(operand),
                },
            ),
            infix(
                left(8),
                select! {
                    Token::Star => BinaryOp::Mul,
                    Token::Slash => BinaryOp::Div,
                    Token::Percent => BinaryOp::Rem,
                },
                |lhs, op, rhs, _| binary(lhs, op, rhs),
            ),
            infix(
                left(7),
                select! { Token::Plus => BinaryOp::Add, Token::Minus => BinaryOp::Sub },
                |lhs, op, rhs, _| binary(lhs, op, rhs),
            ),
            infix(
                left(6),
                select! {
                    Token::Lt => BinaryOp::Lt,
                    Token::Le => BinaryOp::Le,
                    Token::Gt => BinaryOp::Gt,
                    Token::Ge => BinaryOp::Ge,
                },
                |lhs, op, rhs, _| binary(lhs, op, rhs),
            ),
            infix(
                left(5),
                select! { Token::Eq => BinaryOp::Eq, Token::NotEq => BinaryOp::NotEq },
                |lhs, op, rhs, _| binary(lhs, op, rhs),
            ),
            infix(left(4), just(Token::And).to(BinaryOp::And), |lhs, op, rhs, _| {
                binary(lhs, op, rhs)
            }),
            infix(left(3), just(Token::Or).to(BinaryOp::Or), |lhs, op, rhs, _| {
                binary(lhs, op, rhs)
            }),
        ));

        operators
            .then(
                just(Token::Question)
                    .ignore_then(expr.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expr)
                    .or_not(),
            )
            .map(|(condition, branches)| match branches {
                Some((then, otherwise)) => Expr::Conditional {
                    condition: Box::new(condition),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
                None => condition,
            })
    })
}

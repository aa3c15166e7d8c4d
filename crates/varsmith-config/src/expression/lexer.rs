//! Tokenizer for the expression language.

use chumsky::prelude::*;
use derive_more::Display;
use varsmith_core::value::format_number;

use super::{ExprError, MAX_NESTING};

pub type Span = SimpleSpan;
pub type LexError<'src> = Rich<'src, char, Span>;
type LexExtra<'src> = extra::Err<LexError<'src>>;

/// A piece of a string literal or template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment<'src> {
    Literal(String),
    /// Source text between `${` and `}`, with its offset in the lexed text.
    Interpolation(&'src str, usize),
}

#[derive(Debug, Clone, PartialEq, Display)]
pub enum Token<'src> {
    #[display("{}", format_number(*_0))]
    Number(f64),
    #[display("{_0}")]
    Ident(&'src str),
    #[display("string")]
    Str(Vec<Segment<'src>>),
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("[")]
    LBracket,
    #[display("]")]
    RBracket,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display(",")]
    Comma,
    #[display(".")]
    Dot,
    #[display(":")]
    Colon,
    #[display("?")]
    Question,
    #[display("=")]
    Assign,
    #[display("==")]
    Eq,
    #[display("!=")]
    NotEq,
    #[display("<")]
    Lt,
    #[display("<=")]
    Le,
    #[display(">")]
    Gt,
    #[display(">=")]
    Ge,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("%")]
    Percent,
    #[display("&&")]
    And,
    #[display("||")]
    Or,
    #[display("!")]
    Not,
}

impl Token<'_> {
    /// Whether an operand may follow this token, i.e. a `-` after it is a
    /// negation rather than a subtraction.
    pub fn expects_operand(&self) -> bool {
        !matches!(
            self,
            Token::Number(_)
                | Token::Ident(_)
                | Token::Str(_)
                | Token::RParen
                | Token::RBracket
                | Token::RBrace
        )
    }
}

/// `${ ... }` with balanced braces inside.
fn interpolation<'src>() -> impl Parser<'src, &'src str, Segment<'src>, LexExtra<'src>> + Clone {
    let inner = recursive(|inner| {
        choice((
            just('{').then(inner).then(just('}')).to_slice(),
            none_of("{}").to_slice(),
        ))
        .repeated()
        .to_slice()
    });

    just("${")
        .ignore_then(
            inner.map_with(|source, extra| {
                let span: Span = extra.span();
                Segment::Interpolation(source, span.into_range().start)
            }),
        )
        .then_ignore(just('}'))
}

/// Literal text and interpolations up to the end of a template.
///
/// Inside a quoted string (`quoted`) the text stops at `"` and backslash
/// escapes are decoded; bare template text is taken as-is apart from `$${`.
fn segments<'src>(
    quoted: bool,
) -> impl Parser<'src, &'src str, Vec<Segment<'src>>, LexExtra<'src>> + Clone {
    let escape = just('\\')
        .ignore_then(choice((
            just('n').to('\n'),
            just('t').to('\t'),
            just('r').to('\r'),
            just('"').to('"'),
            just('\\').to('\\'),
            just('$').to('$'),
        )))
        .filter(move |_: &char| quoted);

    let plain = any()
        .filter(move |c: &char| !quoted || (*c != '"' && *c != '\\'))
        .and_is(just("$${").not())
        .and_is(just("${").not());

    let literal = escape
        .or(plain)
        .repeated()
        .at_least(1)
        .collect::<String>()
        .map(Segment::Literal);

    choice((
        just("$${").to(Segment::Literal("${".to_string())),
        interpolation(),
        literal,
    ))
    .repeated()
    .collect::<Vec<_>>()
    .map(merge_literals)
}

fn merge_literals(segments: Vec<Segment<'_>>) -> Vec<Segment<'_>> {
    let mut merged: Vec<Segment<'_>> = Vec::with_capacity(segments.len());
    for segment in segments {
        match (merged.last_mut(), segment) {
            (Some(Segment::Literal(text)), Segment::Literal(more)) => text.push_str(&more),
            (_, segment) => merged.push(segment),
        }
    }
    if merged.is_empty() {
        merged.push(Segment::Literal(String::new()));
    }
    merged
}

/// Bare template text, e.g. `${var.region}-image`.
pub fn template<'src>() -> impl Parser<'src, &'src str, Vec<Segment<'src>>, LexExtra<'src>> {
    segments(false)
}

pub fn lexer<'src>() -> impl Parser<'src, &'src str, Vec<(Token<'src>, Span)>, LexExtra<'src>> {
    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(text::digits(10));

    let number = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .then(exponent.or_not())
        .to_slice()
        .validate(|text, extra, emitter| {
            str::parse::<f64>(text).unwrap_or_else(|error| {
                emitter.emit(Rich::custom(extra.span(), format!("invalid number '{text}': {error}")));
                0.0
            })
        })
        .map(Token::Number);

    let string = just('"')
        .ignore_then(segments(true))
        .then_ignore(just('"'))
        .map(Token::Str);

    let ident = any()
        .filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
                .repeated(),
        )
        .to_slice()
        .map(Token::Ident);

    let operator = choice((
        just("==").to(Token::Eq),
        just("!=").to(Token::NotEq),
        just("<=").to(Token::Le),
        just(">=").to(Token::Ge),
        just("&&").to(Token::And),
        just("||").to(Token::Or),
        just('<').to(Token::Lt),
        just('>').to(Token::Gt),
        just('=').to(Token::Assign),
        just('!').to(Token::Not),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    let punctuation = choice((
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just('[').to(Token::LBracket),
        just(']').to(Token::RBracket),
        just('{').to(Token::LBrace),
        just('}').to(Token::RBrace),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just(':').to(Token::Colon),
        just('?').to(Token::Question),
    ));

    // Line comments: `# ...` and `// ...`
    let comment = just('#')
        .ignored()
        .or(just("//").ignored())
        .then(any().and_is(text::newline().not()).repeated())
        .ignored();

    let skip = text::whitespace().at_least(1).or(comment).repeated();

    let token = choice((number, string, ident, operator, punctuation));

    skip.clone().ignore_then(
        token
            .map_with(|token, extra| (token, extra.span()))
            .then_ignore(skip)
            .repeated()
            .collect(),
    )
}

/// Convert a chumsky error into an `ExprError`, shifting its position by `base`.
pub fn parse_error<T: std::fmt::Display>(error: &Rich<'_, T, Span>, base: usize) -> ExprError {
    ExprError::Parse {
        offset: base + error.span().into_range().start,
        message: error.reason().to_string(),
    }
}

/// Reject text whose `{` nesting, added to `outer`, exceeds [`MAX_NESTING`].
///
/// Braces inside string literals are counted too.
pub fn check_brace_depth(src: &str, outer: usize) -> Result<(), ExprError> {
    let mut depth = outer;
    for (offset, c) in src.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1).max(outer),
            _ => continue,
        }
        if depth > MAX_NESTING {
            return Err(ExprError::Parse {
                offset,
                message: "expression nested too deeply".to_string(),
            });
        }
    }
    Ok(())
}

/// Split bare template text into literal and interpolation segments.
pub fn split_template(src: &str) -> Result<Vec<Segment<'_>>, ExprError> {
    check_brace_depth(src, 0)?;
    let (segments, errors) = template().parse(src).into_output_errors();
    if let Some(error) = errors.first() {
        return Err(parse_error(error, 0));
    }
    Ok(segments.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token<'_>> {
        lexer()
            .parse(src)
            .into_result()
            .unwrap()
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    #[test]
    fn test_operators_and_identifiers() {
        assert_eq!(
            tokens("var.a-b >= 2.5"),
            vec![
                Token::Ident("var"),
                Token::Dot,
                Token::Ident("a-b"),
                Token::Ge,
                Token::Number(2.5),
            ]
        );
    }

    #[test]
    fn test_spans() {
        let lexed = lexer().parse("  x != 10").into_result().unwrap();
        let starts: Vec<usize> = lexed.iter().map(|(_, span)| span.into_range().start).collect();
        assert_eq!(starts, vec![2, 4, 7]);
    }

    #[test]
    fn test_string_with_interpolation() {
        assert_eq!(
            tokens(r#""ami-${var.region}\n""#),
            vec![Token::Str(vec![
                Segment::Literal("ami-".to_string()),
                Segment::Interpolation("var.region", 7),
                Segment::Literal("\n".to_string()),
            ])]
        );
    }

    #[test]
    fn test_nested_braces_in_interpolation() {
        let lexed = tokens(r#""${lookup({ a = "x" }, "a", "")}""#);
        let [Token::Str(segments)] = lexed.as_slice() else {
            panic!("expected one string token, got {lexed:?}");
        };
        assert_eq!(
            segments,
            &vec![Segment::Interpolation(r#"lookup({ a = "x" }, "a", "")"#, 3)]
        );
    }

    #[test]
    fn test_escaped_template_marker() {
        assert_eq!(
            split_template("cost: $${price}").unwrap(),
            vec![Segment::Literal("cost: ${price}".to_string())]
        );
        assert_eq!(
            split_template(r#"C:\temp"#).unwrap(),
            vec![Segment::Literal(r#"C:\temp"#.to_string())]
        );
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(tokens(r#""""#), vec![Token::Str(vec![Segment::Literal(String::new())])]);
    }

    #[test]
    fn test_unterminated_string() {
        assert!(lexer().parse(r#"upper("abc)"#).has_errors());
    }

    #[test]
    fn test_invalid_character() {
        let errors = lexer().parse("1 @ 2").into_errors();
        assert_eq!(parse_error(&errors[0], 10), ExprError::Parse {
            offset: 12,
            message: errors[0].reason().to_string(),
        });
    }

    #[test]
    fn test_deep_braces_rejected() {
        let src = format!("${{{}", "{".repeat(100_000));
        assert!(matches!(
            split_template(&src),
            Err(ExprError::Parse { offset: 33, .. })
        ));
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(tokens("1 # one\n// two\n+ 2"), vec![
            Token::Number(1.0),
            Token::Plus,
            Token::Number(2.0),
        ]);
    }
}

use std::ops::Range;

use chumsky::error::SimpleReason;
use chumsky::prelude::*;

use crate::errors::SignatureParseError;
use crate::{CoreDims, DimensionSignature};

type Spanned<T> = (T, Range<usize>);

/// Parse a dimension signature such as `(n,m),(m)->(n)`.
///
/// Whitespace around names, groups and the arrow is ignored.
pub fn parse_signature(text: &str) -> Result<DimensionSignature, SignatureParseError> {
    let (inputs, (mut outputs, output_span)) =
        signature_parser().parse(text).map_err(|errors| {
            errors
                .into_iter()
                .next()
                .map(|error| convert_error(text, error))
                .unwrap_or_else(|| {
                    SignatureParseError::new(text, 0..text.len(), "invalid signature")
                })
        })?;

    if outputs.len() != 1 {
        return Err(SignatureParseError::new(
            text,
            output_span,
            format!("expected exactly one output group, found {}", outputs.len()),
        ));
    }

    Ok(DimensionSignature::new(inputs, outputs.remove(0)))
}

fn convert_error(text: &str, error: Simple<char>) -> SignatureParseError {
    let span = error.span();
    let message = match error.reason() {
        SimpleReason::Custom(message) => message.clone(),
        SimpleReason::Unclosed { delimiter, .. } => format!("unclosed delimiter '{}'", delimiter),
        SimpleReason::Unexpected => match error.found() {
            Some(found) => format!("unexpected character '{}'", found),
            None => "unexpected end of signature".to_string(),
        },
    };
    SignatureParseError::new(text, span, message)
}

fn dimension_name() -> impl Parser<char, String, Error = Simple<char>> {
    text::ident().padded()
}

fn core_group() -> impl Parser<char, CoreDims, Error = Simple<char>> {
    dimension_name()
        .separated_by(just(','))
        .allow_trailing()
        .delimited_by(just('('), just(')'))
}

fn signature_parser()
-> impl Parser<char, (Vec<CoreDims>, Spanned<Vec<CoreDims>>), Error = Simple<char>> {
    let inputs = core_group().padded().separated_by(just(',')).at_least(1);
    let outputs = core_group()
        .padded()
        .separated_by(just(','))
        .at_least(1)
        .map_with_span(|groups, span: Range<usize>| (groups, span));

    inputs
        .then_ignore(just("->"))
        .then(outputs)
        .then_ignore(end())
}

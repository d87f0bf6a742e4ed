use engine::{EngineError, SpendingMode, Usd};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum ParseError {
    #[error("missing amount")]
    Missing,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("unknown mode \"{0}\", choose conservative, balanced or growth")]
    UnknownMode(String),
}

/// Parses the argument of `/spend` and `/transfer`.
///
/// Accepts `12`, `12.50`, `12,50` and `$12.50`; the first token is the amount
/// and anything after it is ignored.
pub(crate) fn parse_amount(input: &str) -> Result<Usd, ParseError> {
    let Some(token) = input.split_whitespace().next() else {
        return Err(ParseError::Missing);
    };

    let amount: Usd = token.parse().map_err(|err| match err {
        EngineError::InvalidAmount(reason) => ParseError::InvalidAmount(reason),
        other => ParseError::InvalidAmount(other.to_string()),
    })?;
    if !amount.is_positive() {
        return Err(ParseError::NotPositive);
    }
    Ok(amount)
}

/// Parses the argument of `/mode`. `None` means no argument was given.
pub(crate) fn parse_mode(input: &str) -> Result<Option<SpendingMode>, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| ParseError::UnknownMode(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn plain_and_decorated_amounts() {
        assert_eq!(parse_amount("50").unwrap(), Usd::new(dec!(50)));
        assert_eq!(parse_amount(" $12,50 ").unwrap(), Usd::new(dec!(12.5)));
        assert_eq!(parse_amount("7.25 coffee").unwrap(), Usd::new(dec!(7.25)));
    }

    #[test]
    fn missing_amount() {
        assert_eq!(parse_amount("   ").unwrap_err(), ParseError::Missing);
    }

    #[test]
    fn rejects_zero_negative_and_garbage() {
        assert_eq!(parse_amount("0").unwrap_err(), ParseError::NotPositive);
        assert_eq!(parse_amount("-5").unwrap_err(), ParseError::NotPositive);
        assert!(matches!(
            parse_amount("lots").unwrap_err(),
            ParseError::InvalidAmount(_)
        ));
        assert_eq!(
            parse_amount("1.0000001").unwrap_err(),
            ParseError::InvalidAmount("too many decimals".to_string())
        );
    }

    #[test]
    fn modes() {
        assert_eq!(parse_mode("").unwrap(), None);
        assert_eq!(parse_mode(" Growth ").unwrap(), Some(SpendingMode::Growth));
        assert_eq!(
            parse_mode("yolo").unwrap_err(),
            ParseError::UnknownMode("yolo".to_string())
        );
    }
}

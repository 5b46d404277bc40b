use crate::error::CoreError;

/// Parse a selection expression against `n` available items.
///
/// Accepts a single index (`3`), a comma-joined list (`1,3,5`), an inclusive
/// range (`1-5`), any mix (`1,3-5,7`), the literal `all`, or an empty string
/// (equivalent to `all`). Returns 1-based indices, deduplicated and sorted
/// ascending. Invalid input fails without a partial result.
pub fn parse_selection(input: &str, n: usize) -> Result<Vec<usize>, CoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
        return Ok((1..=n).collect());
    }

    let mut selected = Vec::new();
    for part in trimmed.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(CoreError::InvalidSelection {
                token: part.to_string(),
            });
        }

        if let Some((start_s, end_s)) = part.split_once('-') {
            let start = parse_index(start_s.trim(), n)?;
            let end = parse_index(end_s.trim(), n)?;
            if start > end {
                return Err(CoreError::InvalidRange { start, end });
            }
            selected.extend(start..=end);
        } else {
            selected.push(parse_index(part, n)?);
        }
    }

    selected.sort_unstable();
    selected.dedup();
    Ok(selected)
}

fn parse_index(token: &str, n: usize) -> Result<usize, CoreError> {
    let index: usize = token.parse().map_err(|_| CoreError::InvalidSelection {
        token: token.to_string(),
    })?;
    if index < 1 || index > n {
        return Err(CoreError::OutOfRange { index, max: n });
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_expression() {
        assert_eq!(parse_selection("1,3-5,7", 10).unwrap(), vec![1, 3, 4, 5, 7]);
    }

    #[test]
    fn degenerate_range() {
        assert_eq!(parse_selection("2-2", 5).unwrap(), vec![2]);
    }

    #[test]
    fn reversed_range_fails() {
        match parse_selection("5-3", 10) {
            Err(CoreError::InvalidRange { start: 5, end: 3 }) => {}
            other => panic!("expected InvalidRange, got {other:?}"),
        }
    }

    #[test]
    fn all_and_empty_select_everything() {
        let everything: Vec<usize> = (1..=10).collect();
        assert_eq!(parse_selection("all", 10).unwrap(), everything);
        assert_eq!(parse_selection("", 10).unwrap(), everything);
        assert_eq!(parse_selection("  ", 10).unwrap(), everything);
        assert_eq!(parse_selection("ALL", 10).unwrap(), everything);
    }

    #[test]
    fn out_of_range_index_fails() {
        match parse_selection("11", 10) {
            Err(CoreError::OutOfRange { index: 11, max: 10 }) => {}
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn zero_index_fails() {
        assert!(matches!(
            parse_selection("0", 10),
            Err(CoreError::OutOfRange { .. })
        ));
    }

    #[test]
    fn non_numeric_token_fails() {
        assert!(matches!(
            parse_selection("1,two", 10),
            Err(CoreError::InvalidSelection { .. })
        ));
    }

    #[test]
    fn duplicates_collapse_and_result_is_sorted() {
        assert_eq!(parse_selection("5,1,3,1-3", 10).unwrap(), vec![1, 2, 3, 5]);
    }

    #[test]
    fn whitespace_around_tokens_is_tolerated() {
        assert_eq!(parse_selection(" 1 , 3 - 4 ", 10).unwrap(), vec![1, 3, 4]);
    }

    #[test]
    fn dangling_comma_fails() {
        assert!(parse_selection("1,", 10).is_err());
    }
}

/*!
 * Serde Helpers
 * Predicates for `skip_serializing_if`
 */

/// Skip serializing if bool is false
#[inline]
pub fn is_false(value: &bool) -> bool {
    !*value
}

/// Skip serializing if usize is zero
#[inline]
pub fn is_zero_usize(value: &usize) -> bool {
    *value == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(is_false(&false));
        assert!(!is_false(&true));
        assert!(is_zero_usize(&0));
        assert!(!is_zero_usize(&3));
    }
}

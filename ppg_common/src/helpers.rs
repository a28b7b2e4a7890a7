/// Parses an on/off environment toggle (`PPG_DISABLE_IPN_SIGNATURE_CHECKS` and friends). Unset or
/// unrecognised values fall back to `default`.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let Some(value) = value else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognised_tokens_override_the_default() {
        for on in ["1", "true", "YES", " on "] {
            assert!(parse_boolean_flag(Some(on.to_string()), false));
        }
        for off in ["0", "false", "No", "OFF"] {
            assert!(!parse_boolean_flag(Some(off.to_string()), true));
        }
    }

    #[test]
    fn anything_else_is_the_default() {
        assert!(parse_boolean_flag(None, true));
        assert!(!parse_boolean_flag(None, false));
        assert!(parse_boolean_flag(Some("maybe".to_string()), true));
        assert!(!parse_boolean_flag(Some("".to_string()), false));
    }
}

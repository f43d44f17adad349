use std::env;
use std::str::FromStr;

/// Returns the value of the named environment variable if it exists or panics.
pub fn get_variable(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("must define {} environment variable", name))
}

/// Returns the value of the named environment variable if it exists
/// and is not blank.
pub fn get_optional_variable(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Parses the named environment variable, using `default` if it is not
/// set. Panics if it is set but cannot be parsed.
pub fn parse_optional_variable<T: FromStr>(name: &str, default: T) -> T {
    match get_optional_variable(name) {
        Some(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("parse {} environment variable", name)),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_variables_are_absent() {
        env::set_var("ANNOTATOR_TEST_BLANK", "  ");
        env::remove_var("ANNOTATOR_TEST_MISSING");

        assert_eq!(get_optional_variable("ANNOTATOR_TEST_BLANK"), None);
        assert_eq!(get_optional_variable("ANNOTATOR_TEST_MISSING"), None);
        assert_eq!(parse_optional_variable("ANNOTATOR_TEST_MISSING", 7u16), 7);
    }

    #[test]
    fn present_variables_are_parsed() {
        env::set_var("ANNOTATOR_TEST_PORT", "8080");

        assert_eq!(get_variable("ANNOTATOR_TEST_PORT"), "8080");
        assert_eq!(parse_optional_variable("ANNOTATOR_TEST_PORT", 1u16), 8080);
    }

    #[test]
    #[should_panic(expected = "must define ANNOTATOR_TEST_ABSENT")]
    fn missing_required_variables_panic() {
        env::remove_var("ANNOTATOR_TEST_ABSENT");

        get_variable("ANNOTATOR_TEST_ABSENT");
    }
}

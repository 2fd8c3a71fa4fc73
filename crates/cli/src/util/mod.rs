use anyhow::anyhow;
use xqdb_core::{Settings, Store, Subject};
use xqdb_xquery::{AtomicValue, Item};

pub type CliResult<T> = anyhow::Result<T>;

/// The subject a command runs as: `--user` or the configured default user.
pub fn resolve_user(store: &Store, requested: Option<&str>, settings: &Settings) -> CliResult<Subject> {
    let name = requested.unwrap_or(&settings.security.default_user);
    store.user(name).ok_or_else(|| anyhow!("unknown user '{name}'"))
}

/// Parses `NAME=VALUE` for `--var`.
pub fn parse_variable(input: &str) -> Result<(String, String), String> {
    let (name, value) = input.split_once('=').ok_or_else(|| format!("expected NAME=VALUE, got '{input}'"))?;
    let name = name.trim().trim_start_matches('$');
    if name.is_empty() {
        return Err(format!("missing variable name in '{input}'"));
    }
    Ok((name.to_owned(), value.to_owned()))
}

/// Integers and booleans keep their type; everything else binds as a string.
pub fn variable_value(value: &str) -> Item {
    if let Ok(i) = value.parse::<i64>() {
        return Item::from(i);
    }
    match value {
        "true" => Item::from(true),
        "false" => Item::from(false),
        _ => Item::Atomic(AtomicValue::String(value.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("limit=3", "limit", "3")]
    #[case("$name=a=b", "name", "a=b")]
    #[case("empty=", "empty", "")]
    fn variables_split_on_the_first_equals(#[case] input: &str, #[case] name: &str, #[case] value: &str) {
        assert_eq!(parse_variable(input).unwrap(), (name.to_owned(), value.to_owned()));
    }

    #[rstest]
    #[case("novalue")]
    #[case("=3")]
    fn malformed_variables_are_rejected(#[case] input: &str) {
        assert!(parse_variable(input).is_err());
    }

    #[rstest]
    fn values_keep_simple_types() {
        assert_eq!(variable_value("42"), Item::from(42_i64));
        assert_eq!(variable_value("true"), Item::from(true));
        assert_eq!(variable_value("4.2"), Item::Atomic(AtomicValue::String("4.2".into())));
    }

    #[rstest]
    fn users_default_to_the_configured_user() {
        let store = Store::default();
        let settings = Settings::default();
        assert_eq!(resolve_user(&store, None, &settings).unwrap().name(), "guest");
        assert!(resolve_user(&store, Some("admin"), &settings).unwrap().is_dba());
        assert!(resolve_user(&store, Some("nobody"), &settings).is_err());
    }
}

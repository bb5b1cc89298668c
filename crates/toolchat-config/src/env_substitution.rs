use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::env;
use toolchat_core::{ChatError, Result};

// ${VAR} and ${VAR:-default}
static ENV_VAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("Invalid regex pattern")
});

/// Substitute environment references in every value of an override map.
pub fn substitute_env_vars(values: &HashMap<String, String>) -> Result<HashMap<String, String>> {
    values
        .iter()
        .map(|(key, value)| Ok((key.clone(), substitute_in_string(value)?)))
        .collect()
}

/// Substitute environment variables in a single string.
///
/// Unset variables without a default are collected and reported together.
pub fn substitute_in_string(input: &str) -> Result<String> {
    let mut missing_vars = Vec::new();

    let result = ENV_VAR_REGEX.replace_all(input, |cap: &regex::Captures<'_>| {
        let var_name = &cap[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    missing_vars.push(var_name.to_string());
                    String::new()
                }
            },
        }
    });

    if !missing_vars.is_empty() {
        return Err(ChatError::ConfigError(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_in_string() {
        env::set_var("TOOLCHAT_SUBST_TEST", "test_value");

        assert_eq!(
            substitute_in_string("${TOOLCHAT_SUBST_TEST}/some/path").unwrap(),
            "test_value/some/path"
        );
        assert_eq!(
            substitute_in_string("${TOOLCHAT_NON_EXISTENT:-default_value}").unwrap(),
            "default_value"
        );
        assert_eq!(substitute_in_string("plain").unwrap(), "plain");

        env::remove_var("TOOLCHAT_SUBST_TEST");
    }

    #[test]
    fn test_missing_variable_is_config_error() {
        let err = substitute_in_string("${TOOLCHAT_SURELY_UNSET_VAR}").unwrap_err();
        assert!(matches!(err, ChatError::ConfigError(ref msg) if msg.contains("TOOLCHAT_SURELY_UNSET_VAR")));
    }

    #[test]
    fn test_substitute_env_map() {
        let mut values = HashMap::new();
        values.insert("WORKSPACE".to_string(), "${TOOLCHAT_WS_UNSET:-/tmp}".to_string());
        values.insert("MODE".to_string(), "fast".to_string());

        let resolved = substitute_env_vars(&values).unwrap();
        assert_eq!(resolved["WORKSPACE"], "/tmp");
        assert_eq!(resolved["MODE"], "fast");
    }
}

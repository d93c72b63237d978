use anyhow::Result;
use regex::{Captures, Regex};
use std::env;
use tracing::{debug, warn};

const ENV_VAR_PATTERN: &str = r"\$\{(\w+)\}|\$(\w+)";

/// Substitute environment variables in the format ${VAR_NAME} or $VAR_NAME
///
/// Unset variables keep their placeholder so the validator can report them.
pub fn substitute_env_vars(content: &str) -> Result<String> {
    Ok(substitute_with(content, |name| env::var(name).ok())?.0)
}

/// Substitution with a pluggable lookup. Returns the rewritten content and
/// the names of variables the lookup could not resolve.
pub fn substitute_with<F>(content: &str, lookup: F) -> Result<(String, Vec<String>)>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(ENV_VAR_PATTERN)?;
    let mut missing_vars: Vec<String> = Vec::new();

    // Each match is replaced in place, so `$A` never touches `$AB`.
    let result = re
        .replace_all(content, |caps: &Captures| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let Some(var_name) = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) else {
                return whole.to_string();
            };

            match lookup(var_name) {
                Some(value) => {
                    debug!(var = var_name, "Substituting environment variable");
                    value
                }
                None => {
                    warn!("Environment variable '{}' not set", var_name);
                    if !missing_vars.iter().any(|m| m == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    whole.to_string()
                }
            }
        })
        .into_owned();

    if !missing_vars.is_empty() {
        debug!(
            "Environment variables not set (may use defaults or fail validation): {:?}",
            missing_vars
        );
    }

    Ok((result, missing_vars))
}

/// Check if a string contains unresolved environment variable placeholders
pub fn has_unresolved_env_vars(content: &str) -> bool {
    Regex::new(ENV_VAR_PATTERN)
        .map(|re| re.is_match(content))
        .unwrap_or(false)
}

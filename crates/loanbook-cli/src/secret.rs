//! Secret references in `config.toml`.
//!
//! `client_id` and `client_secret` may point outside the file:
//!
//! - `pass::path/in/store` runs `pass show path/in/store` and keeps the first line
//! - `env::VAR_NAME` reads `$VAR_NAME`
//! - anything else is used as written

/// Expands a value that may carry a `pass::` or `env::` prefix.
pub fn resolve(value: &str) -> Result<String, String> {
    match value.split_once("::") {
        Some(("pass", entry)) => from_pass(entry),
        Some(("env", var)) => from_env(var),
        _ => Ok(value.to_string()),
    }
}

fn from_pass(entry: &str) -> Result<String, String> {
    let output = std::process::Command::new("pass")
        .args(["show", entry])
        .output()
        .map_err(|e| format!("failed to run `pass show {}`: {}", entry, e))?;

    if !output.status.success() {
        return Err(format!(
            "`pass show {}` failed ({}): {}",
            entry,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim_end().to_string())
        .filter(|line| !line.is_empty())
        .ok_or_else(|| format!("`pass show {}` printed nothing", entry))
}

fn from_env(var: &str) -> Result<String, String> {
    std::env::var(var).map_err(|_| format!("environment variable `{}` is not set", var))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_are_kept() {
        assert_eq!(resolve("").unwrap(), "");
        assert_eq!(
            resolve("ledger.apps.googleusercontent.com").unwrap(),
            "ledger.apps.googleusercontent.com"
        );
        assert_eq!(resolve("other::thing").unwrap(), "other::thing");
    }

    #[test]
    fn env_reference() {
        unsafe {
            std::env::set_var("_LOANBOOK_TEST_SECRET", "s3cret");
        }
        assert_eq!(resolve("env::_LOANBOOK_TEST_SECRET").unwrap(), "s3cret");
        unsafe {
            std::env::remove_var("_LOANBOOK_TEST_SECRET");
        }
    }

    #[test]
    fn missing_env_var() {
        let err = resolve("env::_LOANBOOK_UNSET_VAR_4821").unwrap_err();
        assert!(err.contains("not set"));
    }

    #[test]
    fn failing_pass_entry() {
        assert!(resolve("pass::loanbook/no/such/entry/4821").is_err());
    }
}

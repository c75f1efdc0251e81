//! `${VAR}` / `${VAR:-default}` expansion for configuration strings.

use crate::ConfigError;

/// Variable that was referenced without a default and is not set.
struct Unset(String);

/// Expand environment variable references in `value`.
///
/// Only the braced forms are recognised; a bare `$VAR` is left alone.
/// `field` names the setting in the error message.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |name| match std::env::var(name) {
        Ok(found) => Ok(Some(found)),
        Err(_) => Err(Unset(name.to_owned())),
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|err| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", err.cause.0),
    })
}

// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;

/// Expand `${NAME}` and `${NAME:-fallback}` references from the environment.
///
/// A reference without a fallback whose variable is unset fails with
/// `ConfigError::UndefinedVariable`. An unterminated `${` is kept literally.
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    resolve_with(input, |name| std::env::var(name).ok())
}

/// Same as [`resolve_variables`] with an injected lookup.
pub(crate) fn resolve_with(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let reference = &after[..end];
        let (name, fallback) = match reference.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (reference, None),
        };

        if name.is_empty() {
            out.push_str(&rest[start..start + 2 + end + 1]);
        } else {
            // An empty value counts as unset only when a fallback exists.
            let value = lookup(name).filter(|v| !v.is_empty() || fallback.is_none());
            match (value, fallback) {
                (Some(value), _) => out.push_str(&value),
                (None, Some(fallback)) => out.push_str(fallback),
                (None, None) => {
                    return Err(ConfigError::UndefinedVariable {
                        name: name.to_string(),
                    })
                }
            }
        }

        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

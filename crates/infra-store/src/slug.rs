use penny_error::AgentError;

/// Directory-safe form of a user identifier: lower-case ASCII alphanumerics,
/// every other run collapsed to one `-`, no leading or trailing `-`.
pub fn slugify(identifier: &str) -> Result<String, AgentError> {
    let mut slug = String::with_capacity(identifier.len());
    let mut pending_dash = false;
    for c in identifier.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        return Err(AgentError::invalid_input(format!(
            "user identifier '{identifier}' has no usable characters"
        )));
    }
    Ok(slug)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn email_addresses() {
        assert_eq!(slugify("Jane.Doe@Example.com").unwrap(), "jane-doe-example-com");
        assert_eq!(slugify("a+b@x.io").unwrap(), "a-b-x-io");
    }

    #[test]
    fn runs_and_edges_collapse() {
        assert_eq!(slugify("  --Hello,, World!!  ").unwrap(), "hello-world");
        assert_eq!(slugify("Grüße").unwrap(), "gr-e");
    }

    #[test]
    fn nothing_left_is_invalid() {
        assert!(matches!(slugify("@@@"), Err(AgentError::InvalidInput(_))));
        assert!(slugify("").is_err());
    }
}

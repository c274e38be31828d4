use super::Capability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionKeyError {
    #[error("capability set must not be empty")]
    EmptyCapabilities,
    #[error("capability set includes debug tools but no context id was given")]
    MissingContext,
    #[error("context id '{0}' given for a capability set without debug tools")]
    UnexpectedContext(String),
}

/// Cache key for a conversational session.
///
/// The context id is present exactly when the capability set includes a capability
/// that needs one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    capabilities: BTreeSet<Capability>,
    context: Option<String>,
}

impl SessionKey {
    pub fn new<I>(capabilities: I, context: Option<String>) -> Result<Self, SessionKeyError>
    where
        I: IntoIterator<Item = Capability>,
    {
        let capabilities: BTreeSet<Capability> = capabilities.into_iter().collect();
        if capabilities.is_empty() {
            return Err(SessionKeyError::EmptyCapabilities);
        }

        let needs_context = capabilities.iter().any(Capability::needs_context);
        match (needs_context, context) {
            (true, None) => Err(SessionKeyError::MissingContext),
            (false, Some(id)) => Err(SessionKeyError::UnexpectedContext(id)),
            (_, context) => Ok(Self {
                capabilities,
                context,
            }),
        }
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.capabilities.iter().map(Capability::tag).collect();
        write!(f, "{}", tags.join("+"))?;
        if let Some(context) = &self.context {
            write!(f, "@{}", context)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_requires_capabilities() {
        let result = SessionKey::new(Vec::new(), None);
        assert_eq!(result.unwrap_err(), SessionKeyError::EmptyCapabilities);
    }

    #[test]
    fn test_debug_key_requires_context() {
        let result = SessionKey::new([Capability::Chat, Capability::Debug], None);
        assert_eq!(result.unwrap_err(), SessionKeyError::MissingContext);

        let key = SessionKey::new([Capability::Debug], Some("dbg-1".to_string())).unwrap();
        assert_eq!(key.context(), Some("dbg-1"));
    }

    #[test]
    fn test_context_rejected_without_debug() {
        let result = SessionKey::new([Capability::Chat], Some("dbg-1".to_string()));
        assert!(matches!(result, Err(SessionKeyError::UnexpectedContext(_))));
    }

    #[test]
    fn test_key_equality_ignores_order() {
        let a = SessionKey::new([Capability::Project, Capability::Chat], None).unwrap();
        let b = SessionKey::new([Capability::Chat, Capability::Project], None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "chat+project");
    }
}

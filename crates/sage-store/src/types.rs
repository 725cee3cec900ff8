use std::fmt;

const MAX_IDENTIFIER_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum NamespaceError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// Isolation unit for one tenant's knowledge base, index, and sessions.
///
/// Composite of owner and agent identity, with an optional sub-scope (e.g. a
/// topic within an agent's corpus). Immutable once derived; equality and
/// hashing are structural, so the value is usable directly as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub(crate) owner: String,
    pub(crate) agent: String,
    pub(crate) scope: Option<String>,
}

impl Namespace {
    /// Derive a namespace from raw identifiers.
    ///
    /// Pure function: two calls with equal inputs yield equal namespaces.
    ///
    /// # Errors
    ///
    /// Returns [`NamespaceError::InvalidIdentifier`] if any identifier is
    /// blank, longer than 128 characters, or contains `/` or control
    /// characters.
    pub fn resolve(owner: &str, agent: &str, scope: Option<&str>) -> Result<Self, NamespaceError> {
        validate_identifier(owner)?;
        validate_identifier(agent)?;
        if let Some(s) = scope {
            validate_identifier(s)?;
        }
        Ok(Self {
            owner: owner.to_owned(),
            agent: agent.to_owned(),
            scope: scope.map(str::to_owned),
        })
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}/{}/{scope}", self.owner, self.agent),
            None => write!(f, "{}/{}", self.owner, self.agent),
        }
    }
}

fn validate_identifier(s: &str) -> Result<(), NamespaceError> {
    if s.trim().is_empty() {
        return Err(NamespaceError::InvalidIdentifier("blank".into()));
    }
    if s.len() > MAX_IDENTIFIER_LEN {
        return Err(NamespaceError::InvalidIdentifier(format!(
            "longer than {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if s.chars().any(|c| c == '/' || c.is_control()) {
        return Err(NamespaceError::InvalidIdentifier(format!(
            "{s:?} contains a forbidden character"
        )));
    }
    Ok(())
}

/// Store-assigned document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted document: text plus its embedding, owned by one namespace.
///
/// Never mutated in place; replacement is modeled as delete-then-insert.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub namespace: Namespace,
    pub text: String,
    pub embedding: Vec<f32>,
}

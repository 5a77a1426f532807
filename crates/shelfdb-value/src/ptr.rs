use std::fmt;

/// A single token of a [`PropertyPath`]: either an object property name or
/// an array index. These are the only two variants a record's encoded JSON
/// tree can produce when read back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    Property(String),
    Index(usize),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Property(p) => write!(f, "{p}"),
            Token::Index(i) => write!(f, "{i}"),
        }
    }
}

/// The ordered sequence of string keys (and array indices) locating a leaf
/// in a record's encoded JSON tree. The head element names the top-level
/// column; a non-singleton path indicates a nested, JSON-encoded column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PropertyPath(Vec<Token>);

impl PropertyPath {
    pub fn root() -> Self {
        PropertyPath(Vec::new())
    }

    pub fn push(&mut self, token: Token) {
        self.0.push(token);
    }

    pub fn pushed(&self, token: Token) -> Self {
        let mut next = self.clone();
        next.push(token);
        next
    }

    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The top-level column this path lands in, if any.
    pub fn head(&self) -> Option<&str> {
        match self.0.first() {
            Some(Token::Property(p)) => Some(p.as_str()),
            _ => None,
        }
    }

    /// True when this path names exactly a top-level column (not a nested
    /// JSON-encoded location within one).
    pub fn is_column(&self) -> bool {
        self.0.len() == 1 && matches!(self.0[0], Token::Property(_))
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for tok in &self.0 {
            write!(f, "/{tok}")?;
        }
        Ok(())
    }
}

/// Walks an encoded JSON tree, yielding every leaf (a JSON value that is
/// not itself an array or object) paired with its [`PropertyPath`].
/// The field-path mapper uses this to collect the set of property paths
/// present in each sample instance before fingerprinting them.
pub fn walk_leaves(tree: &serde_json::Value) -> Vec<(PropertyPath, serde_json::Value)> {
    let mut out = Vec::new();
    walk_into(tree, PropertyPath::root(), &mut out);
    out
}

fn walk_into(
    tree: &serde_json::Value,
    path: PropertyPath,
    out: &mut Vec<(PropertyPath, serde_json::Value)>,
) {
    match tree {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                walk_into(value, path.pushed(Token::Property(key.clone())), out);
            }
        }
        serde_json::Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                walk_into(value, path.pushed(Token::Index(index)), out);
            }
        }
        leaf => out.push((path, leaf.clone())),
    }
}

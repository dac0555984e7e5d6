use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::PointerError;

/// One step of a structural path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Location of a node relative to the document root.
///
/// Displays as a local JSON pointer (`#/channels/user~1signup`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(Vec<Segment>);

impl NodePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Path of a mapping entry below this one.
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.into()));
        Self(segments)
    }

    /// Path of a sequence item below this one.
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Self(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn parent(&self) -> Option<NodePath> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    pub fn first_key(&self) -> Option<&str> {
        match self.0.first() {
            Some(Segment::Key(k)) => Some(k),
            _ => None,
        }
    }

    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_pointer(&self) -> String {
        let mut out = String::from("#");
        for segment in &self.0 {
            out.push('/');
            match segment {
                Segment::Key(k) => out.push_str(&k.replace('~', "~0").replace('/', "~1")),
                Segment::Index(i) => out.push_str(&i.to_string()),
            }
        }
        out
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pointer())
    }
}

impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_pointer())
    }
}

/// A parsed `$ref` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pointer {
    /// `#/a/b` inside the current document, unescaped segments.
    Local(Vec<String>),
    /// A reference into another document (`other.yaml#/a`, `https://...`).
    External {
        document: String,
        fragment: Option<String>,
    },
}

/// Parse a `$ref` string into a [`Pointer`].
///
/// Local fragments follow RFC 6901: `~1` is `/` and `~0` is `~`.
pub fn parse_pointer(reference: &str) -> Result<Pointer, PointerError> {
    if reference.is_empty() {
        return Err(PointerError::Empty);
    }

    let (document, fragment) = match reference.split_once('#') {
        Some((doc, frag)) => (doc, Some(frag)),
        None => (reference, None),
    };

    if !document.is_empty() {
        return Ok(Pointer::External {
            document: document.to_string(),
            fragment: fragment.map(str::to_string),
        });
    }

    let fragment = fragment.unwrap_or_default();
    if fragment.is_empty() {
        return Ok(Pointer::Local(Vec::new()));
    }
    let rest = fragment
        .strip_prefix('/')
        .ok_or_else(|| PointerError::Malformed(fragment.to_string()))?;

    rest.split('/').map(unescape).collect::<Result<_, _>>().map(Pointer::Local)
}

fn unescape(segment: &str) -> Result<String, PointerError> {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return Err(PointerError::InvalidEscape(segment.to_string())),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_escapes_segments() {
        let path = NodePath::root()
            .key("channels")
            .key("user/signup")
            .key("a~b")
            .index(2);
        assert_eq!(path.to_string(), "#/channels/user~1signup/a~0b/2");
        assert_eq!(NodePath::root().to_string(), "#");
    }

    #[test]
    fn parse_local_pointer() {
        assert_eq!(
            parse_pointer("#/components/channels/user~1signup").unwrap(),
            Pointer::Local(vec![
                "components".into(),
                "channels".into(),
                "user/signup".into()
            ])
        );
        assert_eq!(parse_pointer("#").unwrap(), Pointer::Local(vec![]));
    }

    #[test]
    fn parse_external_pointer() {
        assert_eq!(
            parse_pointer("common.yaml#/components/messages/Ping").unwrap(),
            Pointer::External {
                document: "common.yaml".into(),
                fragment: Some("/components/messages/Ping".into()),
            }
        );
        assert!(matches!(
            parse_pointer("https://example.com/spec.json").unwrap(),
            Pointer::External { fragment: None, .. }
        ));
    }

    #[test]
    fn reject_malformed_pointers() {
        assert_eq!(parse_pointer(""), Err(PointerError::Empty));
        assert!(matches!(
            parse_pointer("#components/channels/a"),
            Err(PointerError::Malformed(_))
        ));
        assert!(matches!(
            parse_pointer("#/components/a~2"),
            Err(PointerError::InvalidEscape(_))
        ));
    }

    #[test]
    fn prefix_checks() {
        let ops = NodePath::root().key("operations").key("send");
        let entry = ops.key("messages").index(0);
        assert!(entry.starts_with(&ops));
        assert!(!ops.starts_with(&entry));
        assert_eq!(entry.first_key(), Some("operations"));
        assert_eq!(entry.last(), Some(&Segment::Index(0)));
        assert_eq!(entry.parent().and_then(|p| p.parent()), Some(ops));
        assert!(NodePath::root().parent().is_none());
    }
}

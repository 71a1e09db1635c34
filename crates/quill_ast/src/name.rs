//! Interned hierarchical names

use std::collections::HashMap;

use crate::NameId;

#[derive(Debug, Clone)]
struct NameEntry {
    parent: Option<NameId>,
    segment: String,
}

/// Interns `parent::segment` chains so that equal names share one `NameId`
#[derive(Debug, Default)]
pub struct NameTable {
    entries: Vec<NameEntry>,
    index: HashMap<(Option<NameId>, String), NameId>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the name `segment` nested in `parent`
    pub fn intern(&mut self, parent: Option<NameId>, segment: &str) -> NameId {
        let key = (parent, segment.to_string());
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = NameId::new(self.entries.len());
        self.entries.push(NameEntry {
            parent,
            segment: segment.to_string(),
        });
        self.index.insert(key, id);
        id
    }

    pub fn root(&mut self, segment: &str) -> NameId {
        self.intern(None, segment)
    }

    pub fn child(&mut self, parent: NameId, segment: &str) -> NameId {
        self.intern(Some(parent), segment)
    }

    /// Look a name up without interning it
    pub fn peek(&self, parent: Option<NameId>, segment: &str) -> Option<NameId> {
        self.index.get(&(parent, segment.to_string())).copied()
    }

    /// Intern a whole path such as `["geom", "Point"]`
    pub fn path(&mut self, segments: &[&str]) -> NameId {
        let mut current = None;
        for segment in segments {
            current = Some(self.intern(current, segment));
        }
        current.unwrap_or_else(|| self.root(""))
    }

    pub fn parent(&self, id: NameId) -> Option<NameId> {
        self.entries[id.index()].parent
    }

    pub fn segment(&self, id: NameId) -> &str {
        &self.entries[id.index()].segment
    }

    pub fn is_qualified(&self, id: NameId) -> bool {
        self.parent(id).is_some()
    }

    /// Same last segment re-rooted under `parent`
    pub fn rebase(&mut self, id: NameId, parent: NameId) -> NameId {
        let segment = self.segment(id).to_string();
        self.child(parent, &segment)
    }

    /// `a::b::c`
    pub fn display(&self, id: NameId) -> String {
        let mut segments = vec![self.segment(id)];
        let mut current = self.parent(id);
        while let Some(p) = current {
            segments.push(self.segment(p));
            current = self.parent(p);
        }
        segments.reverse();
        segments.join("::")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_interning_is_identity() {
        let mut names = NameTable::new();
        let a = names.path(&["geom", "Point"]);
        let b = names.path(&["geom", "Point"]);
        let c = names.path(&["app", "Point"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(names.segment(a), "Point");
        assert_eq!(names.display(a), "geom::Point");
    }

    #[test]
    fn test_rebase() {
        let mut names = NameTable::new();
        let short = names.root("Point");
        let module = names.root("geom");
        let qualified = names.rebase(short, module);
        assert_eq!(qualified, names.path(&["geom", "Point"]));
        assert!(names.is_qualified(qualified));
        assert!(!names.is_qualified(short));
        assert_eq!(names.peek(Some(module), "Point"), Some(qualified));
        assert_eq!(names.peek(Some(module), "Line"), None);
    }
}

use std::fmt;
use std::sync::Arc;

/// An ordered path identifying a node in the lock hierarchy.
///
/// The root has a single segment; each level below appends one segment
/// (`db` -> `db.t1` -> `db.t1.p3`). Names are immutable once constructed and
/// cheap to clone: the segment list is shared, which matters because names
/// are used as map keys throughout the lock table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ResourceName {
    segments: Arc<[String]>,
}

impl ResourceName {
    /// A root-level name with a single segment.
    #[must_use]
    pub fn root(segment: impl Into<String>) -> Self {
        Self {
            segments: vec![segment.into()].into(),
        }
    }

    /// The name of the child reached through `segment`.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.to_vec();
        segments.push(segment.into());
        Self {
            segments: segments.into(),
        }
    }

    /// The parent name, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec().into(),
        })
    }

    /// Path segments, root first. Never empty.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final path segment.
    #[must_use]
    pub fn leaf(&self) -> &str {
        self.segments
            .last()
            .expect("resource name is never empty")
    }

    /// Number of levels in the path.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Strict descendant test: true iff `self` lies strictly below
    /// `ancestor` in the hierarchy. A name is not its own descendant.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &ResourceName) -> bool {
        self.segments.len() > ancestor.segments.len()
            && self.segments[..ancestor.segments.len()] == ancestor.segments[..]
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

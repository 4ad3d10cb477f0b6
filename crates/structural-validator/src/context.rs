/// Position of the validator inside the value tree.
///
/// Depth is tracked by the validator itself: every `child`/`index` step adds
/// one level, so callers never increment it by hand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationContext {
    pub path: String,
    pub depth: usize,
}

impl ValidationContext {
    pub fn root(label: impl Into<String>) -> Self {
        Self {
            path: label.into(),
            depth: 0,
        }
    }

    pub fn child(&self, name: &str) -> Self {
        Self {
            path: format!("{}.{}", self.path, name),
            depth: self.depth + 1,
        }
    }

    pub fn index(&self, index: usize) -> Self {
        Self {
            path: format!("{}[{}]", self.path, index),
            depth: self.depth + 1,
        }
    }
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::root("value")
    }
}

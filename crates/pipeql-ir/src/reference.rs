//! Resolution stack for nested pipeline references (join, append, saved domains)

use crate::StepError;

pub const MAX_REFERENCE_DEPTH: usize = 16;

/// Names of the saved pipelines currently being expanded, outermost first.
/// Inline step lists are anonymous and only count toward the depth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceStack {
    frames: Vec<Option<String>>,
}

impl ReferenceStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Push a frame, failing on a repeated name or when too deep
    pub fn descend(&self, name: Option<&str>) -> Result<ReferenceStack, StepError> {
        if let Some(name) = name {
            if self.frames.iter().flatten().any(|frame| frame == name) {
                let mut cycle: Vec<String> = self.frames.iter().flatten().cloned().collect();
                cycle.push(name.to_string());
                return Err(StepError::ReferenceCycle(cycle));
            }
        }
        if self.frames.len() >= MAX_REFERENCE_DEPTH {
            return Err(StepError::ReferenceTooDeep(MAX_REFERENCE_DEPTH));
        }
        let mut frames = self.frames.clone();
        frames.push(name.map(str::to_string));
        Ok(ReferenceStack { frames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_detection() {
        let stack = ReferenceStack::new().descend(Some("a")).unwrap();
        let stack = stack.descend(None).unwrap().descend(Some("b")).unwrap();
        assert_eq!(stack.depth(), 3);
        assert_eq!(
            stack.descend(Some("a")),
            Err(StepError::ReferenceCycle(vec![
                "a".to_string(),
                "b".to_string(),
                "a".to_string()
            ]))
        );
    }

    #[test]
    fn test_depth_limit() {
        let mut stack = ReferenceStack::new();
        for _ in 0..MAX_REFERENCE_DEPTH {
            stack = stack.descend(None).unwrap();
        }
        assert_eq!(
            stack.descend(None),
            Err(StepError::ReferenceTooDeep(MAX_REFERENCE_DEPTH))
        );
    }
}

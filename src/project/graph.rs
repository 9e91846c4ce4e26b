//! Import graph: processing stack, dependency record, cycle detection
//!
//! Entering a file pushes a frame; exiting pops it. A push that names a
//! path already on the stack is a cycle, reported with the full chain
//! rendered `a.ox -> b.ox -> a.ox`. Import and inject edges are distinct
//! dependency kinds but share the detection mechanism, so a mixed-kind
//! cycle is still caught. Depth beyond the configured limit is
//! `MaxDepthExceeded`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{PreprocessError, PreprocessErrorKind};
use crate::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    Import,
    Inject,
}

impl DependencyKind {
    fn name(self) -> &'static str {
        match self {
            DependencyKind::Import => "import",
            DependencyKind::Inject => "inject",
        }
    }
}

#[derive(Debug)]
pub struct ImportGraph {
    stack: Vec<(PathBuf, DependencyKind)>,
    dependencies: HashMap<PathBuf, Vec<(PathBuf, DependencyKind)>>,
    max_depth: usize,
}

impl ImportGraph {
    pub fn new(max_depth: usize) -> Self {
        Self {
            stack: Vec::new(),
            dependencies: HashMap::new(),
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The flat dependency record built so far.
    pub fn dependencies(&self) -> &HashMap<PathBuf, Vec<(PathBuf, DependencyKind)>> {
        &self.dependencies
    }

    /// Push a file onto the processing stack, recording the dependency
    /// edge from the current top.
    pub fn enter(
        &mut self,
        path: &Path,
        kind: DependencyKind,
        location: &Location,
    ) -> Result<(), PreprocessError> {
        if let Some((from, _)) = self.stack.last() {
            self.dependencies
                .entry(from.clone())
                .or_default()
                .push((path.to_path_buf(), kind));
        }

        if let Some(start) = self.stack.iter().position(|(frame, _)| frame == path) {
            let mut chain: Vec<String> = self.stack[start..]
                .iter()
                .map(|(frame, _)| frame.display().to_string())
                .collect();
            chain.push(path.display().to_string());
            return Err(PreprocessError::at(
                PreprocessErrorKind::CircularDependency,
                format!("{} cycle detected: {}", kind.name(), chain.join(" -> ")),
                location.clone(),
            ));
        }

        if self.stack.len() >= self.max_depth {
            return Err(PreprocessError::at(
                PreprocessErrorKind::MaxDepthExceeded,
                format!("import depth exceeds the limit of {}", self.max_depth),
                location.clone(),
            ));
        }

        self.stack.push((path.to_path_buf(), kind));
        Ok(())
    }

    pub fn exit(&mut self) {
        self.stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location::default()
    }

    #[test]
    fn enter_exit_tracks_depth() {
        let mut graph = ImportGraph::new(10);
        graph
            .enter(Path::new("/p/a.ox"), DependencyKind::Import, &loc())
            .unwrap();
        graph
            .enter(Path::new("/p/b.ox"), DependencyKind::Import, &loc())
            .unwrap();
        assert_eq!(graph.depth(), 2);
        graph.exit();
        assert_eq!(graph.depth(), 1);
    }

    #[test]
    fn direct_cycle_detected() {
        let mut graph = ImportGraph::new(10);
        graph
            .enter(Path::new("/p/a.ox"), DependencyKind::Import, &loc())
            .unwrap();
        let error = graph
            .enter(Path::new("/p/a.ox"), DependencyKind::Import, &loc())
            .unwrap_err();
        assert_eq!(error.kind, PreprocessErrorKind::CircularDependency);
        assert_eq!(error.message.matches("/p/a.ox").count(), 2);
    }

    #[test]
    fn indirect_cycle_lists_every_file_once_plus_origin() {
        let mut graph = ImportGraph::new(10);
        for file in ["/p/a.ox", "/p/b.ox", "/p/c.ox"] {
            graph
                .enter(Path::new(file), DependencyKind::Import, &loc())
                .unwrap();
        }
        let error = graph
            .enter(Path::new("/p/a.ox"), DependencyKind::Import, &loc())
            .unwrap_err();
        assert_eq!(error.message.matches("/p/a.ox").count(), 2);
        assert_eq!(error.message.matches("/p/b.ox").count(), 1);
        assert_eq!(error.message.matches("/p/c.ox").count(), 1);
    }

    #[test]
    fn mixed_kind_cycle_detected() {
        let mut graph = ImportGraph::new(10);
        graph
            .enter(Path::new("/p/a.ox"), DependencyKind::Import, &loc())
            .unwrap();
        graph
            .enter(Path::new("/p/b.ox"), DependencyKind::Inject, &loc())
            .unwrap();
        let error = graph
            .enter(Path::new("/p/a.ox"), DependencyKind::Inject, &loc())
            .unwrap_err();
        assert_eq!(error.kind, PreprocessErrorKind::CircularDependency);
    }

    #[test]
    fn depth_limit_enforced() {
        let mut graph = ImportGraph::new(3);
        for file in ["/p/a.ox", "/p/b.ox", "/p/c.ox"] {
            graph
                .enter(Path::new(file), DependencyKind::Import, &loc())
                .unwrap();
        }
        let error = graph
            .enter(Path::new("/p/d.ox"), DependencyKind::Import, &loc())
            .unwrap_err();
        assert_eq!(error.kind, PreprocessErrorKind::MaxDepthExceeded);
    }

    #[test]
    fn dependency_record_kept() {
        let mut graph = ImportGraph::new(10);
        graph
            .enter(Path::new("/p/a.ox"), DependencyKind::Import, &loc())
            .unwrap();
        graph
            .enter(Path::new("/p/b.ox"), DependencyKind::Inject, &loc())
            .unwrap();
        let deps = graph.dependencies().get(Path::new("/p/a.ox")).unwrap();
        assert_eq!(deps[0], (PathBuf::from("/p/b.ox"), DependencyKind::Inject));
    }
}

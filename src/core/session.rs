// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession lives for exactly one compilation run. It owns a borrowed arena in which
// operator kind names and pass names are interned, so per-kind counters are keyed by
// &'arena str and only copied out when a statistics snapshot is taken. It records run
// statistics: nodes validated, passes run and failed, nodes lowered per kind, interpreter
// steps executed and emitted code size.
// SessionStats renders a human-readable summary the CLI prints at higher verbosity levels.
// Sessions are never shared between runs; concurrent compilations each build their own.

//! Arena-based compilation session management.
//!
//! All per-run bookkeeping is tied to the session lifetime, so nothing in here
//! outlives the compilation that produced it.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for interned names.
    arena: &'arena Bump,

    /// Session statistics for diagnostics.
    stats: RefCell<SessionStats>,

    /// String interning for kind and pass names.
    interned_strings: RefCell<HashMap<String, &'arena str>>,

    /// Pass currently running, if any.
    current_pass: RefCell<Option<&'arena str>>,

    /// Lowered node count per interned kind name.
    lowered_kinds: RefCell<HashMap<&'arena str, usize>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            current_pass: RefCell::new(None),
            lowered_kinds: RefCell::new(HashMap::new()),
        }
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Mark the start of a pass.
    pub fn begin_pass(&self, name: &str) {
        let name = self.intern_str(name);
        *self.current_pass.borrow_mut() = Some(name);
    }

    /// Mark the end of the current pass.
    pub fn end_pass(&self, succeeded: bool) {
        let mut stats = self.stats.borrow_mut();
        stats.passes_run += 1;
        if !succeeded {
            stats.passes_failed += 1;
        }
        *self.current_pass.borrow_mut() = None;
    }

    /// Name of the pass currently running.
    pub fn current_pass(&self) -> Option<&'arena str> {
        *self.current_pass.borrow()
    }

    /// Record a validated graph.
    pub fn record_nodes_validated(&self, count: usize) {
        self.stats.borrow_mut().nodes_validated += count;
    }

    /// Record a node lowered to a kernel.
    pub fn record_node_lowered(&self, kind: &str) {
        let kind = self.intern_str(kind);
        self.stats.borrow_mut().nodes_lowered += 1;
        *self.lowered_kinds.borrow_mut().entry(kind).or_insert(0) += 1;
    }

    /// Record interpreter steps executed.
    pub fn record_steps_executed(&self, count: usize) {
        self.stats.borrow_mut().steps_executed += count;
    }

    /// Record emitted artifact size.
    pub fn record_code_size(&self, bytes: usize) {
        self.stats.borrow_mut().emitted_bytes += bytes;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats.borrow().clone();
        stats.lowered_kinds = self
            .lowered_kinds
            .borrow()
            .iter()
            .map(|(&kind, &count)| (kind.to_string(), count))
            .collect();
        stats
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Nodes checked by graph validation.
    pub nodes_validated: usize,

    /// Passes executed, including failed ones.
    pub passes_run: usize,

    /// Passes that reported a failure.
    pub passes_failed: usize,

    /// Nodes lowered to kernels.
    pub nodes_lowered: usize,

    /// Count of lowered nodes per operator kind.
    pub lowered_kinds: HashMap<String, usize>,

    /// Interpreter steps executed.
    pub steps_executed: usize,

    /// Bytes of emitted artifact.
    pub emitted_bytes: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Nodes validated: {}", self.nodes_validated)?;
        writeln!(f, "  Passes run: {}", self.passes_run)?;
        writeln!(f, "  Passes failed: {}", self.passes_failed)?;
        writeln!(f, "  Nodes lowered: {}", self.nodes_lowered)?;
        writeln!(f, "  Steps executed: {}", self.steps_executed)?;
        writeln!(f, "  Emitted size: {} bytes", self.emitted_bytes)?;

        if !self.lowered_kinds.is_empty() {
            writeln!(f, "  Kind breakdown:")?;
            let mut sorted: Vec<_> = self.lowered_kinds.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (kind, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", kind, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_session_creation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.passes_run, 0);
        assert_eq!(stats.nodes_lowered, 0);
        assert!(session.current_pass().is_none());
    }

    #[test]
    fn test_string_interning() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let s1 = session.intern_str("Acos");
        let s2 = session.intern_str("Acos");
        let s3 = session.intern_str("Conv");

        assert_eq!(s1.as_ptr(), s2.as_ptr());
        assert_ne!(s1.as_ptr(), s3.as_ptr());
    }

    #[test]
    fn test_pass_tracking() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.begin_pass("verify");
        assert_eq!(session.current_pass(), Some("verify"));
        session.end_pass(true);
        session.begin_pass("lower");
        session.end_pass(false);

        let stats = session.stats();
        assert_eq!(stats.passes_run, 2);
        assert_eq!(stats.passes_failed, 1);
        assert!(session.current_pass().is_none());
    }

    #[test]
    fn test_statistics_display() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_node_lowered("Acos");
        session.record_node_lowered("Acos");
        session.record_node_lowered("Input");
        session.record_code_size(64);

        let output = format!("{}", session.stats());
        assert!(output.contains("Nodes lowered: 3"));
        assert!(output.contains("Acos: 2"));
        assert!(output.contains("Emitted size: 64 bytes"));
    }

    #[test]
    fn test_lowered_kinds_share_interned_names() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_node_lowered("Conv");
        let before = arena.allocated_bytes();
        session.record_node_lowered("Conv");
        session.record_node_lowered("Conv");
        assert_eq!(arena.allocated_bytes(), before);

        let stats = session.stats();
        assert_eq!(stats.lowered_kinds.get("Conv"), Some(&3));
        assert_eq!(stats.nodes_lowered, 3);
    }
}

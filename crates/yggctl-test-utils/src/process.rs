//! A fake process table for process-discovery tests.

/// An in-memory list of `(pid, argv)` rows.
///
/// ```ignore
/// let table = FakeProcTable::new()
///     .process(17, &["/usr/sbin/sshd"])
///     .process(4242, &["/usr/bin/yggdrasil", "-useconffile", "/etc/yggdrasil.conf"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FakeProcTable {
    rows: Vec<(u32, Vec<String>)>,
}

impl FakeProcTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process whose argv is `args`.
    pub fn process(mut self, pid: u32, args: &[&str]) -> Self {
        self.rows
            .push((pid, args.iter().map(|a| a.to_string()).collect()));
        self
    }

    pub fn rows(&self) -> &[(u32, Vec<String>)] {
        &self.rows
    }
}

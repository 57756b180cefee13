/// Sink for progress and diagnostic messages.
///
/// Every stage takes a `&mut dyn Reporter` so the CLI can print and tests can
/// collect.
pub trait Reporter {
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);

    /// Verbose detail; dropped unless the sink opts in.
    fn debug(&mut self, _msg: &str) {}
}

/// Reporter that keeps every message, for assertions.
#[derive(Debug, Default, Clone)]
pub struct CollectingReporter {
    pub infos: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
    pub debugs: Vec<String>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any message at any level contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.infos
            .iter()
            .chain(&self.warns)
            .chain(&self.errors)
            .chain(&self.debugs)
            .any(|m| m.contains(needle))
    }
}

impl Reporter for CollectingReporter {
    fn info(&mut self, msg: &str) {
        self.infos.push(msg.to_string());
    }

    fn warn(&mut self, msg: &str) {
        self.warns.push(msg.to_string());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }

    fn debug(&mut self, msg: &str) {
        self.debugs.push(msg.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_reporter_keeps_levels_apart() {
        let mut reporter = CollectingReporter::new();
        reporter.info("a");
        reporter.warn("b");
        reporter.error("c");
        reporter.debug("d");

        assert_eq!(reporter.infos, vec!["a"]);
        assert_eq!(reporter.warns, vec!["b"]);
        assert_eq!(reporter.errors, vec!["c"]);
        assert_eq!(reporter.debugs, vec!["d"]);
        assert!(reporter.mentions("d"));
        assert!(!reporter.mentions("z"));
    }

    #[test]
    fn debug_is_a_no_op_by_default() {
        struct InfoOnly(Vec<String>);
        impl Reporter for InfoOnly {
            fn info(&mut self, msg: &str) {
                self.0.push(msg.to_string());
            }
            fn warn(&mut self, _msg: &str) {}
            fn error(&mut self, _msg: &str) {}
        }

        let mut reporter = InfoOnly(Vec::new());
        reporter.debug("hidden");
        reporter.info("shown");
        assert_eq!(reporter.0, vec!["shown"]);
    }
}

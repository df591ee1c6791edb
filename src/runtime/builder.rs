use super::Runtime;
use crate::labels::{LabelValue, Labels};

/// Runtime settings collected by [`RuntimeBuilder`].
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// Number of events kept in the introspection history (0 disables it).
    pub(crate) event_history: usize,
    /// Labels of the root scope.
    pub(crate) root_labels: Labels,
    /// Upper bound on ticks per `run`/`block_on` call.
    pub(crate) max_ticks: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_history: 1024,
            root_labels: Labels::named("root"),
            max_ticks: None,
        }
    }
}

/// Builder for configuring and creating a runtime.
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .root_name("server")
///     .event_history(0)
///     .max_ticks(10_000)
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    config: Config,
}

impl RuntimeBuilder {
    /// Creates a builder with the default configuration: 1024 events of
    /// history, a root scope named `"root"` and no tick limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many events the runtime keeps for
    /// [`Runtime::events`](super::Runtime::events). `0` keeps none;
    /// subscribers are notified either way.
    pub fn event_history(mut self, capacity: usize) -> Self {
        self.config.event_history = capacity;
        self
    }

    /// Names the root scope.
    pub fn root_name(mut self, name: impl Into<String>) -> Self {
        self.config.root_labels.set_name(name);
        self
    }

    /// Adds a label to the root scope.
    pub fn root_label(mut self, key: impl Into<String>, value: impl Into<LabelValue>) -> Self {
        self.config.root_labels.insert(key, value);
        self
    }

    /// Limits how many ticks a single `run` or `block_on` call may take
    /// before failing with [`Error::Stalled`](crate::Error::Stalled).
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn max_ticks(mut self, n: usize) -> Self {
        assert!(n > 0, "max_ticks must be > 0");

        self.config.max_ticks = Some(n);
        self
    }

    /// Builds the runtime with the configured options.
    pub fn build(self) -> Runtime {
        Runtime::with_config(self.config)
    }
}

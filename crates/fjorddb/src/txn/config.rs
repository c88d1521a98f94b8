use crate::txn::read_version::WeakReadSemantics;
use std::time::Duration;

///
/// TransactionPriority
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TransactionPriority {
    #[default]
    Normal,
    Batch,
    System,
    Interactive,
    LongRunning,
}

///
/// ReadPriority
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReadPriority {
    Low,
    #[default]
    Normal,
    High,
}

///
/// TracingOptions
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TracingOptions {
    pub transaction_id: Option<String>,
    pub log_transaction: bool,
    pub server_request_tracing: bool,
    pub tags: Vec<String>,
}

///
/// TransactionConfig
///
/// Per-save knobs. Presets fix the whole group; individual fields can be
/// adjusted afterwards with struct update syntax.
///

#[derive(Clone, Debug, PartialEq)]
pub struct TransactionConfig {
    pub timeout: Duration,
    pub retry_limit: u32,
    pub max_retry_delay: Duration,
    pub priority: TransactionPriority,
    pub read_priority: ReadPriority,
    pub disable_read_cache: bool,
    pub weak_read_semantics: Option<WeakReadSemantics>,
    pub use_grv_cache: bool,
    pub tracing: TracingOptions,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry_limit: 10,
            max_retry_delay: Duration::from_secs(1),
            priority: TransactionPriority::Normal,
            read_priority: ReadPriority::Normal,
            disable_read_cache: false,
            weak_read_semantics: None,
            use_grv_cache: false,
            tracing: TracingOptions::default(),
        }
    }
}

impl TransactionConfig {
    #[must_use]
    pub fn batch() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_limit: 20,
            max_retry_delay: Duration::from_secs(5),
            priority: TransactionPriority::Batch,
            read_priority: ReadPriority::Low,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn system() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            priority: TransactionPriority::System,
            read_priority: ReadPriority::High,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn interactive() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            retry_limit: 3,
            max_retry_delay: Duration::from_millis(250),
            priority: TransactionPriority::Interactive,
            read_priority: ReadPriority::High,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn long_running() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            retry_limit: 50,
            max_retry_delay: Duration::from_secs(10),
            priority: TransactionPriority::LongRunning,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn read_only() -> Self {
        Self {
            weak_read_semantics: Some(WeakReadSemantics::strict()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn read_only_cached() -> Self {
        Self {
            weak_read_semantics: Some(WeakReadSemantics::default_weak()),
            use_grv_cache: true,
            ..Self::default()
        }
    }
}

///
/// TESTS
///

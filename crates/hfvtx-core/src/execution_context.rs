//! Thread policy for the per-event and per-pair fan-out.
//!
//! An [`ExecutionContext`] is created once and reused across many calls to the vertexer.
//!
//! Thread policy guidance:
//! - [`ThreadPolicy::Single`]: runs on the caller thread, in event order.
//! - [`ThreadPolicy::GlobalPool`]: uses Rayon global parallelism when available.
//! - [`ThreadPolicy::Dedicated`]: creates a private Rayon pool; setup is higher-cost, so it
//!   should be reused across many calls.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{HfvtxError, HfvtxResult};

/// Thread-policy options for [`ExecutionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThreadPolicy {
    /// Run work on the current thread.
    Single,
    /// Use the global Rayon pool.
    #[default]
    GlobalPool,
    /// Use a dedicated Rayon pool with `n_threads`.
    Dedicated(usize),
}

impl Display for ThreadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadPolicy::Single => write!(f, "single"),
            ThreadPolicy::GlobalPool => write!(f, "global"),
            ThreadPolicy::Dedicated(n) => write!(f, "dedicated:{n}"),
        }
    }
}

impl FromStr for ThreadPolicy {
    type Err = HfvtxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "single" | "serial" => Ok(Self::Single),
            "global" | "globalpool" | "global-pool" => Ok(Self::GlobalPool),
            _ => lower
                .strip_prefix("dedicated:")
                .and_then(|n| n.trim().parse().ok())
                .map(Self::Dedicated)
                .ok_or_else(|| HfvtxError::ParseError {
                    name: s.to_string(),
                    object: "ThreadPolicy".to_string(),
                }),
        }
    }
}

/// Owns the thread policy, and the dedicated pool if one was requested.
#[derive(Debug)]
pub struct ExecutionContext {
    thread_policy: ThreadPolicy,
    #[cfg(feature = "rayon")]
    dedicated_pool: Option<rayon::ThreadPool>,
}

impl ExecutionContext {
    /// Create a new context with the requested thread policy.
    ///
    /// Returns an error when the requested policy is incompatible with the current feature set
    /// (for example, non-single policy without `rayon`) or when a dedicated pool size is invalid.
    pub fn new(thread_policy: ThreadPolicy) -> HfvtxResult<Self> {
        #[cfg(not(feature = "rayon"))]
        {
            if thread_policy != ThreadPolicy::Single {
                return Err(HfvtxError::invalid_config(
                    "the rayon feature is required for non-single thread policies",
                ));
            }
        }

        #[cfg(feature = "rayon")]
        let dedicated_pool = match thread_policy {
            ThreadPolicy::Dedicated(n_threads) => {
                if n_threads == 0 {
                    return Err(HfvtxError::invalid_config(
                        "dedicated thread pool size must be >= 1",
                    ));
                }
                Some(
                    rayon::ThreadPoolBuilder::new()
                        .num_threads(n_threads)
                        .build()?,
                )
            }
            ThreadPolicy::Single | ThreadPolicy::GlobalPool => None,
        };

        Ok(Self {
            thread_policy,
            #[cfg(feature = "rayon")]
            dedicated_pool,
        })
    }

    /// A context which runs everything on the calling thread.
    pub fn single() -> Self {
        Self {
            thread_policy: ThreadPolicy::Single,
            #[cfg(feature = "rayon")]
            dedicated_pool: None,
        }
    }

    /// Return the configured thread policy.
    pub fn thread_policy(&self) -> ThreadPolicy {
        self.thread_policy
    }

    /// Whether work under this context may be spread over several threads.
    pub fn is_parallel(&self) -> bool {
        cfg!(feature = "rayon") && self.thread_policy != ThreadPolicy::Single
    }

    /// Execute work under this context's thread policy.
    ///
    /// `Dedicated` runs inside the dedicated pool. Other policies run the closure directly.
    #[cfg(feature = "rayon")]
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.dedicated_pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Execute work under this context's thread policy.
    #[cfg(not(feature = "rayon"))]
    pub fn install<R>(&self, op: impl FnOnce() -> R) -> R {
        op()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("single".parse::<ThreadPolicy>().unwrap(), ThreadPolicy::Single);
        assert_eq!(
            "Dedicated:4".parse::<ThreadPolicy>().unwrap(),
            ThreadPolicy::Dedicated(4)
        );
        assert!("dedicated:many".parse::<ThreadPolicy>().is_err());
        assert_eq!(ThreadPolicy::Dedicated(2).to_string(), "dedicated:2");
    }

    #[test]
    fn test_single_context_runs_inline() {
        let ctx = ExecutionContext::new(ThreadPolicy::Single).unwrap();
        assert!(!ctx.is_parallel());
        assert_eq!(ctx.install(|| 2 + 2), 4);
        assert_eq!(ExecutionContext::single().thread_policy(), ThreadPolicy::Single);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_dedicated_pool() {
        let ctx = ExecutionContext::new(ThreadPolicy::Dedicated(2)).unwrap();
        assert!(ctx.is_parallel());
        assert_eq!(ctx.install(rayon::current_num_threads), 2);
        let err = ExecutionContext::new(ThreadPolicy::Dedicated(0)).unwrap_err();
        assert!(matches!(err, HfvtxError::InvalidConfiguration { .. }));
    }
}

//! Ordered fallback chains for component initialization.
//!
//! A chain is a list of named strategies tried in order. The first success
//! wins; if every strategy fails the caller gets all of the failures, not
//! just the last one.

use std::fmt::{self, Display};

type Attempt<T> = Box<dyn Fn() -> Result<T, String> + Send + Sync>;

/// Ordered list of named initialization strategies for one component.
pub struct FallbackChain<T> {
    component: &'static str,
    strategies: Vec<(&'static str, Attempt<T>)>,
}

/// Value produced by a chain together with the strategy that produced it.
pub struct Resolved<T> {
    pub value: T,
    pub strategy: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub error: String,
}

/// Every strategy of a chain failed.
#[derive(Debug, Clone)]
pub struct ChainExhausted {
    pub component: &'static str,
    pub failures: Vec<StrategyFailure>,
}

impl Display for ChainExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            return write!(f, "no {} initialization strategies configured", self.component);
        }

        write!(f, "all {} initialization strategies failed", self.component)?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.strategy, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ChainExhausted {}

impl<T: 'static> FallbackChain<T> {
    pub fn new(component: &'static str) -> Self {
        Self {
            component,
            strategies: Vec::new(),
        }
    }

    /// Append a strategy, tried after every strategy added before it.
    pub fn then<E, F>(mut self, name: &'static str, attempt: F) -> Self
    where
        E: Display,
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        self.strategies
            .push((name, Box::new(move || attempt().map_err(|e| e.to_string()))));
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|(name, _)| *name).collect()
    }

    /// Try each strategy once, in order.
    pub fn run(&self) -> Result<Resolved<T>, ChainExhausted> {
        let component = self.component;
        let mut failures = Vec::new();

        for (name, attempt) in &self.strategies {
            match attempt() {
                Ok(value) => {
                    log::info!("component={component} strategy={name} outcome=success");
                    return Ok(Resolved {
                        value,
                        strategy: name,
                    });
                }
                Err(error) => {
                    log::warn!("component={component} strategy={name} outcome=error err={error}");
                    failures.push(StrategyFailure {
                        strategy: name,
                        error,
                    });
                }
            }
        }

        log::error!("component={component} outcome=exhausted attempts={}", failures.len());
        Err(ChainExhausted {
            component,
            failures,
        })
    }
}

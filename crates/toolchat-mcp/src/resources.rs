//! Release actions for resources acquired while a connection starts up

use futures::future::BoxFuture;
use std::future::Future;
use toolchat_core::Result;
use tracing::{debug, warn};

/// Stack of pending release actions, run last-acquired first.
#[derive(Default)]
pub struct ReleaseStack {
    actions: Vec<(String, BoxFuture<'static, Result<()>>)>,
}

impl ReleaseStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, label: impl Into<String>, release: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.actions.push((label.into(), Box::pin(release)));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action in reverse order. Failures are logged and counted,
    /// never returned, so the remaining actions still run.
    pub async fn unwind(&mut self) -> usize {
        let mut failures = 0;
        while let Some((label, release)) = self.actions.pop() {
            match release.await {
                Ok(()) => debug!("Released {}", label),
                Err(e) => {
                    warn!("Error releasing {}: {}", label, e);
                    failures += 1;
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for ReleaseStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<&str> = self.actions.iter().map(|(label, _)| label.as_str()).collect();
        f.debug_struct("ReleaseStack").field("actions", &labels).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use toolchat_core::ChatError;

    #[tokio::test]
    async fn test_unwind_runs_in_reverse_and_suppresses_errors() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut stack = ReleaseStack::new();

        for label in ["process", "transport", "session"] {
            let order = order.clone();
            stack.push(label, async move {
                order.lock().unwrap().push(label);
                if label == "transport" {
                    Err(ChatError::McpError("already gone".into()))
                } else {
                    Ok(())
                }
            });
        }
        assert_eq!(stack.len(), 3);

        let failures = stack.unwind().await;
        assert_eq!(failures, 1);
        assert!(stack.is_empty());
        assert_eq!(*order.lock().unwrap(), vec!["session", "transport", "process"]);

        assert_eq!(stack.unwind().await, 0);
    }

    #[tokio::test]
    async fn test_actions_do_not_run_until_unwound() {
        let ran = Arc::new(Mutex::new(false));
        let mut stack = ReleaseStack::new();
        let flag = ran.clone();
        stack.push("flag", async move {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        assert!(!*ran.lock().unwrap());
        stack.unwind().await;
        assert!(*ran.lock().unwrap());
    }
}

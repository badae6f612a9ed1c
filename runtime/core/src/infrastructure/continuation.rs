// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Callback-to-future bridge.
//!
//! [`with_continuation`] hands a [`Continuation`] to a callback-based API and
//! awaits the value the callback delivers. The first `resume` wins; any later
//! call is rejected and logged, so a callback that fires twice can never
//! resolve the future twice. If every clone of the continuation is dropped
//! without resuming, the awaiting side gets an error instead of hanging.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::warn;

use crate::domain::error::OperationError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContinuationError {
    #[error("Continuation was already resumed")]
    AlreadyResumed,
}

type Reply<T> = oneshot::Sender<Result<T, OperationError>>;

pub struct Continuation<T> {
    reply: Arc<Mutex<Option<Reply<T>>>>,
}

impl<T> Clone for Continuation<T> {
    fn clone(&self) -> Self {
        Self {
            reply: self.reply.clone(),
        }
    }
}

impl<T> Continuation<T> {
    fn new(reply: Reply<T>) -> Self {
        Self {
            reply: Arc::new(Mutex::new(Some(reply))),
        }
    }

    pub fn resume<E>(&self, result: Result<T, E>) -> Result<(), ContinuationError>
    where
        E: Into<OperationError>,
    {
        let Some(reply) = self.reply.lock().take() else {
            warn!("Continuation resumed more than once; ignoring later result");
            return Err(ContinuationError::AlreadyResumed);
        };

        // The awaiting side may be gone; resuming still counts.
        let _ = reply.send(result.map_err(Into::into));
        Ok(())
    }

    pub fn resume_returning(&self, value: T) -> Result<(), ContinuationError> {
        self.resume::<OperationError>(Ok(value))
    }

    pub fn resume_throwing(&self, error: OperationError) -> Result<(), ContinuationError> {
        self.resume::<OperationError>(Err(error))
    }

    pub fn is_resumed(&self) -> bool {
        self.reply.lock().is_none()
    }
}

/// Run `register` with a fresh continuation and wait for it to be resumed.
pub async fn with_continuation<T, F>(register: F) -> Result<T, OperationError>
where
    F: FnOnce(Continuation<T>),
{
    let (reply, response) = oneshot::channel();
    register(Continuation::new(reply));

    response
        .await
        .map_err(|_| OperationError::failed("continuation dropped without resuming"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    /// Callback-style API that reports on a foreign thread.
    fn fetch_titles(fail: bool, completion: impl FnOnce(Result<Vec<String>, OperationError>) + Send + 'static) {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            if fail {
                completion(Err(OperationError::Transport("no data".to_string())));
            } else {
                completion(Ok(vec!["sunt aut facere".to_string()]));
            }
        });
    }

    #[tokio::test]
    async fn test_bridges_success() {
        let titles = with_continuation(|continuation| {
            fetch_titles(false, move |result| {
                continuation.resume(result).unwrap();
            })
        })
        .await
        .unwrap();

        assert_eq!(titles, vec!["sunt aut facere".to_string()]);
    }

    #[tokio::test]
    async fn test_bridges_failure() {
        let result: Result<Vec<String>, _> = with_continuation(|continuation| {
            fetch_titles(true, move |result| {
                continuation.resume(result).unwrap();
            })
        })
        .await;

        assert!(matches!(result, Err(OperationError::Transport(_))));
    }

    #[tokio::test]
    async fn test_second_resume_rejected() {
        let (tx, rx) = std::sync::mpsc::channel();
        let value = with_continuation(|continuation: Continuation<u32>| {
            let duplicate = continuation.clone();
            assert!(continuation.resume_returning(1).is_ok());
            tx.send(duplicate.resume_returning(2)).unwrap();
            assert!(duplicate.is_resumed());
        })
        .await
        .unwrap();

        assert_eq!(value, 1);
        assert_eq!(rx.recv().unwrap(), Err(ContinuationError::AlreadyResumed));
    }

    #[tokio::test]
    async fn test_dropped_continuation_fails() {
        let result = with_continuation(|continuation: Continuation<u32>| drop(continuation)).await;
        assert!(matches!(result, Err(OperationError::Failed(_))));
    }
}

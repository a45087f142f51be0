//! Deadlines for sink calls

use std::future::Future;
use std::time::Duration;

use myko_common::{MykoError, Result};

/// Run a sink call, failing with [`MykoError::Timeout`] once `deadline` passes.
pub async fn with_deadline<T, F>(deadline: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(MykoError::Timeout(format!(
            "{operation} exceeded {}ms",
            deadline.as_millis()
        ))),
    }
}

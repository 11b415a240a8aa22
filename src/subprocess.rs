//! Component K — Size Gatherer.
//!
//! Fire-and-wait external subprocess with a strict timeout; on timeout the
//! child is killed (`spec.md` §5, §4.E step 1).

use crate::model::FilesSizeGathererConfig;
use tokio::process::Command;
use tokio::time::timeout;

/// Spawn `exec(path, base_path, model_id)`; returns `Some(size_bytes)` only
/// on a clean exit with a non-negative integer on stdout. Any other
/// outcome — non-zero exit, non-numeric stdout, negative number, spawn
/// failure, timeout — returns `None` and logs (`spec.md` §4.A / §6).
pub async fn gather_size(gatherer: &FilesSizeGathererConfig, model_id: &str) -> Option<i64> {
    let mut child = match Command::new(&gatherer.path)
        .arg(&gatherer.base_path)
        .arg(model_id)
        .kill_on_drop(true)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %gatherer.path, error = %e, "failed to spawn size gatherer");
            return None;
        }
    };

    let wait = timeout(
        std::time::Duration::from_secs(gatherer.timeout_seconds),
        child.wait_with_output(),
    )
    .await;

    let output = match wait {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::warn!(path = %gatherer.path, error = %e, "size gatherer wait failed");
            return None;
        }
        Err(_) => {
            tracing::warn!(path = %gatherer.path, model_id = %model_id, timeout_secs = gatherer.timeout_seconds, "size gatherer timed out, killed");
            return None;
        }
    };

    if !output.status.success() {
        tracing::warn!(path = %gatherer.path, status = ?output.status, "size gatherer exited non-zero");
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    match stdout.trim().parse::<i64>() {
        Ok(n) if n >= 0 => Some(n),
        _ => {
            tracing::warn!(path = %gatherer.path, stdout = %stdout.trim(), "size gatherer produced non-numeric or negative output");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gatherer(path: &str, timeout_secs: u64) -> FilesSizeGathererConfig {
        FilesSizeGathererConfig {
            path: path.to_string(),
            base_path: "/models".to_string(),
            timeout_seconds: timeout_secs,
        }
    }

    #[tokio::test]
    async fn non_numeric_stdout_returns_none() {
        // `echo base_path model_id` prints two words, not a bare integer.
        let result = gather_size(&gatherer("/bin/echo", 5), "llama3").await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn missing_binary_returns_none() {
        let g = gatherer("/nonexistent/path/to/gatherer", 5);
        assert_eq!(gather_size(&g, "llama3").await, None);
    }

    #[tokio::test]
    async fn timeout_returns_none() {
        let g = gatherer("/bin/sleep", 1);
        let result = timeout(std::time::Duration::from_secs(3), gather_size(&g, "2"))
            .await
            .expect("gather_size itself should return within its own timeout");
        assert_eq!(result, None, "sleep prints nothing and exits 0 after 2s > 1s timeout, so it's killed");
    }
}

//! The Cleanup Agent: a small sidecar contract that lets the driver (or the
//! Reconciler, observing driver termination) tell still-running worker pods
//! to exit once the test is over.
//!
//! `commands::cleanup` serves the HTTP endpoint inside a worker pod;
//! `notify_quit` is the caller-side helper used by both the driver's
//! postStop hook and the Reconciler, grounded on the quit-endpoint pattern
//! common to sidecar-based test harnesses.

use std::time::Duration;

use reqwest::Client;

pub const QUIT_PATH: &str = "/quitquitquit";
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Posts the quit signal to a worker pod's cleanup endpoint, retrying a
/// bounded number of times since the target may be mid-shutdown already.
pub async fn notify_quit(client: &Client, host_port: &str) -> Result<(), reqwest::Error> {
    let url = format!("http://{host_port}{QUIT_PATH}");
    let mut last_error = None;
    for attempt in 0..DEFAULT_RETRY_ATTEMPTS {
        match client.post(&url).send().await {
            Ok(_) => return Ok(()),
            Err(error) => {
                last_error = Some(error);
                if attempt + 1 < DEFAULT_RETRY_ATTEMPTS {
                    tokio::time::sleep(DEFAULT_RETRY_DELAY).await;
                }
            }
        }
    }
    Err(last_error.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_quit_against_unreachable_host_fails() {
        let client = Client::new();
        // Port 1 is reserved and never accepts connections in test sandboxes.
        let result = notify_quit(&client, "127.0.0.1:1").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_quit_path_constant() {
        assert_eq!(QUIT_PATH, "/quitquitquit");
    }
}

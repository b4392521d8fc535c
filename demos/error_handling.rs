use std::time::Duration;

use onereq::prelude::{Client, Error, RetryPolicy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::builder()
        .base_url("https://httpbin.org")
        .timeout(Duration::from_secs(5))
        .retry_policy(RetryPolicy::disabled())
        .try_build()?;

    let result = client.get("/status/500").send().await;
    match result {
        Ok(response) => {
            println!("unexpected success: status={}", response.status());
        }
        Err(error) => {
            println!("error_code={}", error.code().as_str());
            match &error {
                Error::HttpStatus {
                    status, summary, ..
                } => {
                    println!("http status error: status={status} summary={summary}");
                }
                Error::Timeout { timeout_ms, .. } => {
                    println!("timed out after {timeout_ms}ms");
                }
                Error::Transport { kind, .. } => {
                    println!("transport error kind={kind}");
                }
                other => {
                    println!("other error: {other}");
                }
            }
        }
    }

    Ok(())
}

use std::time::Duration;

use onereq::prelude::{Client, RetryPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct CreateItem<'a> {
    name: &'a str,
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct EchoResponse {
    json: Option<serde_json::Value>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::builder()
        .base_url("https://httpbin.org")
        .timeout(Duration::from_secs(5))
        .retry_policy(
            RetryPolicy::standard()
                .max_retries(3)
                .backoff_base(Duration::from_millis(100)),
        )
        .try_build()?;

    let ping = client.get("/get").send().await?;
    println!(
        "GET /get => status={} body_bytes={}",
        ping.status(),
        ping.text().len()
    );

    let payload = CreateItem {
        name: "demo",
        enabled: true,
    };

    let echoed: EchoResponse = client
        .post("/anything")
        .json(&payload)?
        .send_json()
        .await?;

    println!("POST /anything => echoed_json={:?}", echoed.json);
    Ok(())
}

use std::time::Duration;

use onereq::prelude::{Client, RetryPolicy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::builder()
        .base_url("https://httpbin.org")
        .timeout(Duration::from_secs(5))
        .retry_policy(RetryPolicy::standard().max_retries(2))
        .try_build()?;

    // Against a range-paginated API (the Heroku platform API, for example)
    // this same call keeps requesting while responses carry a `next-range`
    // header and hands back one concatenated array. httpbin answers in a
    // single page, so the call goes through the exact same path once.
    let everything = client.get("/json").send().await?;
    println!("full fetch => status={}", everything.status());

    // `partial` asks for exactly one page and leaves follow-up to the
    // caller; the server's `next-range` header stays visible for that.
    let first_page = client.get("/json").partial().send().await?;
    println!(
        "single page => status={} next_range={:?}",
        first_page.status(),
        first_page.headers().get_str("next-range")
    );

    Ok(())
}

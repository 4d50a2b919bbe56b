use googimg::{ ScrapeConfig, Scraper };
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let keyword = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let keyword = if keyword.trim().is_empty() { "red panda".to_string() } else { keyword };

    let config = ScrapeConfig::from_env();
    let scraper = Scraper::new(config)?;
    let outcome = scraper.search(&keyword).await?;

    println!("Backend used: {}", outcome.backend_used);
    println!("Saved {} image(s):", outcome.records.len());
    for (i, record) in outcome.records.iter().enumerate() {
        println!("{}. {} -> {}", i + 1, record.source_url, record.static_path);
    }
    if !outcome.errors.is_empty() {
        println!("Skipped {}:", outcome.errors.len());
        for skip in &outcome.errors {
            println!("  [{:?}] {}", skip.stage, skip.message);
        }
    }

    Ok(())
}

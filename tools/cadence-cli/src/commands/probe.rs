//! Print media durations.

use cadence_assembly_engine::DurationSource;
use cadence_common::config::AppConfig;

pub async fn run(config: &AppConfig, locators: Vec<String>) -> anyhow::Result<()> {
    let source = if config.cache_durations {
        DurationSource::standard().with_cache()
    } else {
        DurationSource::standard()
    };
    let mut failures = 0usize;

    for locator in &locators {
        match source.extract(locator).await {
            Ok(duration) => println!("{duration:>12.6}  {locator}"),
            Err(e) => {
                failures += 1;
                println!("{:>12}  {locator}: {e}", "error");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} locator(s) could not be probed", locators.len());
    }
    Ok(())
}

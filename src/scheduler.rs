use crate::pipeline::{is_policy_abort, Pipeline};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Turns the day and time fields into a six-field cron expression
/// (`sec min hour dom month dow`).
pub fn cron_expression(day: &str, time: &str) -> Result<String> {
    let (hour, minute) = time
        .trim()
        .split_once(':')
        .with_context(|| format!("SCHEDULE_TIME '{}' is not HH:MM", time))?;
    let hour: u32 = hour
        .parse()
        .with_context(|| format!("SCHEDULE_TIME '{}' has an invalid hour", time))?;
    let minute: u32 = minute
        .parse()
        .with_context(|| format!("SCHEDULE_TIME '{}' has an invalid minute", time))?;
    if hour > 23 || minute > 59 {
        bail!("SCHEDULE_TIME '{}' is out of range", time);
    }

    let day = day.trim().to_ascii_lowercase();
    let days = if day == "daily" || day == "*" {
        "*".to_string()
    } else {
        let mut names = Vec::new();
        for part in day.split(',') {
            let part = part.trim();
            let short = part.get(..3).unwrap_or(part);
            if !DAY_NAMES.contains(&short) {
                bail!("SCHEDULE_DAY '{}' is not a day name", part);
            }
            if !names.contains(&short) {
                names.push(short);
            }
        }
        if names.is_empty() {
            bail!("SCHEDULE_DAY is empty");
        }
        names.join(",")
    };

    Ok(format!("0 {minute} {hour} * * {days}"))
}

/// Registers the weekly send and starts the scheduler. Keep the returned
/// scheduler alive for as long as jobs should fire.
pub async fn start(pipeline: Arc<Pipeline>) -> Result<JobScheduler> {
    let config = pipeline.config();
    let expr = cron_expression(&config.schedule_day, &config.schedule_time)?;

    let sched = JobScheduler::new().await?;
    let job = Job::new_async_tz(expr.as_str(), chrono::Local, move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);
        Box::pin(async move {
            info!("Scheduled digest run starting");
            match pipeline.send().await {
                Ok(outcome) => info!("Scheduled digest run finished: {:?}", outcome),
                Err(e) if is_policy_abort(&e) => warn!("Scheduled digest not sent: {}", e),
                Err(e) => error!("Scheduled digest run failed: {:#}", e),
            }
        })
    })
    .with_context(|| format!("Invalid cron expression '{}'", expr))?;

    sched.add(job).await?;
    sched.start().await?;
    info!("Digest scheduled with cron '{}' (local time)", expr);
    Ok(sched)
}

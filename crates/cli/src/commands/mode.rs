// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use fieldops_core::BatteryMode;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::error::Result;
use crate::location::{
    config_for, estimated_battery_usage, mode_description, mode_for, BatteryStatus,
    LocationConfig, ModeThresholds,
};

use super::Context;

pub fn run(ctx: &Context, level: u8, charging: bool, hours: f64, output: OutputFormat) -> Result<()> {
    let thresholds = ctx.config.location.thresholds();
    println!("{}", render(BatteryStatus::new(level, charging), thresholds, hours, output)?);
    Ok(())
}

pub(crate) fn render(
    status: BatteryStatus,
    thresholds: ModeThresholds,
    hours: f64,
    output: OutputFormat,
) -> Result<String> {
    let mode = mode_for(status, thresholds);
    let config = config_for(mode);
    let usage = estimated_battery_usage(mode, hours);
    match output {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
            "mode": mode,
            "description": mode_description(mode),
            "poll_interval_ms": millis(config.poll_interval),
            "desired_accuracy_m": config.desired_accuracy_m,
            "high_accuracy": config.high_accuracy,
            "maximum_age_ms": millis(config.maximum_age),
            "timeout_ms": millis(config.timeout),
            "min_displacement_m": config.min_displacement_m,
            "estimated_usage_percent": usage,
            "hours": hours,
        }))?),
        OutputFormat::Text => Ok(render_text(mode, &config, usage, hours)),
    }
}

fn render_text(mode: BatteryMode, config: &LocationConfig, usage: f64, hours: f64) -> String {
    format!(
        "Mode:             {} ({})\n\
         Poll interval:    {}s\n\
         Desired accuracy: {} m\n\
         High accuracy:    {}\n\
         Maximum age:      {}s\n\
         Timeout:          {}s\n\
         Min displacement: {} m\n\
         Estimated usage:  {:.0}% over {}h",
        mode,
        mode_description(mode),
        config.poll_interval.as_secs(),
        config.desired_accuracy_m,
        if config.high_accuracy { "yes" } else { "no" },
        config.maximum_age.as_secs(),
        config.timeout.as_secs(),
        config.min_displacement_m,
        usage,
        hours
    )
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "mode_tests.rs"]
mod tests;

// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Simulate hosts issuing memory requests across a CXL-style fabric.
//!
//! The platform (requesters, crossbars, serial links, monitors and memories)
//! is described by a YAML file. See `platforms/two_devices.yaml`.

use std::path::PathBuf;
use std::rc::Rc;

use byte_unit::{AdjustedByte, Byte, UnitType};
use clap::Parser;
use cxl_engine::engine::Engine;
use cxl_engine::executor::Spawner;
use cxl_engine::time::clock::Clock;
use cxl_engine::types::SimError;
use cxl_engine::{run_simulation, sim_error};
use cxl_models::requester::Requester;
use cxl_platform::Platform;
use cxl_track::builder::{MonitorsConfig, TrackerConfig, TrackersConfig, setup_trackers};
use cxl_track::entity::Entity;
use cxl_track::{Track, Tracker, error, info};
use indicatif::ProgressBar;

/// Command-line arguments.
#[derive(Parser)]
#[command(about = "CXL fabric evaluation application")]
struct Cli {
    /// The YAML file describing the platform.
    platform: PathBuf,

    /// Enable logging to the console.
    #[arg(long, default_value = "false")]
    stdout: bool,

    /// Level of log message to display.
    #[arg(long, default_value = "Info")]
    stdout_level: log::Level,

    /// Set a regular expression for which entites should have logging level set
    /// to `--stdout-level`. Others will have level set to `Error`.
    #[arg(long, default_value = "")]
    stdout_filter_regex: String,

    /// Write the log to a file as well.
    #[arg(long)]
    log_file: Option<String>,

    /// Level of log message written to `--log-file`.
    #[arg(long, default_value = "Debug")]
    log_file_level: log::Level,

    /// Number of ticks over which monitors accumulate before reporting. Use 0
    /// to disable monitoring.
    #[arg(long, default_value = "0")]
    monitor_window_ticks: u64,

    /// Set a regular expression for which entities should be monitored.
    #[arg(long, default_value = ".*")]
    monitor_filter_regex: String,

    /// Show a progress bar for the number of completed requests.
    #[arg(long)]
    progress: bool,

    /// Number of ticks between updates to the progress bar.
    #[arg(long, default_value = "1000")]
    progress_ticks: u64,

    /// Configure a clock tick on which to terminate the simulation. Use 0 to
    /// run until completion.
    #[arg(long, default_value = "0")]
    finish_tick: u64,
}

fn build_tracker(args: &Cli) -> Result<Tracker, SimError> {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: args.stdout,
            level: args.stdout_level,
            filter_regex: &args.stdout_filter_regex,
            file: None,
        },
        file: TrackerConfig {
            enable: args.log_file.is_some(),
            level: args.log_file_level,
            filter_regex: "",
            file: args.log_file.as_deref(),
        },
        monitors: MonitorsConfig {
            enable: args.monitor_window_ticks != 0,
            window_size_ticks: args.monitor_window_ticks,
            filter_regex: &args.monitor_filter_regex,
        },
    };
    setup_trackers(&config).map_err(|e| SimError(e.to_string()))
}

/// Install an event to terminate the simulation at the clock tick defined.
fn finish_at(spawner: &Spawner, clock: Clock, run_ticks: u64) {
    spawner.spawn(async move {
        clock.wait_ticks(run_ticks).await;
        sim_error!("Finish")
    });
}

fn num_completed(requesters: &[Rc<Requester>]) -> u64 {
    requesters
        .iter()
        .map(|requester| requester.stats().completed)
        .sum()
}

/// Spawn a background task to display the number of completed requests.
fn start_progress(
    spawner: &Spawner,
    clock: Clock,
    progress_ticks: u64,
    total_requests: usize,
    requesters: Vec<Rc<Requester>>,
    progress_bar: ProgressBar,
) {
    spawner.spawn(async move {
        loop {
            // Allow the simulation to end if this is the only task left.
            clock.wait_ticks_or_exit(progress_ticks).await;
            let completed = num_completed(&requesters);
            progress_bar.set_position(completed);
            if completed == total_requests as u64 {
                break;
            }
        }
        Ok(())
    });
}

fn main() -> Result<(), SimError> {
    let args = Cli::parse();
    let tracker = build_tracker(&args)?;

    let mut engine = Engine::new(&tracker);
    let spawner = engine.spawner();
    let top = engine.top().clone();

    let platform = Platform::from_file(&engine, &args.platform)?;
    let clock = engine.clock_mhz(platform.parameters().xbar_frequency_mhz);

    let total_requests: usize = platform
        .requesters()
        .iter()
        .map(|requester| requester.config().pattern.len())
        .sum();
    info!(top ;
        "Issuing {total_requests} requests from {} requester(s) to {} memories over {} serial link(s).",
        platform.requesters().len(),
        platform.memories().len(),
        platform.serial_links().len(),
    );

    let progress_bar = ProgressBar::new(total_requests as u64);
    if args.progress {
        start_progress(
            &spawner,
            clock.clone(),
            args.progress_ticks,
            total_requests,
            platform.requesters().to_vec(),
            progress_bar.clone(),
        );
    }

    if args.finish_tick != 0 {
        finish_at(&spawner, clock.clone(), args.finish_tick);
    }

    run_simulation!(engine);

    if !platform.all_requests_complete() {
        error!(top ; "{}/{total_requests} requests completed", num_completed(platform.requesters()));
        error!(top ; "Deadlock detected at {:.2}ns", clock.time_now_ns());

        tracker.shutdown();
        return sim_error!("Deadlock");
    }

    if args.progress {
        progress_bar.finish();
    }

    print_summary(&top, &platform, clock.time_now_ns());
    tracker.shutdown();
    Ok(())
}

fn print_summary(top: &Rc<Entity>, platform: &Platform, time_now_ns: f64) {
    let time_now_s = time_now_ns / (1000.0 * 1000.0 * 1000.0);
    info!(top ; "Pass: completed in {time_now_ns:.2}ns.");

    for requester in platform.requesters() {
        let stats = requester.stats();
        let mean = stats.mean_latency().unwrap_or(0.0);
        info!(top ;
            "{}: {} completed, {} failed, mean latency {mean:.2} ticks.",
            requester.entity.name,
            stats.completed,
            stats.failed,
        );
    }

    for monitor in platform.monitors() {
        let stats = monitor.stats();
        let (bytes, rate) = compute_adjusted_value_and_rate(time_now_s, stats.bytes);
        info!(top ;
            "{}: {} packets, {bytes:.2} ({rate:.2}/s).",
            monitor.entity.name,
            stats.packets,
        );
        for flow_id in stats.latency.keys() {
            if let Some(mean) = stats.mean_latency(*flow_id) {
                info!(top ; "{}: flow {flow_id} mean latency {mean:.2} ticks.", monitor.entity.name);
            }
        }
    }

    for link in platform.serial_links() {
        let requests = link.request_stats();
        let responses = link.response_stats();
        let (_, request_rate) = compute_adjusted_value_and_rate(time_now_s, requests.bytes);
        let (_, response_rate) = compute_adjusted_value_and_rate(time_now_s, responses.bytes);
        info!(top ;
            "{}: requests {} flits ({request_rate:.2}/s), responses {} flits ({response_rate:.2}/s).",
            link.entity.name,
            requests.flits,
            responses.flits,
        );
    }

    for memory in platform.memories() {
        let stats = memory.stats();
        info!(top ;
            "{}: {} reads, {} writes, {} failed.",
            memory.entity.name,
            stats.reads,
            stats.writes,
            stats.failed,
        );
    }
}

fn compute_adjusted_value_and_rate(
    time_now_s: f64,
    num_bytes: u64,
) -> (AdjustedByte, AdjustedByte) {
    // Convert to a binary-only unit (KiB, MiB, etc)
    let count = Byte::from_u64(num_bytes).get_appropriate_unit(UnitType::Binary);
    let per_second = if time_now_s > 0.0 {
        Byte::from_f64(num_bytes as f64 / time_now_s).unwrap_or(Byte::from_u64(0))
    } else {
        Byte::from_u64(0)
    };
    (count, per_second.get_appropriate_unit(UnitType::Binary))
}

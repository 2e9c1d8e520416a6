use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveTime, Timelike};
use clap::{Parser, Subcommand};
use music_library_exporter::schedule::{
    evaluate, DeferralSignals, EnvironmentSignals, ExportDeferralReason, RecurrenceRule,
    SystemSignals,
};

#[derive(Parser, Debug)]
#[command(name = "music-library-exporter")]
#[command(about = "Inspect scheduled music library export decisions", long_about = None)]
struct Args {
    /// Verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read battery and host-app state and show whether a scheduled export would run
    Signals {
        /// Process name of the host application
        #[arg(long, default_value = "Music Library Exporter")]
        host_app: String,

        /// Do not defer on battery power
        #[arg(long)]
        ignore_battery: bool,

        /// Treat the previous export as failed
        #[arg(long)]
        last_failed: bool,
    },

    /// Print upcoming export times for a recurrence rule
    NextRun {
        /// Export every N hours
        #[arg(long, conflicts_with = "daily")]
        every_hours: Option<u32>,

        /// Export daily at HH:MM (local time)
        #[arg(long)]
        daily: Option<String>,

        /// Time of the last successful export (RFC 3339)
        #[arg(long)]
        last_export: Option<String>,

        /// Number of upcoming runs to show
        #[arg(long, default_value = "3")]
        count: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match args.command {
        Command::Signals {
            host_app,
            ignore_battery,
            last_failed,
        } => show_signals(&host_app, ignore_battery, last_failed),
        Command::NextRun {
            every_hours,
            daily,
            last_export,
            count,
        } => show_next_runs(every_hours, daily.as_deref(), last_export.as_deref(), count),
    }
}

fn show_signals(host_app: &str, ignore_battery: bool, last_failed: bool) -> Result<()> {
    let signals = SystemSignals::new(host_app);

    let on_battery = if ignore_battery {
        Ok(false)
    } else {
        signals.on_battery_power()
    };

    let reason = match (on_battery, signals.host_app_is_open()) {
        (Ok(on_battery_power), Ok(host_app_is_open)) => {
            log::info!("On battery power: {}", on_battery_power);
            log::info!("{} running: {}", host_app, host_app_is_open);
            evaluate(&DeferralSignals {
                schedule_enabled: true,
                on_battery_power,
                host_app_is_open,
                last_attempt_ended_in_error: last_failed,
            })
        }
        (Err(e), _) | (_, Err(e)) => {
            log::warn!("{}", e);
            ExportDeferralReason::Unknown
        }
    };

    log::info!("Decision: {:?} ({})", reason, reason);
    Ok(())
}

fn show_next_runs(
    every_hours: Option<u32>,
    daily: Option<&str>,
    last_export: Option<&str>,
    count: usize,
) -> Result<()> {
    let rule = match (every_hours, daily) {
        (Some(hours), _) => RecurrenceRule::every_hours(hours),
        (None, Some(time)) => {
            let time = NaiveTime::parse_from_str(time, "%H:%M")
                .with_context(|| format!("Invalid time of day: {}", time))?;
            RecurrenceRule::daily_at(time.hour(), time.minute())
        }
        (None, None) => bail!("Pass --every-hours or --daily"),
    };

    let last_export = last_export
        .map(|value| {
            DateTime::parse_from_rfc3339(value)
                .map(|time| time.with_timezone(&Local))
                .with_context(|| format!("Invalid --last-export: {}", value))
        })
        .transpose()?;

    let mut next = rule.next_due(last_export, Local::now())?;
    for i in 0..count {
        log::info!("[{}/{}] {}", i + 1, count, next.format("%Y-%m-%d %H:%M %Z"));
        next = rule.next_after(next)?;
    }

    Ok(())
}

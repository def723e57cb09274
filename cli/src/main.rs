use anyhow::Context;
use clap::Parser;
use comfy_table::Table;
use common::{
    dmjd_to_secs, format_utc, CenturyPolicy, CommandSpec, Config, ScanAction, ScanPlan,
    StatusRegistry, TimePoint,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Write a scan's DMJD start time and length into the status registry",
    long_about = None,
    after_help = "Examples:\n  run_scan --startin 5 --scanlength 5\n  run_scan --starttime 15:05:12:15:07:00 --scanlength 5"
)]
struct Cli {
    /// Absolute UTC start time (YY:MM:DD:HH:MM:SS or YYYY:MM:DD:HH:MM:SS)
    #[arg(long, value_name = "YY:MM:DD:HH:MM:SS", conflicts_with = "startin")]
    starttime: Option<String>,
    /// Start the scan this many seconds from now
    #[arg(long, value_name = "SECONDS", allow_negative_numbers = true)]
    startin: Option<i64>,
    /// Scan length in seconds
    #[arg(long, value_name = "SECONDS")]
    scanlength: Option<u32>,
    /// Century added to two-digit years (default: 69-99 -> 1900s, 00-68 -> 2000s)
    #[arg(long, value_name = "BASE")]
    century: Option<i32>,
    /// Status-registry tool to invoke
    #[arg(long, value_name = "PATH")]
    status_tool: Option<PathBuf>,
    /// Config file (.yaml, .yml or .toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print the resolved request as JSON instead of a table
    #[arg(long)]
    json: bool,
    /// Print registry calls without running them
    #[arg(long)]
    dry_run: bool,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn actions(&self) -> Vec<ScanAction> {
        let mut actions = Vec::new();
        if let Some(text) = &self.starttime {
            actions.push(ScanAction::StartAt(text.clone()));
        }
        if let Some(secs) = self.startin {
            actions.push(ScanAction::StartIn(secs));
        }
        if let Some(len) = self.scanlength {
            actions.push(ScanAction::ScanLength(len));
        }
        actions
    }

    fn century_policy(&self, config: &Config) -> CenturyPolicy {
        match self.century {
            Some(base) => CenturyPolicy::Fixed(base),
            None => config.time.century_policy(),
        }
    }

    fn registry(&self, config: &Config) -> StatusRegistry {
        let program = self
            .status_tool
            .clone()
            .unwrap_or_else(|| config.registry.program.clone());
        StatusRegistry::new(program)
    }
}

/// The resolved request and the registry calls that store it.
struct Schedule {
    plan: ScanPlan,
    calls: Vec<CommandSpec>,
    dump: CommandSpec,
}

fn schedule(cli: &Cli, config: &Config, now: TimePoint) -> Schedule {
    let plan = ScanPlan::resolve(&cli.actions(), now, cli.century_policy(config));
    let registry = cli.registry(config);
    Schedule {
        calls: registry.calls_for(&plan.request),
        dump: registry.dump(),
        plan,
    }
}

fn conversion_table(now: TimePoint, start: TimePoint) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["", "Seconds", "DMJD", "DMJD -> Seconds", "UTC"]);
    for (label, tp) in [("Now", now), ("Scan start", start)] {
        let utc = tp.utc().map(|dt| format_utc(&dt)).unwrap_or_default();
        table.add_row(vec![
            label.to_string(),
            format!("{:.0}", tp.secs()),
            format!("{:.6}", tp.dmjd()),
            format!("{:.0}", dmjd_to_secs(tp.dmjd())),
            utc,
        ]);
    }
    table
}

/// Echoes and runs one registry call. Returns false if it failed.
async fn call_registry(spec: &CommandSpec, dry_run: bool) -> bool {
    println!("{}", spec);
    if dry_run {
        return true;
    }
    match spec.run().await {
        Ok(outcome) => {
            if !outcome.stdout.is_empty() {
                print!("{}", outcome.stdout);
            }
            log::info!("{} succeeded", spec);
            true
        }
        Err(e) => {
            log::warn!("Status registry call failed: {}", e);
            false
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let now = TimePoint::now();
    let schedule = schedule(&cli, &config, now);
    let mut ok = schedule.plan.errors.is_empty();

    for e in &schedule.plan.errors {
        eprintln!("Error: {}", e);
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&schedule.plan.request.summary())?
        );
    } else if let Some(start) = schedule.plan.request.start {
        println!("{}", conversion_table(now, start));
    }

    for spec in &schedule.calls {
        ok &= call_registry(spec, cli.dry_run).await;
    }

    println!("\nChecking status keys:");
    ok &= call_registry(&schedule.dump, cli.dry_run).await;

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::secs_to_dmjd;

    const NOW: f64 = 1_700_000_000.0;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("run_scan").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_startin_300_writes_offset_dmjd() {
        let cli = parse(&["--startin", "300", "--scanlength", "5"]);
        let schedule = schedule(&cli, &Config::default(), TimePoint::from_secs(NOW));

        let lines: Vec<String> = schedule.calls.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                format!(
                    "hashpipe_check_status -k STRTDMJD -d {:.6}",
                    secs_to_dmjd(NOW + 300.0)
                ),
                "hashpipe_check_status -k SCANLEN -i 5".to_string(),
            ]
        );
        assert_eq!(schedule.dump.to_string(), "hashpipe_check_status -v");
    }

    #[test]
    fn test_starttime_uses_century_flag() {
        let cli = parse(&["--starttime", "15:05:12:15:07:00", "--century", "1900"]);
        let schedule = schedule(&cli, &Config::default(), TimePoint::from_secs(NOW));
        let start = schedule.plan.request.start.unwrap();
        assert_eq!(start.utc().unwrap().format("%Y").to_string(), "1915");
    }

    #[test]
    fn test_bad_starttime_keeps_scan_length() {
        let cli = parse(&["--starttime", "99:13:01:00:00:00", "--scanlength", "5"]);
        let schedule = schedule(&cli, &Config::default(), TimePoint::from_secs(NOW));
        assert_eq!(schedule.plan.errors.len(), 1);
        assert_eq!(schedule.calls.len(), 1);
        assert_eq!(schedule.calls[0].args[1], "SCANLEN");
    }

    #[test]
    fn test_huge_century_is_a_start_error() {
        let max = i32::MAX.to_string();
        let cli = parse(&["--century", max.as_str(), "--starttime", "99:01:01:00:00:00"]);
        let schedule = schedule(&cli, &Config::default(), TimePoint::from_secs(NOW));
        assert_eq!(schedule.plan.errors.len(), 1);
        assert!(schedule.calls.is_empty());
    }

    #[test]
    fn test_status_tool_override() {
        let cli = parse(&["--scanlength", "5", "--status-tool", "/opt/hp/check"]);
        let schedule = schedule(&cli, &Config::default(), TimePoint::from_secs(NOW));
        assert_eq!(schedule.calls[0].program, PathBuf::from("/opt/hp/check"));
    }

    #[test]
    fn test_invalid_arguments_rejected() {
        assert!(Cli::try_parse_from(["run_scan", "--bogus"]).is_err());
        assert!(Cli::try_parse_from(["run_scan", "stray"]).is_err());
        assert!(Cli::try_parse_from(["run_scan", "--startin"]).is_err());
        assert!(Cli::try_parse_from(["run_scan", "--scanlength", "five"]).is_err());
        assert!(Cli::try_parse_from([
            "run_scan",
            "--startin",
            "5",
            "--starttime",
            "15:05:12:15:07:00"
        ])
        .is_err());
    }

    #[test]
    fn test_no_flags_only_dumps() {
        let cli = parse(&[]);
        let schedule = schedule(&cli, &Config::default(), TimePoint::from_secs(NOW));
        assert!(schedule.calls.is_empty());
        assert!(schedule.plan.request.start.is_none());
    }

    #[test]
    fn test_conversion_table_has_both_rows() {
        let table = conversion_table(TimePoint::from_secs(NOW), TimePoint::from_secs(NOW + 300.0));
        let rendered = table.to_string();
        assert!(rendered.contains("Scan start"));
        assert!(rendered.contains(&format!("{:.6}", secs_to_dmjd(NOW + 300.0))));
    }

    #[tokio::test]
    async fn test_failed_registry_call_reported() {
        assert!(!call_registry(&CommandSpec::new("false"), false).await);
        assert!(call_registry(&CommandSpec::new("true"), false).await);
        assert!(call_registry(&CommandSpec::new("false"), true).await);
    }
}

// Copyright (c) Recovery Bench Developers.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Mutex;

use super::BenchSpec;
use rc_util::*;

lazy_static::lazy_static! {
    static ref TOP_ARGS_STR: String = {
        let dfl_args = Args::default();
        format!(
            "-d, --dir=[TOPDIR]           'Top dir for results and run directories (dfl: {dfl_dir})'
             -c, --cluster=[FILE]         'Cluster description json, created with defaults if missing'
             -a, --args=[FILE]            'Loads base command line arguments from FILE'
                 --retries=[N|inf]        'Attempts per sweep point (dfl: {dfl_retries})'
                 --retry-timeout=[DUR]    'Give up on a sweep point after DUR'
                 --retry-delay=[DUR]      'Delay between attempts (dfl: {dfl_retry_delay})'
             -v...                        'Sets the level of verbosity'",
            dfl_dir = dfl_args.dir,
            dfl_retries = dfl_args.retries.unwrap_or(0),
            dfl_retry_delay = format_duration(dfl_args.retry_delay),
        )
    };
    static ref AFTER_HELP: Mutex<&'static str> = Mutex::new("");
}

pub fn set_bench_list(list: Vec<(String, String)>) {
    let mut buf = String::new();
    let kind_width = list.iter().map(|pair| pair.0.len()).max().unwrap_or(0);
    let _ = writeln!(buf, "BENCHMARKS:");
    for pair in list.iter() {
        let _ = writeln!(
            buf,
            "    {:width$}    {}",
            &pair.0,
            &pair.1,
            width = kind_width
        );
    }
    *AFTER_HELP.lock().unwrap() = Box::leak(Box::new(buf));
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Mode {
    Run,
    Report,
    Cdf,
    List,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Args {
    pub dir: String,
    pub cluster: Option<String>,
    // None retries until success.
    pub retries: Option<u32>,
    pub retry_timeout: Option<f64>,
    pub retry_delay: f64,
    pub mode: Mode,
    pub bench_specs: Vec<BenchSpec>,

    #[serde(skip)]
    pub append: bool,
    #[serde(skip)]
    pub run_dir: Option<String>,
    #[serde(skip)]
    pub verbosity: u32,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            dir: ".".into(),
            cluster: None,
            retries: Some(10),
            retry_timeout: None,
            retry_delay: 0.0,
            mode: Mode::Run,
            bench_specs: vec![],
            append: false,
            run_dir: None,
            verbosity: 0,
        }
    }
}

impl Args {
    pub fn results_dir(&self) -> String {
        format!("{}/recovery", &self.dir)
    }

    pub fn data_path(&self, name: &str) -> String {
        format!("{}/{}.data", self.results_dir(), name)
    }

    pub fn latest_run_dir(&self) -> String {
        format!("{}/latest", self.results_dir())
    }

    /// Rejects retry durations which can't be turned into a wait, whether
    /// they came from the command line or the args file.
    pub fn validate(&self) -> Result<()> {
        if let Some(v) = self.retry_timeout {
            if !v.is_finite() || v < 0.0 {
                bail!("invalid --retry-timeout {}, must be a non-negative duration", v);
            }
        }
        if !self.retry_delay.is_finite() || self.retry_delay < 0.0 {
            bail!(
                "invalid --retry-delay {}, must be a non-negative duration",
                self.retry_delay
            );
        }
        Ok(())
    }

    fn parse_retries(v: &str) -> Result<Option<u32>> {
        match v {
            "inf" | "unbounded" => Ok(None),
            v => {
                let nr = v
                    .parse::<u32>()
                    .with_context(|| format!("invalid --retries {:?}", v))?;
                if nr == 0 {
                    bail!("--retries must be at least 1");
                }
                Ok(Some(nr))
            }
        }
    }

    fn parse_bench_specs(subm: &clap::ArgMatches) -> Result<Vec<BenchSpec>> {
        let mut specs = vec![];
        if let Some(vals) = subm.values_of("spec") {
            for spec in vals {
                specs.push(
                    BenchSpec::parse(spec).with_context(|| format!("bench spec {:?}", spec))?,
                );
            }
        }
        Ok(specs)
    }
}

impl JsonLoad for Args {}
impl JsonSave for Args {}

impl JsonArgs for Args {
    fn match_cmdline() -> clap::ArgMatches<'static> {
        clap::App::new("recovery-bench")
            .version((*super::FULL_VERSION).as_str())
            .about("Crash recovery benchmarks")
            .setting(clap::AppSettings::UnifiedHelpMessage)
            .setting(clap::AppSettings::DeriveDisplayOrder)
            .setting(clap::AppSettings::SubcommandRequiredElseHelp)
            .args_from_usage(&TOP_ARGS_STR)
            .subcommand(
                clap::SubCommand::with_name("run")
                    .about("Runs benchmarks")
                    .arg(
                        clap::Arg::with_name("append")
                            .long("append")
                            .help("Appends to existing data files instead of truncating them"),
                    )
                    .arg(
                        clap::Arg::with_name("spec")
                            .multiple(true)
                            .required(true)
                            .help("Benchmark spec - \"BENCH[:KEY[=VAL][,KEY[=VAL]...]]\""),
                    ),
            )
            .subcommand(
                clap::SubCommand::with_name("report")
                    .about("Prints the breakdown of one recovery run")
                    .arg(
                        clap::Arg::with_name("RUNDIR")
                            .help("Run directory or its metrics.json (dfl: TOPDIR/recovery/latest)"),
                    ),
            )
            .subcommand(
                clap::SubCommand::with_name("cdf")
                    .about("Rebuilds the recovery time CDF from recovery_dist.data"),
            )
            .subcommand(clap::SubCommand::with_name("list").about("Lists benchmarks"))
            .after_help(*AFTER_HELP.lock().unwrap())
            .get_matches()
    }

    fn verbosity(matches: &clap::ArgMatches) -> u32 {
        matches.occurrences_of("v") as u32
    }

    fn process_cmdline(&mut self, matches: &clap::ArgMatches) -> Result<bool> {
        let dfl = Args::default();
        let mut updated = false;

        if let Some(v) = matches.value_of("dir") {
            self.dir = if v.len() > 0 {
                v.to_string()
            } else {
                dfl.dir.clone()
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("cluster") {
            self.cluster = if v.len() > 0 {
                Some(v.to_string())
            } else {
                None
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("retries") {
            self.retries = if v.len() > 0 {
                Self::parse_retries(v)?
            } else {
                dfl.retries
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("retry-timeout") {
            self.retry_timeout = if v.len() > 0 {
                Some(parse_duration(v)?)
            } else {
                None
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("retry-delay") {
            self.retry_delay = if v.len() > 0 {
                parse_duration(v)?
            } else {
                dfl.retry_delay
            };
            updated = true;
        }

        self.verbosity = Self::verbosity(matches);

        match matches.subcommand() {
            ("run", Some(subm)) => {
                self.mode = Mode::Run;
                self.append = subm.is_present("append");
                let specs = Self::parse_bench_specs(subm)?;
                if specs.len() > 0 {
                    self.bench_specs = specs;
                    updated = true;
                }
                if self.bench_specs.len() == 0 {
                    bail!("run requires bench specs");
                }
            }
            ("report", Some(subm)) => {
                self.mode = Mode::Report;
                self.run_dir = subm.value_of("RUNDIR").map(str::to_string);
            }
            ("cdf", Some(_subm)) => self.mode = Mode::Cdf,
            ("list", Some(_subm)) => self.mode = Mode::List,
            _ => {}
        }

        self.validate()?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::Args;
    use rc_util::parse_duration;

    #[test]
    fn test_parse_retries() {
        assert_eq!(Args::parse_retries("inf").unwrap(), None);
        assert_eq!(Args::parse_retries("3").unwrap(), Some(3));
        assert!(Args::parse_retries("0").is_err());
        assert!(Args::parse_retries("many").is_err());
    }

    #[test]
    fn test_paths() {
        let mut args = Args::default();
        args.dir = "/tmp/rb".into();
        assert_eq!(args.data_path("prop_scale"), "/tmp/rb/recovery/prop_scale.data");
        assert_eq!(args.latest_run_dir(), "/tmp/rb/recovery/latest");
    }

    #[test]
    fn test_validate_retry_durations() {
        let mut args = Args::default();
        assert!(args.validate().is_ok());

        args.retry_delay = parse_duration("-1s").unwrap();
        assert!(args.retry_delay < 0.0);
        assert!(args.validate().is_err());
        args.retry_delay = std::f64::NAN;
        assert!(args.validate().is_err());
        args.retry_delay = parse_duration("2s").unwrap();
        assert!(args.validate().is_ok());

        args.retry_timeout = Some(parse_duration("-5s").unwrap());
        assert!(args.validate().is_err());
        args.retry_timeout = Some(std::f64::INFINITY);
        assert!(args.validate().is_err());
        args.retry_timeout = Some(parse_duration("10m").unwrap());
        assert!(args.validate().is_ok());
    }
}

//! Entry point for the vramwatch headless driver. Parses args and evaluates the nodes
//! the way a host would: once per "graph evaluation".

use std::env;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vramwatch::nodes::{MonitorInputs, OptimizerInputs, OptimizerSettings};
use vramwatch::{ClearMode, Plugin};

const USAGE_FLAGS: &str = "[--interval SECS|-i SECS] [--history N|-n N] [--threshold PCT|-w PCT] [--ticks N] [--clean standard|aggressive] [--list-nodes] [--json]";

#[derive(Debug, PartialEq)]
struct ParsedArgs {
    interval: f64,
    history: usize,
    threshold: f64,
    // 0 = run until killed
    ticks: u64,
    clean: Option<ClearMode>,
    list_nodes: bool,
    json: bool,
}

impl Default for ParsedArgs {
    fn default() -> Self {
        let d = MonitorInputs::default();
        Self {
            interval: d.update_interval,
            history: d.history_length,
            threshold: d.warning_threshold,
            ticks: 0,
            clean: None,
            list_nodes: false,
            json: false,
        }
    }
}

fn parse_value<T: std::str::FromStr>(flag: &str, v: Option<String>) -> Result<T, String> {
    let v = v.ok_or_else(|| format!("missing value for {flag}"))?;
    v.parse::<T>()
        .map_err(|_| format!("invalid value for {flag}: '{v}'"))
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "vramwatch".into());
    let mut out = ParsedArgs::default();

    while let Some(arg) = it.next() {
        // --flag=value form
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg.clone(), None),
        };
        let value = |it: &mut I::IntoIter| inline.clone().or_else(|| it.next());

        match flag.as_str() {
            "-h" | "--help" => return Err(format!("Usage: {prog} {USAGE_FLAGS}")),
            "--interval" | "-i" => out.interval = parse_value(&flag, value(&mut it))?,
            "--history" | "-n" => out.history = parse_value(&flag, value(&mut it))?,
            "--threshold" | "-w" => out.threshold = parse_value(&flag, value(&mut it))?,
            "--ticks" => out.ticks = parse_value(&flag, value(&mut it))?,
            "--clean" => {
                let mode = value(&mut it).ok_or_else(|| "missing value for --clean".to_string())?;
                out.clean = Some(mode.parse::<ClearMode>()?);
            }
            "--list-nodes" => out.list_nodes = true,
            "--json" => out.json = true,
            _ => {
                return Err(format!(
                    "Unexpected argument '{arg}'. Usage: {prog} {USAGE_FLAGS}"
                ))
            }
        }
    }
    Ok(out)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    if parsed.list_nodes {
        println!("{}", serde_json::to_string_pretty(Plugin::descriptors())?);
        return Ok(());
    }

    init_tracing();
    let mut plugin = Plugin::new().context("initializing vramwatch plugin")?;

    if let Some(mode) = parsed.clean {
        let out = plugin.run_optimizer(OptimizerInputs {
            settings: OptimizerSettings {
                clear_mode: mode,
                ..OptimizerSettings::default()
            },
            force_run: 1,
        });
        if parsed.json {
            println!("{}", serde_json::to_string(&out)?);
        } else {
            println!("{}", out.ui.text);
        }
        return Ok(());
    }

    run_monitor(&mut plugin, &parsed)
}

fn run_monitor(plugin: &mut Plugin, parsed: &ParsedArgs) -> anyhow::Result<()> {
    let inputs = MonitorInputs {
        monitoring_enabled: true,
        update_interval: parsed.interval,
        history_length: parsed.history,
        warning_threshold: parsed.threshold,
        refresh_trigger: 0,
    };
    let pause = Duration::from_secs_f64(inputs.clamped().update_interval);
    info!(ticks = parsed.ticks, interval_s = pause.as_secs_f64(), "driving monitor node");

    let mut done = 0u64;
    loop {
        let out = plugin.run_monitor(inputs);
        if parsed.json {
            println!("{}", serde_json::to_string(&out.result)?);
        } else {
            println!("{}\n", out.ui.text);
        }
        done += 1;
        if parsed.ticks != 0 && done >= parsed.ticks {
            break;
        }
        std::thread::sleep(pause);
    }

    // Disabling the node stops the sampler.
    plugin.run_monitor(MonitorInputs {
        monitoring_enabled: false,
        ..inputs
    });
    Ok(())
}

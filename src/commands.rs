//! Command execution.

use crate::config::Config;
use crate::session::{load_chart, parse_event_arg, parse_json_arg, Session};
use crate::Commands;
use arbor_core::{Chart, FireResult, Instance, StateId, StateKind};
use colored::Colorize;
use serde_json::{json, Value};
use std::path::Path;

/// Executes a one-shot command and returns the formatted output.
pub fn execute(config: &Config, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl { .. } => unreachable!(),

        Commands::Check { chart } => {
            let chart = load_chart(&chart)?;
            Ok(describe_chart(&chart))
        }

        Commands::Run {
            chart,
            initial,
            ctx,
            events,
        } => run(config, &chart, initial.as_deref(), ctx.as_deref(), &events),
    }
}

/// Builds an instance with the configured engine settings.
pub fn start(
    config: &Config,
    chart: &Chart<Session>,
    initial: Option<&str>,
    ctx: Value,
) -> Result<Instance<Session>, arbor_core::CoreError> {
    Instance::construct(chart, Session::new(ctx), initial, config.engine.clone())
}

/// Parses the `--ctx` argument; no argument means an empty object.
pub fn initial_ctx(ctx: Option<&str>) -> Result<Value, Box<dyn std::error::Error>> {
    match ctx {
        Some(arg) => parse_json_arg(arg),
        None => Ok(json!({})),
    }
}

fn run(
    config: &Config,
    chart_path: &Path,
    initial: Option<&str>,
    ctx: Option<&str>,
    events: &[String],
) -> Result<String, Box<dyn std::error::Error>> {
    let chart = load_chart(chart_path)?;
    let mut instance = start(config, &chart, initial, initial_ctx(ctx)?)?;

    let mut output = format!("Initial state: {}\n", instance.current_path().yellow());
    output.push_str(&format_trace(instance.context_mut().take_trace()));

    for arg in events {
        let (event, args) = parse_event_arg(arg)?;
        let before = instance.current_path();
        match instance.fire_event(&event, &args) {
            Ok(result) => {
                output.push_str(&format_fire(&result));
                output.push('\n');
                output.push_str(&format_trace(instance.context_mut().take_trace()));
            }
            Err(e) if e.is_recoverable() => {
                let now = instance.current_path();
                // An error after the walk started leaves the instance moved.
                let status = if now == before {
                    "rejected".red().to_string()
                } else {
                    format!("{} in {}", "failed".red(), now.yellow())
                };
                output.push_str(&format!(
                    "{} {} [{}] {}\n",
                    event.cyan(),
                    status,
                    e.error_code(),
                    e
                ));
                output.push_str(&format_trace(instance.context_mut().take_trace()));
            }
            Err(e) => return Err(e.into()),
        }
    }

    output.push_str(&format!("Final state: {}", instance.current_path().yellow()));
    Ok(output)
}

/// Formats a committed transition.
pub fn format_fire(result: &FireResult) -> String {
    let mut line = format!("{} {} → {}", result.event.cyan(), result.from, result.to.yellow());
    if result.auto > 0 {
        line.push_str(&format!(" ({} automatic)", result.auto).dimmed().to_string());
    }
    line
}

/// Formats recorded actions, one per line.
pub fn format_trace(trace: Vec<String>) -> String {
    trace
        .into_iter()
        .map(|action| format!("  {} {}\n", "·".dimmed(), action))
        .collect()
}

/// Summarizes a chart: its tree, events and checksum.
pub fn describe_chart<C>(chart: &Chart<C>) -> String {
    let root = chart.root_node();
    let mut output = format!(
        "{} chart {} ({} states",
        "Valid".green(),
        root.name().cyan(),
        chart.len()
    );
    if let Some(checksum) = chart.checksum() {
        output.push_str(&format!(", checksum: {checksum}"));
    }
    output.push_str(")\n");
    describe_tree(chart, chart.root(), 1, &mut output);

    let events: Vec<&str> = chart.events().into_iter().collect();
    if events.is_empty() {
        output.push_str(&format!("  Events: {}", "none".dimmed()));
    } else {
        output.push_str(&format!("  Events: {}", events.join(", ")));
    }
    output
}

fn describe_tree<C>(chart: &Chart<C>, id: StateId, depth: usize, output: &mut String) {
    let node = chart.node(id);
    let kind = match node.kind() {
        StateKind::Atomic => String::new(),
        kind => format!(" [{kind}]").dimmed().to_string(),
    };
    let initial = node
        .initial()
        .map(|path| format!(" initial={path}").dimmed().to_string())
        .unwrap_or_default();
    output.push_str(&format!("{}{}{}{}\n", "  ".repeat(depth), node.name(), kind, initial));
    for transition in node.transitions() {
        let event = if transition.is_automatic() {
            "(auto)".to_string()
        } else {
            transition.event().to_string()
        };
        output.push_str(&format!(
            "{}{} → {}\n",
            "  ".repeat(depth + 2),
            event.cyan(),
            transition.target()
        ));
    }
    for &child in node.children() {
        describe_tree(chart, child, depth + 1, output);
    }
}

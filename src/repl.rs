//! Interactive REPL.

use crate::commands::{describe_chart, format_fire, format_trace, initial_ctx, start};
use crate::config::Config;
use crate::session::{load_chart, parse_json_arg, Session};
use arbor_core::{Chart, Instance, Outcome, QUERY_PREFIX};
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Editor, Helper};
use serde_json::Value;
use std::path::Path;

const HELP_TEXT: &str = r#"
Available commands:
  help                          Show this help
  state                         Show the current state and active chain
  events                        List events reachable from the current state
  tree                          Show the chart

  fire <event> [args_json]      Fire an event
  <event> [args_json]           Same as fire
  is_<state>                    Ask whether a state is active
  path <target>                 Relative path from the current state to target

  ctx                           Show the context data
  set <json>                    Merge a JSON object into the context data
  reset                         Start a fresh instance

  quit, exit                    Exit the REPL
"#;

const COMMANDS: &[&str] = &[
    "help", "state", "events", "tree", "fire", "path", "ctx", "set", "reset", "quit", "exit",
];

/// Completes command names, reachable events and active-state queries.
#[derive(Default)]
struct ArborHelper {
    words: Vec<String>,
}

impl ArborHelper {
    fn refresh(&mut self, instance: &Instance<Session>) {
        self.words = COMMANDS.iter().map(|c| c.to_string()).collect();
        self.words.extend(instance.available_events());
        self.words.extend(
            instance
                .chart()
                .state_names()
                .map(|name| format!("{QUERY_PREFIX}{name}")),
        );
        self.words.sort();
        self.words.dedup();
    }
}

impl Completer for ArborHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos].rfind(' ').map_or(0, |i| i + 1);
        let prefix = &line[start..pos];
        let candidates = self
            .words
            .iter()
            .filter(|word| word.starts_with(prefix))
            .map(|word| Pair {
                display: word.clone(),
                replacement: word.clone(),
            })
            .collect();
        Ok((start, candidates))
    }
}

impl Hinter for ArborHelper {
    type Hint = String;
}

impl Highlighter for ArborHelper {}

impl Validator for ArborHelper {}

impl Helper for ArborHelper {}

/// A chart with the instance being driven.
struct Shell<'a> {
    config: &'a Config,
    chart: Chart<Session>,
    initial: Option<String>,
    ctx: Value,
    instance: Instance<Session>,
}

impl<'a> Shell<'a> {
    fn reset(&mut self) -> Result<(), arbor_core::CoreError> {
        self.instance = start(
            self.config,
            &self.chart,
            self.initial.as_deref(),
            self.ctx.clone(),
        )?;
        Ok(())
    }
}

pub fn run(
    config: &Config,
    chart_path: &Path,
    initial: Option<&str>,
    ctx: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "arbor REPL".bold().cyan());

    let chart = load_chart(chart_path)?;
    let ctx = initial_ctx(ctx)?;
    let instance = start(config, &chart, initial, ctx.clone())?;
    let mut shell = Shell {
        config,
        chart,
        initial: initial.map(str::to_string),
        ctx,
        instance,
    };
    println!(
        "Loaded {} in state {}",
        shell.chart.root_node().name().cyan(),
        shell.instance.current_path().yellow()
    );

    // Create readline editor
    let rl_config = rustyline::Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<ArborHelper, DefaultHistory> = Editor::with_config(rl_config)?;
    let mut helper = ArborHelper::default();
    helper.refresh(&shell.instance);
    rl.set_helper(Some(helper));

    // Load history
    let history_path = config.repl.history_path();
    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", format!("{}>", shell.instance.current_path()).cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&mut shell, line) {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
                if let Some(helper) = rl.helper_mut() {
                    helper.refresh(&shell.instance);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    if let Some(path) = &history_path {
        let _ = rl.save_history(path);
    }

    Ok(())
}

fn execute_repl_command(
    shell: &mut Shell<'_>,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "state" | "s" => {
            let chain: Vec<&str> = shell.instance.active().map(|node| node.name()).collect();
            Ok(Some(format!(
                "State: {} [{}]\n  Active: {}",
                shell.instance.current_path().yellow(),
                shell.instance.state().kind(),
                chain.join(" < ")
            )))
        }

        "events" | "e" => {
            let events = shell.instance.available_events();
            if events.is_empty() {
                return Ok(Some("No events".yellow().to_string()));
            }
            let mut output = String::new();
            for event in events {
                let status = match shell.instance.can_fire(&event, &[]) {
                    Ok(target) => format!("→ {target}"),
                    Err(e) => format!("({})", e.error_code()).dimmed().to_string(),
                };
                output.push_str(&format!("  {} {}\n", event.cyan(), status));
            }
            Ok(Some(output))
        }

        "tree" => Ok(Some(describe_chart(&shell.chart))),

        "path" | "p" => {
            if rest.is_empty() {
                return Ok(Some("Usage: path <target>".to_string()));
            }
            Ok(Some(shell.instance.get_relpath(rest)?))
        }

        "ctx" => Ok(Some(format_json(&shell.instance.context().data))),

        "set" => {
            if rest.is_empty() {
                return Ok(Some("Usage: set <json_object>".to_string()));
            }
            let patch = parse_json_arg(rest)?;
            if !patch.is_object() {
                return Ok(Some("Usage: set <json_object>".to_string()));
            }
            let data = &mut shell.instance.context_mut().data;
            if let (Some(data), Value::Object(patch)) = (data.as_object_mut(), patch) {
                data.extend(patch);
            }
            Ok(Some(format_json(&shell.instance.context().data)))
        }

        "reset" => {
            shell.reset()?;
            Ok(Some(format!(
                "{} in state {}",
                "Reset".green(),
                shell.instance.current_path().yellow()
            )))
        }

        "fire" | "f" => {
            let (event, args) = match rest.split_once(char::is_whitespace) {
                Some((event, args)) => (event, args.trim()),
                None => (rest, ""),
            };
            if event.is_empty() {
                return Ok(Some("Usage: fire <event> [args_json]".to_string()));
            }
            let args = parse_args(args)?;
            let result = shell.instance.fire_event(event, &args)?;
            let trace = shell.instance.context_mut().take_trace();
            Ok(Some(
                format!("{}\n{}", format_fire(&result), format_trace(trace))
                    .trim_end()
                    .to_string(),
            ))
        }

        name => {
            let args = parse_args(rest)?;
            let output = match shell.instance.invoke(name, &args)? {
                Outcome::Fired(result) => {
                    let trace = shell.instance.context_mut().take_trace();
                    format!("{}\n{}", format_fire(&result), format_trace(trace))
                        .trim_end()
                        .to_string()
                }
                Outcome::Active(true) => "true".green().to_string(),
                Outcome::Active(false) => "false".red().to_string(),
            };
            Ok(Some(output))
        }
    }
}

/// Parses optional event arguments; a JSON array supplies several.
fn parse_args(arg: &str) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
    if arg.is_empty() {
        return Ok(Vec::new());
    }
    Ok(match parse_json_arg(arg)? {
        Value::Array(items) => items,
        value => vec![value],
    })
}

fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

use clap::Subcommand;

use super::OutputFormat;
use super::status::format_age;
use crate::context::Context;
use crate::history::epoch_now;

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// Show execution counters, most recent first
    Show {
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Drop old entries and cap the rest
    Cleanup {
        /// Override [history] max_age_hours
        #[arg(long)]
        max_age_hours: Option<f64>,
        /// Override [history] max_entries
        #[arg(long)]
        max_entries: Option<usize>,
    },
}

impl HistoryCommand {
    pub fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let history = ctx.history();
        match self {
            Self::Show { format } => {
                let map = history.load();
                if OutputFormat::resolve(*format) == OutputFormat::Json {
                    println!("{}", serde_json::to_string_pretty(&map)?);
                    return Ok(());
                }
                if map.is_empty() {
                    println!("No executions recorded");
                    return Ok(());
                }
                let max = ctx.config.agent.max_executions;
                let now = epoch_now();
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| b.1.last_run.total_cmp(&a.1.last_run));
                for (key, entry) in entries {
                    #[allow(clippy::cast_possible_truncation)]
                    let age = (now - entry.last_run) as i64;
                    let flag = if entry.count >= max { "  [limit]" } else { "" };
                    println!(
                        "{}/{max}  exit={:<4} {:>4} ago  {key}{flag}",
                        entry.count,
                        entry.last_exit_code,
                        format_age(age),
                    );
                }
                Ok(())
            }
            Self::Cleanup {
                max_age_hours,
                max_entries,
            } => {
                let defaults = &ctx.config.history;
                let removed = history.cleanup_old_entries(
                    max_age_hours.unwrap_or(defaults.max_age_hours),
                    max_entries.unwrap_or(defaults.max_entries),
                )?;
                println!("Removed {removed} entr{}", if removed == 1 { "y" } else { "ies" });
                Ok(())
            }
        }
    }
}

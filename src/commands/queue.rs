use clap::Subcommand;

use super::OutputFormat;
use crate::context::Context;
use crate::error::ExitError;
use crate::queue::Section;
use crate::queue::mission::{display_text, project_tag, tagged_entry};

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// Show missions (Pending only unless --all)
    List {
        /// Include In Progress and Done
        #[arg(long)]
        all: bool,
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Add a mission to Pending
    Add {
        /// Mission text
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
        /// Put it on top instead of the bottom
        #[arg(long)]
        urgent: bool,
        /// Tag the mission with a project
        #[arg(long)]
        project: Option<String>,
    },
    /// Remove a Pending mission by 1-based position or keyword
    Cancel { identifier: String },
    /// Move the Pending mission at POSITION to TARGET (default: top)
    Reorder {
        position: usize,
        #[arg(default_value_t = 1)]
        target: usize,
    },
    /// Print the next mission the loop would pick
    Next {
        /// Only consider missions for this project (untagged ones always match)
        #[arg(long)]
        project: Option<String>,
    },
    /// Rewrite legacy section headers
    Migrate,
}

impl QueueCommand {
    pub fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let queue = ctx.queue();
        match self {
            Self::List { all, format } => {
                let sections: &[Section] = if *all {
                    &Section::ALL
                } else {
                    &[Section::Pending]
                };
                let format = OutputFormat::resolve(*format);
                if format == OutputFormat::Json {
                    let doc = queue.load()?;
                    let mut out = serde_json::Map::new();
                    for section in sections {
                        let items: Vec<serde_json::Value> = doc
                            .missions(*section)
                            .into_iter()
                            .map(|line| {
                                serde_json::json!({
                                    "text": display_text(line),
                                    "project": project_tag(line),
                                })
                            })
                            .collect();
                        out.insert(section_key(*section).to_string(), items.into());
                    }
                    println!("{}", serde_json::to_string_pretty(&out)?);
                    return Ok(());
                }
                let doc = queue.load()?;
                for section in sections {
                    let missions = doc.missions(*section);
                    if *all || format == OutputFormat::Pretty {
                        println!("{} ({})", section.title(), missions.len());
                    }
                    for (i, line) in missions.iter().enumerate() {
                        println!("{:>3}. {}", i + 1, render_line(line));
                    }
                }
                Ok(())
            }
            Self::Add {
                text,
                urgent,
                project,
            } => {
                let entry = tagged_entry(&text.join(" "), project.as_deref())?;
                let line = queue.insert_pending(&entry, *urgent)?;
                let position = if *urgent {
                    "top".to_string()
                } else {
                    format!("#{}", queue.list_pending()?.len())
                };
                println!("Queued at {position}: {}", display_text(&line));
                Ok(())
            }
            Self::Cancel { identifier } => {
                let text = queue.cancel(identifier)?;
                println!("Cancelled: {text}");
                Ok(())
            }
            Self::Reorder { position, target } => {
                let text = queue.reorder(*position, *target)?;
                println!("Moved to #{target}: {text}");
                Ok(())
            }
            Self::Next { project } => match queue.next_pending(project.as_deref())? {
                Some(line) => {
                    println!("{}", render_line(&line));
                    Ok(())
                }
                None => Err(ExitError::Other("no eligible pending mission".to_string()).into()),
            },
            Self::Migrate => {
                if queue.migrate_legacy()? {
                    println!("Migrated legacy headers in {}", queue.path().display());
                } else {
                    println!("Nothing to migrate");
                }
                Ok(())
            }
        }
    }
}

const fn section_key(section: Section) -> &'static str {
    match section {
        Section::Pending => "pending",
        Section::InProgress => "in_progress",
        Section::Done => "done",
    }
}

/// Display text with its project, as `[web] fix login`.
pub(crate) fn render_line(line: &str) -> String {
    match project_tag(line) {
        Some(project) => format!("[{project}] {}", display_text(line)),
        None => display_text(line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_line_shows_project() {
        assert_eq!(render_line("- [project:web] fix login"), "[web] fix login");
        assert_eq!(render_line("- plain"), "plain");
    }

    #[test]
    fn add_with_project_tags_entry() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(dir.path().to_path_buf(), crate::config::Config::default());
        QueueCommand::Add {
            text: vec!["fix".into(), "login".into()],
            urgent: false,
            project: Some("web".into()),
        }
        .execute(&ctx)
        .unwrap();
        assert_eq!(
            ctx.queue().list_pending().unwrap(),
            vec!["- [project:web] fix login"]
        );
    }

    #[test]
    fn next_on_empty_queue_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(dir.path().to_path_buf(), crate::config::Config::default());
        let err = QueueCommand::Next { project: None }.execute(&ctx).unwrap_err();
        assert_eq!(err.downcast_ref::<ExitError>().unwrap().code(), 1);
    }
}

use clap::Subcommand;

use crate::context::Context;

#[derive(Debug, Subcommand)]
pub enum RunCommand {
    /// Run the agent loop (exits with 42 when a restart is requested)
    Loop {
        /// Stop after this many iterations
        #[arg(long)]
        max_loops: Option<u32>,
    },
    /// Run the messaging bridge over the inbox directory
    Bridge,
    /// Run the agent loop under a supervisor that relaunches it on 42
    Supervise,
}

impl RunCommand {
    pub fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        match self {
            Self::Loop { max_loops } => {
                let mut ctx = ctx.clone();
                if max_loops.is_some() {
                    ctx.config.agent.max_loops = *max_loops;
                }
                crate::commands::agent_loop::run_agent_loop(&ctx)
            }
            Self::Bridge => crate::commands::bridge::run_bridge(ctx),
            Self::Supervise => crate::commands::supervise::run_supervisor(ctx),
        }
    }
}

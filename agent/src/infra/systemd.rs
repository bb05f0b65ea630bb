//! Process supervision through `systemctl`.

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, ProcessSupervisor};
use crate::infra::command_runner::check_status;

pub struct Systemd<C> {
    runner: C,
}

impl<C: CommandRunner> Systemd<C> {
    pub fn new(runner: C) -> Self {
        Self { runner }
    }
}

impl<C: CommandRunner> ProcessSupervisor for Systemd<C> {
    async fn reload_units(&self) -> Result<()> {
        let output = self.runner.run("systemctl", &["daemon-reload"]).await?;
        check_status("systemctl daemon-reload", output).context("reloading unit definitions")?;
        Ok(())
    }

    async fn enable_unit(&self, name: &str) -> Result<()> {
        let output = self.runner.run("systemctl", &["enable", name]).await?;
        check_status("systemctl enable", output).with_context(|| format!("enabling unit {name}"))?;
        Ok(())
    }
}

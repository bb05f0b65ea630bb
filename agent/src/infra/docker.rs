//! Container runtime backed by the `docker` CLI.
//!
//! Listing uses `--format {{json .}}` (one JSON object per line); creation
//! flags are derived from the component's engine settings by
//! [`create_args`].

use std::time::Duration;

use anyhow::{Context, Result};
use hoist_common::{ContainerSpec, ContainerState, ContainerSummary, ImageSummary};
use serde::Deserialize;

use crate::application::ports::{CommandRunner, ContainerRuntime, RegistryAuth};
use crate::infra::command_runner::check_status;

const DOCKER: &str = "docker";

pub struct DockerCli<C> {
    runner: C,
    pull_timeout: Duration,
}

impl<C: CommandRunner> DockerCli<C> {
    pub fn new(runner: C, pull_timeout: Duration) -> Self {
        Self {
            runner,
            pull_timeout,
        }
    }

    async fn pull(&self, image: &str, global: &[&str]) -> Result<()> {
        let mut args = global.to_vec();
        args.extend(["pull", image]);
        let output = self
            .runner
            .run_with_timeout(DOCKER, &args, self.pull_timeout)
            .await?;
        check_status("docker pull", output).with_context(|| format!("pulling {image}"))?;
        Ok(())
    }

    async fn docker(&self, args: &[&str]) -> Result<Vec<u8>> {
        let what = format!("docker {}", args.first().copied().unwrap_or_default());
        let output = self.runner.run(DOCKER, args).await?;
        Ok(check_status(&what, output)?.stdout)
    }
}

impl<C: CommandRunner> ContainerRuntime for DockerCli<C> {
    async fn pull_image(&self, image: &str, auth: Option<&RegistryAuth>) -> Result<()> {
        let Some(auth) = auth.filter(|a| !a.credential.is_empty()) else {
            return self.pull(image, &[]).await;
        };

        // The login lives in a per-pull client config, removed with `config`.
        let config = tempfile::tempdir().context("creating docker client config dir")?;
        let config_dir = config
            .path()
            .to_str()
            .context("docker client config path is not UTF-8")?;
        let server = if auth.server.is_empty() {
            registry_host(image)
        } else {
            Some(auth.server.as_str())
        };

        let mut args = vec![
            "--config",
            config_dir,
            "login",
            "--username",
            auth.credential.user.as_str(),
            "--password-stdin",
        ];
        if let Some(server) = server {
            args.push(server);
        }
        let output = self
            .runner
            .run_with_stdin(DOCKER, &args, auth.credential.pass.as_bytes())
            .await?;
        check_status("docker login", output)
            .with_context(|| format!("authenticating for {image}"))?;

        self.pull(image, &["--config", config_dir]).await
    }

    async fn list_containers(&self, name: Option<&str>) -> Result<Vec<ContainerSummary>> {
        let filter = name.map(|n| format!("name={n}"));
        let mut args = vec!["ps", "--all", "--no-trunc", "--format", "{{json .}}"];
        if let Some(filter) = &filter {
            args.extend(["--filter", filter.as_str()]);
        }
        let stdout = self.docker(&args).await.context("listing containers")?;
        parse_lines::<PsLine>(&stdout)
            .map(|lines| lines.into_iter().map(ContainerSummary::from).collect())
            .context("parsing docker ps output")
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let stdout = self
            .docker(&["images", "--all", "--no-trunc", "--format", "{{json .}}"])
            .await
            .context("listing images")?;
        parse_lines::<ImagesLine>(&stdout)
            .map(|lines| lines.into_iter().map(ImageSummary::from).collect())
            .context("parsing docker images output")
    }

    async fn create_and_start(&self, spec: &ContainerSpec, image: &str, name: &str) -> Result<String> {
        let args = create_args(spec, image, name);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self
            .docker(&args)
            .await
            .with_context(|| format!("creating container {name}"))?;
        let id = String::from_utf8_lossy(&stdout).trim().to_string();
        if let Err(e) = self.docker(&["start", &id]).await {
            if let Err(cleanup) = self.docker(&["rm", "--force", &id]).await {
                tracing::warn!(container = %name, error = %format!("{cleanup:#}"), "failed to remove unstartable container");
            }
            return Err(e.context(format!("starting container {name}")));
        }
        Ok(id)
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let args: &[&str] = if force { &["rm", "--force", id] } else { &["rm", id] };
        self.docker(args)
            .await
            .with_context(|| format!("removing container {id}"))?;
        Ok(())
    }

    async fn remove_image(&self, image: &str, force: bool) -> Result<()> {
        let args: &[&str] = if force { &["rmi", "--force", image] } else { &["rmi", image] };
        self.docker(args)
            .await
            .with_context(|| format!("removing image {image}"))?;
        Ok(())
    }

    async fn copy_to_container(&self, id: &str, path: &str, archive: &[u8]) -> Result<()> {
        let dest = format!("{id}:{path}");
        let output = self
            .runner
            .run_with_stdin(DOCKER, &["cp", "-", &dest], archive)
            .await?;
        check_status("docker cp", output).with_context(|| format!("copying into {dest}"))?;
        Ok(())
    }

    async fn copy_from_container(&self, id: &str, path: &str) -> Result<Vec<u8>> {
        let src = format!("{id}:{path}");
        self.docker(&["cp", &src, "-"])
            .await
            .with_context(|| format!("copying out of {src}"))
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<()> {
        self.docker(&["rename", id, new_name])
            .await
            .with_context(|| format!("renaming container {id} to {new_name}"))?;
        Ok(())
    }
}

/// The registry host of an image reference, if it names one.
fn registry_host(image: &str) -> Option<&str> {
    let (first, _) = image.split_once('/')?;
    (first.contains('.') || first.contains(':') || first == "localhost").then_some(first)
}

/// Builds `docker create` arguments for `spec`.
#[must_use]
pub fn create_args(spec: &ContainerSpec, image: &str, name: &str) -> Vec<String> {
    let config = &spec.config;
    let host = &spec.host;
    let mut args: Vec<String> = vec!["create".into(), "--name".into(), name.into()];
    let mut flag = |f: &str, v: &str| {
        args.push(f.to_string());
        args.push(v.to_string());
    };

    if !config.hostname.is_empty() {
        flag("--hostname", &config.hostname);
    }
    if !config.user.is_empty() {
        flag("--user", &config.user);
    }
    if !config.working_dir.is_empty() {
        flag("--workdir", &config.working_dir);
    }
    for env in &config.env {
        flag("--env", env);
    }
    for (key, value) in &config.labels {
        flag("--label", &format!("{key}={value}"));
    }
    for port in config.exposed_ports.keys() {
        flag("--expose", port);
    }
    if let Some(entrypoint) = config.entrypoint.first() {
        flag("--entrypoint", entrypoint);
    }
    for bind in &host.binds {
        flag("--volume", bind);
    }
    if !host.network_mode.is_empty() {
        flag("--network", &host.network_mode);
    }
    if !host.restart_policy.name.is_empty() {
        let policy = &host.restart_policy;
        if policy.name == "on-failure" && policy.maximum_retry_count > 0 {
            flag("--restart", &format!("on-failure:{}", policy.maximum_retry_count));
        } else {
            flag("--restart", &policy.name);
        }
    }
    for link in &host.links {
        flag("--link", link);
    }
    for device in &host.devices {
        let mut mapping = device.path_on_host.clone();
        if !device.path_in_container.is_empty() {
            mapping = format!("{mapping}:{}", device.path_in_container);
            if !device.cgroup_permissions.is_empty() {
                mapping = format!("{mapping}:{}", device.cgroup_permissions);
            }
        }
        flag("--device", &mapping);
    }
    for (container_port, bindings) in &host.port_bindings {
        for binding in bindings {
            let publish = match (binding.host_ip.is_empty(), binding.host_port.is_empty()) {
                (true, true) => container_port.clone(),
                (true, false) => format!("{}:{container_port}", binding.host_port),
                (false, _) => format!("{}:{}:{container_port}", binding.host_ip, binding.host_port),
            };
            flag("--publish", &publish);
        }
    }
    for alias in network_aliases(&spec.network) {
        flag("--network-alias", &alias);
    }
    for key in config.extra.keys().chain(host.extra.keys()) {
        tracing::debug!(setting = %key, "engine setting not mapped to a docker flag");
    }

    if config.tty {
        args.push("--tty".into());
    }
    if host.privileged {
        args.push("--privileged".into());
    }
    if host.auto_remove {
        args.push("--rm".into());
    }
    args.push(image.into());
    args.extend(config.entrypoint.iter().skip(1).cloned());
    args.extend(config.cmd.iter().cloned());
    args
}

/// Aliases from `EndpointsConfig.<network>.Aliases`.
fn network_aliases(network: &serde_json::Value) -> Vec<String> {
    let Some(endpoints) = network.get("EndpointsConfig").and_then(|v| v.as_object()) else {
        return Vec::new();
    };
    endpoints
        .values()
        .filter_map(|endpoint| endpoint.get("Aliases").and_then(|a| a.as_array()))
        .flatten()
        .filter_map(|alias| alias.as_str().map(str::to_string))
        .collect()
}

fn parse_lines<T: for<'de> Deserialize<'de>>(stdout: &[u8]) -> Result<Vec<T>> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).with_context(|| format!("unexpected line: {line}")))
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    names: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: String,
}

impl From<PsLine> for ContainerSummary {
    fn from(line: PsLine) -> Self {
        let state = serde_json::from_value(serde_json::Value::String(line.state.to_lowercase()))
            .unwrap_or(ContainerState::Unknown);
        Self {
            id: line.id,
            names: line
                .names
                .split(',')
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect(),
            image: line.image,
            image_id: String::new(),
            state,
            status: line.status,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImagesLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    repository: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    size: String,
}

impl From<ImagesLine> for ImageSummary {
    fn from(line: ImagesLine) -> Self {
        Self {
            id: line.id,
            repository: line.repository,
            tag: line.tag,
            size: line.size,
        }
    }
}

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use hoist_agent::application::ports::Transport;
use hoist_agent::infra::manifest_source::HttpManifestSource;
use hoist_agent::infra::transport::BusTransport;
use hoist_common::{AssetManifest, Channel, Credential, SubManifest, UpdateManifest};
use tokio::io::AsyncReadExt;

mod registry;

use registry::RegistryClient;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Operator tooling for hoist update manifests.
///
/// Encodes and decodes manifests, builds credentials, delivers manifests
/// to an asset endpoint or the message bus, and resolves the newest
/// version tag of an image repository.
#[derive(Parser, Debug)]
#[command(name = "hoist-manifest", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encode a JSON manifest (FILE or stdin) into its transport form
    Encode {
        #[arg(long, value_enum, default_value = "update")]
        kind: Kind,
        file: Option<PathBuf>,
    },
    /// Decode a transport-form manifest (FILE or stdin) to pretty JSON
    Decode {
        #[arg(long, value_enum, default_value = "update")]
        kind: Kind,
        file: Option<PathBuf>,
    },
    /// Encode a registry or broker credential.
    /// The password is read from HOIST_CRED_PASS, never from arguments.
    Cred {
        #[arg(long)]
        user: String,
    },
    /// POST an update manifest to an asset endpoint
    Post {
        /// Endpoint URL; `user:pass@` userinfo is sent as basic auth
        url: String,
        file: Option<PathBuf>,
    },
    /// Publish an update manifest on the bus named by HOIST_SUB_MANIFEST
    Publish { file: Option<PathBuf> },
    /// Print the highest version tag of a registry repository.
    /// The password is read from HOIST_REGISTRY_PASS.
    LatestTag {
        #[arg(long)]
        registry: String,
        #[arg(long)]
        repository: String,
        #[arg(long)]
        user: Option<String>,
        /// Ignore tags that are not version numbers (e.g. `latest`)
        #[arg(long)]
        skip_invalid: bool,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Kind {
    Update,
    Sub,
    Asset,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Encode { kind, file } => {
            let input = read_input(file.as_deref()).await?;
            let text = match kind {
                Kind::Update => hoist_common::encode(&parse_json::<UpdateManifest>(&input)?)?,
                Kind::Sub => hoist_common::encode(&parse_json::<SubManifest>(&input)?)?,
                Kind::Asset => hoist_common::encode(&parse_json::<AssetManifest>(&input)?)?,
            };
            println!("{text}");
        }
        Commands::Decode { kind, file } => {
            let input = read_input(file.as_deref()).await?;
            let value = match kind {
                Kind::Update => serde_json::to_value(decode::<UpdateManifest>(&input)?)?,
                Kind::Sub => serde_json::to_value(decode::<SubManifest>(&input)?)?,
                Kind::Asset => serde_json::to_value(decode::<AssetManifest>(&input)?)?,
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Cred { user } => {
            let pass = std::env::var("HOIST_CRED_PASS")
                .context("HOIST_CRED_PASS env var is required")?;
            let text = hoist_common::encode_credential(&Credential { user, pass })?;
            println!("{text}");
        }
        Commands::Post { url, file } => {
            let manifest = read_manifest(file.as_deref()).await?;
            let source = HttpManifestSource::new(CONNECT_TIMEOUT, REQUEST_TIMEOUT)?;
            source
                .post(&url, hoist_common::encode(&manifest)?.into_bytes())
                .await?;
            println!("posted {} components", manifest.components.len());
        }
        Commands::Publish { file } => {
            let manifest = read_manifest(file.as_deref()).await?;
            let raw = std::env::var("HOIST_SUB_MANIFEST")
                .context("HOIST_SUB_MANIFEST env var is required")?;
            let sub: SubManifest =
                hoist_common::decode(&raw).context("decoding HOIST_SUB_MANIFEST")?;
            let bus = BusTransport::connect(Some(&sub), CONNECT_TIMEOUT).await?;
            bus.publish(
                Channel::UpdateManifest,
                hoist_common::encode(&manifest)?.as_bytes(),
            )
            .await
            .context("publishing update manifest")?;
            println!("published {} components", manifest.components.len());
        }
        Commands::LatestTag {
            registry,
            repository,
            user,
            skip_invalid,
        } => {
            let auth = match user {
                Some(user) => Some((
                    user,
                    std::env::var("HOIST_REGISTRY_PASS")
                        .context("HOIST_REGISTRY_PASS env var is required with --user")?,
                )),
                None => None,
            };
            let mut tags = RegistryClient::new(&registry, auth)?
                .tags(&repository)
                .await?;
            if skip_invalid {
                tags.retain(|t| t.parse::<hoist_common::VersionNumber>().is_ok());
            }
            match hoist_common::latest(&tags)? {
                Some(tag) => println!("{tag}"),
                None => bail!("{repository} has no version tags"),
            }
        }
    }
    Ok(())
}

async fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("reading stdin")?;
            Ok(input)
        }
    }
}

/// Reads an update manifest in either JSON or transport form.
async fn read_manifest(file: Option<&Path>) -> Result<UpdateManifest> {
    let input = read_input(file).await?;
    hoist_common::decode_payload(input.as_bytes()).context("reading update manifest")
}

fn parse_json<T: serde::de::DeserializeOwned>(input: &str) -> Result<T> {
    serde_json::from_str(input).context("input is not a valid manifest")
}

fn decode<T: serde::de::DeserializeOwned>(input: &str) -> Result<T> {
    hoist_common::decode(input).context("input is not an encoded manifest")
}
